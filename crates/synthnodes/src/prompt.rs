//! Prompt composition for model and template nodes.

use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use synthcore::value::coerce_to_string;
use synthcore::Value;

pub const ADDITIONAL_INPUTS_HEADER: &str = "--- Additional Inputs ---";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{input_(\d+)\}").expect("placeholder pattern is valid"))
}

fn slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("slot pattern is valid"))
}

/// Substitute `{input_N}` placeholders with the N-th input.
///
/// Indices past the end become `[MISSING INPUT N]`. Inputs no placeholder
/// refers to are appended under an additional-inputs section. Without any
/// placeholder, every input is appended after the instruction.
pub fn compose_model_prompt(instruction: &str, inputs: &[Value]) -> String {
    let mut referenced = BTreeSet::new();
    let mut has_placeholders = false;

    let templated = placeholder_pattern()
        .replace_all(instruction, |caps: &Captures| {
            has_placeholders = true;
            match caps[1].parse::<usize>().ok().and_then(|i| inputs.get(i).map(|v| (i, v))) {
                Some((i, value)) => {
                    referenced.insert(i);
                    coerce_to_string(value)
                }
                None => format!("[MISSING INPUT {}]", &caps[1]),
            }
        })
        .into_owned();

    if !has_placeholders {
        let appended: Vec<String> = inputs.iter().map(coerce_to_string).collect();
        return join_sections(instruction, &appended.join("\n\n"));
    }

    let unreferenced: Vec<String> = inputs
        .iter()
        .enumerate()
        .filter(|(i, _)| !referenced.contains(i))
        .map(|(_, v)| coerce_to_string(v))
        .collect();
    if unreferenced.is_empty() {
        return templated;
    }

    let section = format!("{}\n{}", ADDITIONAL_INPUTS_HEADER, unreferenced.join("\n"));
    join_sections(&templated, &section)
}

/// Replace every `{slot}` in `template` with its value in a single pass.
///
/// Substituted text is never rescanned, and names with no value are left
/// as written.
pub fn fill_slots<'a>(template: &str, slots: impl IntoIterator<Item = (&'a str, &'a Value)>) -> String {
    let slots: HashMap<&str, &Value> = slots.into_iter().collect();
    slot_pattern()
        .replace_all(template, |caps: &Captures| match slots.get(&caps[1]) {
            Some(value) => coerce_to_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn join_sections(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (_, true) => head.to_string(),
        (true, false) => tail.to_string(),
        (false, false) => format!("{}\n\n{}", head, tail),
    }
}

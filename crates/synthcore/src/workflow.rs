use crate::value::{OutputMap, Value, OUTPUT_KEY};
use crate::WorkflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = String;

/// Node type discriminants understood by the standard registry.
pub mod node_types {
    pub const INPUT: &str = "input";
    pub const OUTPUT: &str = "output";
    pub const TEXT: &str = "text";
    pub const TRANSFORM: &str = "transform";
    pub const MODEL: &str = "model";
    pub const TEMPLATE: &str = "template";
}

/// A graph of nodes and the connections between them.
///
/// `nodes` keeps definition order, which is what the scheduler uses to
/// break ties. On the wire it is an object keyed by node id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    #[serde(default, with = "node_map")]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl WorkflowDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: NodeConfig) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> &mut Connection {
        self.connections.push(Connection::new(source, target));
        let last = self.connections.len() - 1;
        &mut self.connections[last]
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Connection endpoints that reference no declared node, in
    /// first-seen order.
    pub fn unknown_endpoints(&self) -> Vec<NodeId> {
        let declared: HashSet<&str> = self.node_ids().collect();
        let mut seen = HashSet::new();
        let mut unknown = Vec::new();
        for conn in &self.connections {
            for id in [&conn.source_node_id, &conn.target_node_id] {
                if !declared.contains(id.as_str()) && seen.insert(id.clone()) {
                    unknown.push(id.clone());
                }
            }
        }
        unknown
    }

    /// Structural checks run before any node executes.
    ///
    /// With `strict` set, a connection naming an undeclared node is an
    /// error; otherwise it is tolerated and surfaces in run diagnostics.
    pub fn validate(&self, strict: bool) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::Validation("workflow has no nodes".to_string()));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(WorkflowError::Validation("node with empty id".to_string()));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.id.clone()));
            }
        }

        if strict {
            if let Some(conn) = self
                .connections
                .iter()
                .find(|c| !ids.contains(c.source_node_id.as_str()) || !ids.contains(c.target_node_id.as_str()))
            {
                return Err(WorkflowError::InvalidConnection(format!(
                    "{} -> {} references an unknown node",
                    conn.source_node_id, conn.target_node_id
                )));
            }
        }

        Ok(())
    }
}

/// Configuration of a single node. Type-specific settings stay in
/// `fields` and are parsed by the executor for that type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub fields: OutputMap,
}

impl NodeConfig {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            fields: OutputMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_input(&self) -> bool {
        self.node_type == node_types::INPUT
    }

    pub fn is_output(&self) -> bool {
        self.node_type == node_types::OUTPUT
    }

    /// Type-specific fields as a JSON object, for typed deserialization.
    pub fn fields_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Directed edge from one node's output handle into another node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn from_handle(&mut self, handle: impl Into<String>) -> &mut Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn to_handle(&mut self, handle: impl Into<String>) -> &mut Self {
        self.target_handle = Some(handle.into());
        self
    }

    /// Source handle, defaulting to `"output"`.
    pub fn source_handle(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(OUTPUT_KEY)
    }

    pub fn target_handle(&self) -> Option<&str> {
        self.target_handle.as_deref()
    }
}

/// (De)serializes `Vec<NodeConfig>` as an object keyed by node id,
/// preserving document order. A plain array is accepted on input too.
mod node_map {
    use super::NodeConfig;
    use serde::de::{self, MapAccess, SeqAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::collections::HashSet;
    use std::fmt;

    pub fn serialize<S: Serializer>(nodes: &[NodeConfig], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(nodes.len()))?;
        for node in nodes {
            map.serialize_entry(&node.id, node)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<NodeConfig>, D::Error> {
        deserializer.deserialize_any(NodesVisitor)
    }

    struct NodesVisitor;

    impl<'de> Visitor<'de> for NodesVisitor {
        type Value = Vec<NodeConfig>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of node id to node config, or a list of nodes")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut nodes = Vec::with_capacity(access.size_hint().unwrap_or(0));
            let mut seen = HashSet::new();
            while let Some((key, mut node)) = access.next_entry::<String, NodeConfig>()? {
                if !seen.insert(key.clone()) {
                    return Err(de::Error::custom(format!("duplicate node id '{}'", key)));
                }
                if node.id.is_empty() {
                    node.id = key;
                } else if node.id != key {
                    return Err(de::Error::custom(format!(
                        "node key '{}' does not match its id '{}'",
                        key, node.id
                    )));
                }
                if node.name.is_empty() {
                    node.name = node.id.clone();
                }
                nodes.push(node);
            }
            Ok(nodes)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut nodes: Vec<NodeConfig> = Vec::new();
            let mut seen = HashSet::new();
            while let Some(mut node) = access.next_element::<NodeConfig>()? {
                if !seen.insert(node.id.clone()) {
                    return Err(de::Error::custom(format!("duplicate node id '{}'", node.id)));
                }
                if node.name.is_empty() {
                    node.name = node.id.clone();
                }
                nodes.push(node);
            }
            Ok(nodes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nodes_keep_document_order() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": {
                "zeta": {"type": "input"},
                "alpha": {"type": "text", "text_content": "hi"},
                "mid": {"id": "mid", "type": "output", "name": "Result"}
            },
            "connections": [
                {"source_node_id": "zeta", "target_node_id": "mid"}
            ]
        }))
        .unwrap();

        let ids: Vec<&str> = def.node_ids().collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert_eq!(def.nodes[0].name, "zeta");
        assert_eq!(def.nodes[1].fields["text_content"], json!("hi"));
        assert_eq!(def.connections[0].source_handle(), "output");
        assert_eq!(def.connections[0].target_handle(), None);
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let result: Result<WorkflowDefinition, _> = serde_json::from_value(json!({
            "nodes": {"a": {"id": "b", "type": "text"}},
            "connections": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn accepts_node_list() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [{"id": "a", "type": "text"}, {"id": "b", "type": "output"}]
        }))
        .unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert!(def.connections.is_empty());
    }

    #[test]
    fn strict_validation_rejects_unknown_endpoints() {
        let mut def = WorkflowDefinition::new();
        def.add_node(NodeConfig::new("a", node_types::TEXT));
        def.connect("a", "ghost");

        assert!(matches!(def.validate(true), Err(WorkflowError::InvalidConnection(_))));
        assert!(def.validate(false).is_ok());
        assert_eq!(def.unknown_endpoints(), vec!["ghost".to_string()]);
    }

    #[test]
    fn empty_definition_is_invalid() {
        assert!(matches!(
            WorkflowDefinition::new().validate(false),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn serializes_nodes_as_map() {
        let mut def = WorkflowDefinition::new();
        def.add_node(NodeConfig::new("a", node_types::TEXT).with_field("text_content", "x"));
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["nodes"]["a"]["type"], json!("text"));
        assert_eq!(value["nodes"]["a"]["text_content"], json!("x"));
    }
}

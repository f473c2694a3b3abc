use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised inside a single node executor.
///
/// These never abort a run; the execution loop records them on the
/// node's result and moves on.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Generation service error: {0}")]
    Upstream(#[from] GenerationError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure reported by the generation-service collaborator.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Structural problems with a workflow definition, detected before any
/// node runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid workflow: {0}")]
    Validation(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict: expected {expected}, stored {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("A workflow named '{0}' already exists")]
    DuplicateName(String),
}

use coach_core::CoachError;
use thiserror::Error;

/// Structural edit rejected by the rule builder. The tree is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("condition {0} not found")]
    ConditionNotFound(String),

    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("the root group cannot be removed")]
    CannotRemoveRoot,

    #[error("cannot move {node_id} into {target_id}")]
    InvalidMove { node_id: String, target_id: String },

    #[error("NOT group {group_id} would have {children} children")]
    NotArity { group_id: String, children: usize },

    #[error("nesting under {parent_id} exceeds the maximum depth of {max_depth}")]
    TooDeep { parent_id: String, max_depth: usize },

    #[error("unknown attribute {0}")]
    UnknownAttribute(String),

    #[error("operator {operator} is not valid for attribute {attribute}")]
    InvalidOperator { attribute: String, operator: String },

    #[error("nothing to undo")]
    NothingToUndo,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("NOT group {group_id} has {children} children, expected exactly one")]
    NotArity { group_id: String, children: usize },
}

/// Rule document could not be loaded. The raw document is kept so the host
/// can offer it for repair.
#[derive(Error, Debug, Clone)]
#[error("invalid rule document at {path}: {reason}")]
pub struct DecodeError {
    pub path: String,
    pub reason: String,
    pub raw: serde_json::Value,
}

impl From<BuilderError> for CoachError {
    fn from(err: BuilderError) -> Self {
        CoachError::Validation(err.to_string())
    }
}

impl From<EvaluationError> for CoachError {
    fn from(err: EvaluationError) -> Self {
        CoachError::Evaluation(err.to_string())
    }
}

impl From<DecodeError> for CoachError {
    fn from(err: DecodeError) -> Self {
        CoachError::Validation(err.to_string())
    }
}

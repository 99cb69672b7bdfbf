//! Segment rule engine. Attribute catalog, AND/OR/NOT rule trees, the
//! editing session that builds them, evaluation against worker attributes,
//! and segment persistence.

#![warn(clippy::unwrap_used)]

pub mod attributes;
pub mod builder;
pub mod catalog;
pub mod codec;
pub mod engine;
pub mod error;
pub mod predicates;
pub mod rule;
pub mod service;
pub mod store;
pub mod validate;

pub use attributes::WorkerAttributeSet;
pub use builder::{create_empty_rule, ConditionPatch, RuleBuilder};
pub use catalog::{label_for_value, AttributeCatalog, AttributeOption, AttributeType};
pub use engine::{evaluate, RuleEvaluator};
pub use error::{BuilderError, DecodeError, EvaluationError};
pub use predicates::Operator;
pub use rule::{Condition, Group, LogicalOperator, RuleNode, SegmentRule};
pub use service::{MembershipResult, SegmentService};
pub use store::{FileSegmentStore, InMemorySegmentStore, Segment, SegmentStore};
pub use validate::{validate, IssueKind, RuleIssue};

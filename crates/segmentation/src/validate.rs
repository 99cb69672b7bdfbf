//! Rule validation. Reports everything that should block saving a rule.
//! Validation never changes the tree.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::{AttributeCatalog, AttributeType};
use crate::predicates::Operator;
use crate::rule::{Condition, Group, LogicalOperator, RuleNode, SegmentRule};

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueKind {
    #[error("condition is incomplete")]
    UnsetCondition,

    #[error("unknown attribute {attribute}")]
    UnknownAttribute { attribute: String },

    #[error("unknown operator {operator}")]
    UnknownOperator { operator: String },

    #[error("operator {operator} is not valid for {attribute}")]
    OperatorNotAllowed { attribute: String, operator: String },

    #[error("value {value} is not an option of {attribute}")]
    UnknownOption { attribute: String, value: String },

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    #[error("NOT group has {children} children, expected exactly one")]
    NotArity { children: usize },

    #[error("node id is used more than once")]
    DuplicateId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleIssue {
    pub node_id: String,
    pub kind: IssueKind,
}

/// Every issue in `rule`, in tree order. Empty means the rule may be saved.
pub fn validate(rule: &SegmentRule, catalog: &AttributeCatalog) -> Vec<RuleIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    for id in rule.node_ids() {
        if !seen.insert(id) {
            issues.push(RuleIssue {
                node_id: id.to_string(),
                kind: IssueKind::DuplicateId,
            });
        }
    }
    check_group(rule, catalog, &mut issues);
    issues
}

fn check_group(group: &Group, catalog: &AttributeCatalog, issues: &mut Vec<RuleIssue>) {
    if group.logical_operator == LogicalOperator::Not && group.children.len() != 1 {
        issues.push(RuleIssue {
            node_id: group.id.clone(),
            kind: IssueKind::NotArity {
                children: group.children.len(),
            },
        });
    }
    for child in &group.children {
        match child {
            RuleNode::Group(g) => check_group(g, catalog, issues),
            RuleNode::Condition(c) => {
                if let Some(kind) = check_condition(c, catalog) {
                    issues.push(RuleIssue {
                        node_id: c.id.clone(),
                        kind,
                    });
                }
            }
        }
    }
}

fn check_condition(condition: &Condition, catalog: &AttributeCatalog) -> Option<IssueKind> {
    if condition.is_unset() {
        return Some(IssueKind::UnsetCondition);
    }
    let definition = match catalog.get(&condition.attribute) {
        Some(def) => def,
        None => {
            return Some(IssueKind::UnknownAttribute {
                attribute: condition.attribute.clone(),
            })
        }
    };
    if let Operator::Unknown(name) = &condition.operator {
        return Some(IssueKind::UnknownOperator {
            operator: name.clone(),
        });
    }
    let ty = definition.attribute_type;
    if !ty.supports(&condition.operator) {
        return Some(IssueKind::OperatorNotAllowed {
            attribute: condition.attribute.clone(),
            operator: condition.operator.to_string(),
        });
    }

    let invalid = |reason: &str| {
        Some(IssueKind::InvalidValue {
            reason: reason.to_string(),
        })
    };
    let value = &condition.value;
    match &condition.operator {
        Operator::IsEmpty | Operator::IsNotEmpty => None,
        Operator::Between => match value.as_array() {
            Some(bounds) if bounds.len() == 2 && bounds.iter().all(|b| !b.is_null()) => None,
            _ => invalid("between takes a [low, high] pair"),
        },
        Operator::In | Operator::NotIn => match value.as_array() {
            Some(items) if !items.is_empty() => items
                .iter()
                .find_map(|item| unknown_option(condition, catalog, ty, item)),
            _ => invalid("expected a non-empty list of values"),
        },
        _ if value.is_null() => invalid("a value is required"),
        _ => unknown_option(condition, catalog, ty, value),
    }
}

fn unknown_option(
    condition: &Condition,
    catalog: &AttributeCatalog,
    ty: AttributeType,
    value: &Value,
) -> Option<IssueKind> {
    if ty != AttributeType::Enum {
        return None;
    }
    let options = catalog.options_for_attribute(&condition.attribute);
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if options.is_empty() || options.iter().any(|opt| opt.value == text) {
        None
    } else {
        Some(IssueKind::UnknownOption {
            attribute: condition.attribute.clone(),
            value: text,
        })
    }
}

//! Storage codec for rule trees.
//!
//! Documents are plain JSON wrapped in a version envelope:
//!
//! ```json
//! {"version": 1, "rule": {"kind": "group", "id": "root", "logicalOperator": "AND", "children": []}}
//! ```
//!
//! A bare root group without the envelope is accepted as a pre-versioning
//! document. Operators and attributes this build does not know are kept
//! verbatim so the editor can flag them.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::DecodeError;
use crate::predicates::Operator;
use crate::rule::{Condition, Group, LogicalOperator, RuleNode, SegmentRule};

pub const FORMAT_VERSION: u64 = 1;

pub fn encode(rule: &SegmentRule) -> Value {
    json!({
        "version": FORMAT_VERSION,
        "rule": encode_group(rule),
    })
}

pub fn encode_string(rule: &SegmentRule) -> String {
    encode(rule).to_string()
}

fn encode_group(group: &Group) -> Value {
    json!({
        "kind": "group",
        "id": group.id,
        "logicalOperator": group.logical_operator.as_str(),
        "children": group.children.iter().map(encode_node).collect::<Vec<_>>(),
    })
}

fn encode_node(node: &RuleNode) -> Value {
    match node {
        RuleNode::Group(g) => encode_group(g),
        RuleNode::Condition(c) => json!({
            "kind": "condition",
            "id": c.id,
            "attribute": c.attribute,
            "operator": c.operator.as_str(),
            "value": c.value,
        }),
    }
}

pub fn decode(doc: &Value) -> Result<SegmentRule, DecodeError> {
    let fail = |path: String, reason: String| {
        warn!(path = %path, reason = %reason, "Failed to decode rule document");
        DecodeError {
            path,
            reason,
            raw: doc.clone(),
        }
    };

    let object = doc
        .as_object()
        .ok_or_else(|| fail("$".into(), "document is not an object".into()))?;

    let (root, path) = match object.get("version") {
        Some(version) => {
            if version.as_u64() != Some(FORMAT_VERSION) {
                return Err(fail(
                    "$.version".into(),
                    format!("unsupported version {version}"),
                ));
            }
            let rule = object
                .get("rule")
                .ok_or_else(|| fail("$.rule".into(), "missing rule".into()))?;
            (rule, "$.rule".to_string())
        }
        None => (doc, "$".to_string()),
    };

    match decode_node(root, &path) {
        Ok(RuleNode::Group(group)) => Ok(group),
        Ok(RuleNode::Condition(_)) => Err(fail(path, "root must be a group".into())),
        Err((path, reason)) => Err(fail(path, reason)),
    }
}

pub fn decode_str(text: &str) -> Result<SegmentRule, DecodeError> {
    match serde_json::from_str::<Value>(text) {
        Ok(doc) => decode(&doc),
        Err(err) => Err(DecodeError {
            path: "$".into(),
            reason: err.to_string(),
            raw: Value::String(text.to_string()),
        }),
    }
}

type NodeResult<T> = Result<T, (String, String)>;

fn decode_node(value: &Value, path: &str) -> NodeResult<RuleNode> {
    let object = value
        .as_object()
        .ok_or_else(|| (path.to_string(), "node is not an object".to_string()))?;

    let is_group = match object.get("kind").and_then(Value::as_str) {
        Some("group") => true,
        Some("condition") => false,
        Some(other) => return Err((path.to_string(), format!("unknown node kind {other:?}"))),
        None if object.contains_key("kind") => {
            return Err((path.to_string(), "kind must be a string".to_string()))
        }
        None => object.contains_key("logicalOperator") || object.contains_key("children"),
    };

    let id = decode_id(object, path)?;
    if is_group {
        decode_group(object, id, path).map(RuleNode::Group)
    } else {
        decode_condition(object, id, path).map(RuleNode::Condition)
    }
}

fn decode_id(object: &Map<String, Value>, path: &str) -> NodeResult<String> {
    match object.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err((format!("{path}.id"), "missing node id".to_string())),
    }
}

fn decode_group(object: &Map<String, Value>, id: String, path: &str) -> NodeResult<Group> {
    let logical_operator = object
        .get("logicalOperator")
        .and_then(Value::as_str)
        .and_then(LogicalOperator::parse)
        .ok_or_else(|| {
            (
                format!("{path}.logicalOperator"),
                "expected AND, OR or NOT".to_string(),
            )
        })?;

    let children = match object.get("children") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, child)| decode_node(child, &format!("{path}.children[{i}]")))
            .collect::<NodeResult<Vec<_>>>()?,
        Some(_) => {
            return Err((
                format!("{path}.children"),
                "children must be an array".to_string(),
            ))
        }
    };

    Ok(Group {
        id,
        logical_operator,
        children,
    })
}

fn decode_condition(
    object: &Map<String, Value>,
    id: String,
    path: &str,
) -> NodeResult<Condition> {
    let attribute = optional_str(object, "attribute", path)?
        .unwrap_or_default()
        .to_string();
    let operator = optional_str(object, "operator", path)?
        .map(Operator::parse)
        .unwrap_or(Operator::Unset);
    let value = object.get("value").cloned().unwrap_or(Value::Null);
    Ok(Condition {
        id,
        attribute,
        operator,
        value,
    })
}

/// A missing or null key reads as unset; any other non-string is corrupt.
fn optional_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> NodeResult<Option<&'a str>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err((format!("{path}.{key}"), format!("{key} must be a string"))),
    }
}

/// `#[serde(with = "codec::versioned")]` for fields holding a rule, so the
/// stored form is always the versioned document.
pub mod versioned {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::rule::SegmentRule;

    pub fn serialize<S: Serializer>(rule: &SegmentRule, serializer: S) -> Result<S::Ok, S::Error> {
        super::encode(rule).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SegmentRule, D::Error> {
        let doc = serde_json::Value::deserialize(deserializer)?;
        super::decode(&doc).map_err(serde::de::Error::custom)
    }
}

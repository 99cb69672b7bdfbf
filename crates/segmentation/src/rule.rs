//! Rule tree model. Conditions (leaves) and AND/OR/NOT groups.

use serde::{Deserialize, Serialize};

use crate::predicates::Operator;

/// Id of the root group of a freshly created rule.
pub const ROOT_ID: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn parse(s: &str) -> Option<LogicalOperator> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Some(LogicalOperator::And),
            "OR" => Some(LogicalOperator::Or),
            "NOT" => Some(LogicalOperator::Not),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }
}

/// Single attribute/operator/value predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub attribute: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    /// A condition nobody has filled in yet.
    pub fn unset(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attribute: String::new(),
            operator: Operator::Unset,
            value: serde_json::Value::Null,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.attribute.is_empty() || self.operator == Operator::Unset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub children: Vec<RuleNode>,
}

/// Root group of a segment's membership rule.
pub type SegmentRule = Group;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleNode {
    Condition(Condition),
    Group(Group),
}

impl RuleNode {
    pub fn id(&self) -> &str {
        match self {
            RuleNode::Condition(c) => &c.id,
            RuleNode::Group(g) => &g.id,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            RuleNode::Group(g) => Some(g),
            RuleNode::Condition(_) => None,
        }
    }
}

impl Group {
    pub fn new(id: impl Into<String>, logical_operator: LogicalOperator) -> Self {
        Self {
            id: id.into(),
            logical_operator,
            children: Vec::new(),
        }
    }

    /// AND root with no children.
    pub fn empty_rule() -> SegmentRule {
        Group::new(ROOT_ID, LogicalOperator::And)
    }

    pub fn with_child(mut self, child: impl Into<RuleNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn find_group(&self, id: &str) -> Option<&Group> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(RuleNode::as_group)
            .find_map(|g| g.find_group(id))
    }

    pub(crate) fn find_group_mut(&mut self, id: &str) -> Option<&mut Group> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| match child {
            RuleNode::Group(g) => g.find_group_mut(id),
            RuleNode::Condition(_) => None,
        })
    }

    pub fn find_condition(&self, id: &str) -> Option<&Condition> {
        self.children.iter().find_map(|child| match child {
            RuleNode::Condition(c) if c.id == id => Some(c),
            RuleNode::Condition(_) => None,
            RuleNode::Group(g) => g.find_condition(id),
        })
    }

    pub(crate) fn find_condition_mut(&mut self, id: &str) -> Option<&mut Condition> {
        self.children.iter_mut().find_map(|child| match child {
            RuleNode::Condition(c) if c.id == id => Some(c),
            RuleNode::Condition(_) => None,
            RuleNode::Group(g) => g.find_condition_mut(id),
        })
    }

    /// Nesting depth of the group `id`, where this group is depth 1.
    pub fn depth_of(&self, id: &str) -> Option<usize> {
        if self.id == id {
            return Some(1);
        }
        self.children
            .iter()
            .filter_map(RuleNode::as_group)
            .find_map(|g| g.depth_of(id))
            .map(|d| d + 1)
    }

    /// Depth of the deepest group in this subtree, counting this one.
    pub fn max_depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .filter_map(RuleNode::as_group)
            .map(Group::max_depth)
            .max()
            .unwrap_or(0)
    }

    /// Any descendant node, not including this group itself.
    pub fn find_node(&self, id: &str) -> Option<&RuleNode> {
        self.children.iter().find_map(|child| {
            if child.id() == id {
                return Some(child);
            }
            child.as_group().and_then(|g| g.find_node(id))
        })
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.id == id
            || self.children.iter().any(|child| match child {
                RuleNode::Condition(c) => c.id == id,
                RuleNode::Group(g) => g.contains_id(id),
            })
    }

    /// Detach the descendant `id` with its subtree.
    pub(crate) fn remove_descendant(&mut self, id: &str) -> Option<RuleNode> {
        if let Some(pos) = self.children.iter().position(|c| c.id() == id) {
            return Some(self.children.remove(pos));
        }
        self.children.iter_mut().find_map(|child| match child {
            RuleNode::Group(g) => g.remove_descendant(id),
            RuleNode::Condition(_) => None,
        })
    }

    /// Every node id in pre-order, this group first.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        for child in &self.children {
            match child {
                RuleNode::Condition(c) => ids.push(c.id.as_str()),
                RuleNode::Group(g) => ids.extend(g.node_ids()),
            }
        }
        ids
    }

    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        for child in &self.children {
            match child {
                RuleNode::Condition(c) => out.push(c),
                RuleNode::Group(g) => out.extend(g.conditions()),
            }
        }
        out
    }
}

impl From<Condition> for RuleNode {
    fn from(c: Condition) -> Self {
        RuleNode::Condition(c)
    }
}

impl From<Group> for RuleNode {
    fn from(g: Group) -> Self {
        RuleNode::Group(g)
    }
}

//! Rule builder. The editing session behind the segment rule editor.
//!
//! Every mutation builds a new tree from a copy of the current one, so a tree
//! handed out earlier is never modified. The host is told about each accepted
//! change through the `on_change` callback and owns saving.

use coach_core::config::{NotSwitchPolicy, SegmentationConfig};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::AttributeCatalog;
use crate::error::BuilderError;
use crate::predicates::Operator;
use crate::rule::{Condition, Group, LogicalOperator, RuleNode, SegmentRule};

/// AND root with no children.
pub fn create_empty_rule() -> SegmentRule {
    Group::empty_rule()
}

/// Partial update for a condition. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ConditionPatch {
    pub attribute: Option<String>,
    pub operator: Option<Operator>,
    pub value: Option<serde_json::Value>,
}

impl ConditionPatch {
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

type ChangeCallback<'a> = Box<dyn FnMut(&SegmentRule) + 'a>;

pub struct RuleBuilder<'a> {
    catalog: &'a AttributeCatalog,
    rule: SegmentRule,
    history: Vec<SegmentRule>,
    not_policy: NotSwitchPolicy,
    max_depth: usize,
    on_change: Option<ChangeCallback<'a>>,
}

impl<'a> RuleBuilder<'a> {
    pub fn new(catalog: &'a AttributeCatalog) -> Self {
        Self::from_rule(catalog, create_empty_rule())
    }

    /// Resume editing a rule loaded from storage.
    pub fn from_rule(catalog: &'a AttributeCatalog, rule: SegmentRule) -> Self {
        let defaults = SegmentationConfig::default();
        Self {
            catalog,
            rule,
            history: Vec::new(),
            not_policy: defaults.not_switch_policy,
            max_depth: defaults.max_rule_depth,
            on_change: None,
        }
    }

    pub fn with_config(mut self, config: &SegmentationConfig) -> Self {
        self.not_policy = config.not_switch_policy;
        self.max_depth = config.max_rule_depth;
        self
    }

    pub fn on_change(mut self, callback: impl FnMut(&SegmentRule) + 'a) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    pub fn rule(&self) -> &SegmentRule {
        &self.rule
    }

    pub fn into_rule(self) -> SegmentRule {
        self.rule
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Append an unset condition to `parent_group_id`. Returns the new id.
    pub fn add_condition(&mut self, parent_group_id: &str) -> Result<String, BuilderError> {
        let id = Uuid::new_v4().to_string();
        let mut next = self.rule.clone();
        let parent = self.writable_group(&mut next, parent_group_id)?;
        parent.children.push(RuleNode::Condition(Condition::unset(id.clone())));
        self.commit(next, "add_condition", &id);
        Ok(id)
    }

    /// Append an empty nested group to `parent_group_id`. Returns the new id.
    pub fn add_group(
        &mut self,
        parent_group_id: &str,
        logical_operator: LogicalOperator,
    ) -> Result<String, BuilderError> {
        let depth = self
            .rule
            .depth_of(parent_group_id)
            .ok_or_else(|| reject(BuilderError::GroupNotFound(parent_group_id.into())))?;
        if depth + 1 > self.max_depth {
            return Err(reject(BuilderError::TooDeep {
                parent_id: parent_group_id.into(),
                max_depth: self.max_depth,
            }));
        }

        let id = Uuid::new_v4().to_string();
        let mut next = self.rule.clone();
        let parent = self.writable_group(&mut next, parent_group_id)?;
        parent
            .children
            .push(RuleNode::Group(Group::new(id.clone(), logical_operator)));
        self.commit(next, "add_group", &id);
        Ok(id)
    }

    /// A new attribute resets operator and value to that attribute's defaults;
    /// an operator or value in the same patch is kept only when it suits the
    /// new attribute. A lone operator change must be valid for the attribute
    /// and resets the value to the operator's default shape.
    pub fn update_condition(
        &mut self,
        condition_id: &str,
        patch: ConditionPatch,
    ) -> Result<(), BuilderError> {
        let mut next = self.rule.clone();
        let condition = next
            .find_condition_mut(condition_id)
            .ok_or_else(|| reject(BuilderError::ConditionNotFound(condition_id.into())))?;

        let mut attribute_changed = false;
        if let Some(attribute) = patch.attribute {
            if attribute != condition.attribute {
                let ty = self
                    .catalog
                    .attribute_type(&attribute)
                    .ok_or_else(|| reject(BuilderError::UnknownAttribute(attribute.clone())))?;
                let operator = ty.default_operator();
                condition.value = ty.default_value(&operator);
                condition.operator = operator;
                condition.attribute = attribute;
                attribute_changed = true;
            }
        }

        let mut keep_value = true;
        if let Some(operator) = patch.operator {
            if operator != condition.operator {
                let ty = self
                    .catalog
                    .attribute_type(&condition.attribute)
                    .ok_or_else(|| {
                        reject(BuilderError::UnknownAttribute(condition.attribute.clone()))
                    })?;
                if ty.supports(&operator) {
                    condition.value = ty.default_value(&operator);
                    condition.operator = operator;
                } else if attribute_changed {
                    keep_value = false;
                } else {
                    return Err(reject(BuilderError::InvalidOperator {
                        attribute: condition.attribute.clone(),
                        operator: operator.to_string(),
                    }));
                }
            }
        }

        if let Some(value) = patch.value.filter(|_| keep_value) {
            condition.value = value;
        }

        self.commit(next, "update_condition", condition_id);
        Ok(())
    }

    /// Detach a condition or a group with its subtree.
    pub fn remove_node(&mut self, node_id: &str) -> Result<(), BuilderError> {
        if node_id == self.rule.id {
            return Err(reject(BuilderError::CannotRemoveRoot));
        }
        let mut next = self.rule.clone();
        next.remove_descendant(node_id)
            .ok_or_else(|| reject(BuilderError::NodeNotFound(node_id.into())))?;
        self.commit(next, "remove_node", node_id);
        Ok(())
    }

    /// Switch a group between AND, OR and NOT. Switching a group with several
    /// children to NOT follows the configured [`NotSwitchPolicy`].
    pub fn change_logical_operator(
        &mut self,
        group_id: &str,
        logical_operator: LogicalOperator,
    ) -> Result<(), BuilderError> {
        let mut next = self.rule.clone();
        let group = next
            .find_group_mut(group_id)
            .ok_or_else(|| reject(BuilderError::GroupNotFound(group_id.into())))?;

        if logical_operator == LogicalOperator::Not && group.children.len() > 1 {
            match self.not_policy {
                NotSwitchPolicy::Reject => {
                    return Err(reject(BuilderError::NotArity {
                        group_id: group_id.into(),
                        children: group.children.len(),
                    }));
                }
                NotSwitchPolicy::Truncate => {
                    warn!(
                        group_id = group_id,
                        dropped = group.children.len() - 1,
                        "Truncating group to its first child on switch to NOT"
                    );
                    group.children.truncate(1);
                }
            }
        }
        group.logical_operator = logical_operator;
        self.commit(next, "change_logical_operator", group_id);
        Ok(())
    }

    /// Move a node under `target_group_id` at `index` (clamped to the end).
    pub fn move_node(
        &mut self,
        node_id: &str,
        target_group_id: &str,
        index: usize,
    ) -> Result<(), BuilderError> {
        let invalid = || {
            reject(BuilderError::InvalidMove {
                node_id: node_id.into(),
                target_id: target_group_id.into(),
            })
        };
        if node_id == self.rule.id {
            return Err(invalid());
        }
        let node = self
            .rule
            .find_node(node_id)
            .ok_or_else(|| reject(BuilderError::NodeNotFound(node_id.into())))?;
        if let RuleNode::Group(g) = node {
            if g.contains_id(target_group_id) {
                return Err(invalid());
            }
        }

        let mut next = self.rule.clone();
        let node = next
            .remove_descendant(node_id)
            .ok_or_else(|| reject(BuilderError::NodeNotFound(node_id.into())))?;
        let target = self.writable_group(&mut next, target_group_id)?;
        let index = index.min(target.children.len());
        target.children.insert(index, node);

        if next.max_depth() > self.max_depth {
            return Err(reject(BuilderError::TooDeep {
                parent_id: target_group_id.into(),
                max_depth: self.max_depth,
            }));
        }
        self.commit(next, "move_node", node_id);
        Ok(())
    }

    /// Restore the tree as it was before the last accepted change.
    pub fn undo(&mut self) -> Result<(), BuilderError> {
        let previous = self.history.pop().ok_or(BuilderError::NothingToUndo)?;
        self.rule = previous;
        self.notify();
        debug!(rule_id = %self.rule.id, "Rule edit undone");
        Ok(())
    }

    /// Look up a group that may take another child.
    fn writable_group<'t>(
        &self,
        tree: &'t mut SegmentRule,
        group_id: &str,
    ) -> Result<&'t mut Group, BuilderError> {
        let group = tree
            .find_group_mut(group_id)
            .ok_or_else(|| reject(BuilderError::GroupNotFound(group_id.into())))?;
        if group.logical_operator == LogicalOperator::Not && !group.children.is_empty() {
            return Err(reject(BuilderError::NotArity {
                group_id: group_id.into(),
                children: group.children.len() + 1,
            }));
        }
        Ok(group)
    }

    fn commit(&mut self, next: SegmentRule, action: &str, node_id: &str) {
        let previous = std::mem::replace(&mut self.rule, next);
        self.history.push(previous);
        debug!(action = action, node_id = node_id, "Rule edited");
        self.notify();
    }

    fn notify(&mut self) {
        if let Some(callback) = self.on_change.as_mut() {
            callback(&self.rule);
        }
    }
}

fn reject(err: BuilderError) -> BuilderError {
    warn!(error = %err, "Rule edit rejected");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ROOT_ID;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn test_create_empty_rule_is_deterministic() {
        let a = create_empty_rule();
        assert_eq!(a, create_empty_rule());
        assert_eq!(a.id, ROOT_ID);
        assert_eq!(a.logical_operator, LogicalOperator::And);
        assert!(a.children.is_empty());
    }

    #[test]
    fn test_add_condition_and_group() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let c1 = builder.add_condition(ROOT_ID).unwrap();
        let g1 = builder.add_group(ROOT_ID, LogicalOperator::Or).unwrap();
        let c2 = builder.add_condition(&g1).unwrap();

        let rule = builder.rule();
        assert!(rule.find_condition(&c1).is_some_and(Condition::is_unset));
        assert_eq!(rule.find_group(&g1).map(|g| g.children.len()), Some(1));
        assert!(rule.contains_id(&c2));
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_unknown_parent_is_rejected_without_change() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let before = builder.rule().clone();
        assert_eq!(
            builder.add_condition("nope"),
            Err(BuilderError::GroupNotFound("nope".into()))
        );
        assert_eq!(
            builder.add_group("nope", LogicalOperator::And),
            Err(BuilderError::GroupNotFound("nope".into()))
        );
        assert_eq!(builder.rule(), &before);
        assert!(!builder.can_undo());
    }

    #[test]
    fn test_attribute_change_resets_operator_and_value() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let id = builder.add_condition(ROOT_ID).unwrap();

        builder
            .update_condition(
                &id,
                ConditionPatch::default().attribute("engagement.engagementRate"),
            )
            .unwrap();
        builder
            .update_condition(
                &id,
                ConditionPatch::default()
                    .operator(Operator::Between)
                    .value(json!([10, 90])),
            )
            .unwrap();

        builder
            .update_condition(&id, ConditionPatch::default().attribute("profile.tags"))
            .unwrap();
        let condition = builder.rule().find_condition(&id).unwrap();
        assert_eq!(condition.operator, Operator::Contains);
        assert_eq!(condition.value, serde_json::Value::Null);

        // Operator carried with an attribute change is dropped when it does
        // not suit the new type, and so is its value.
        builder
            .update_condition(
                &id,
                ConditionPatch::default()
                    .attribute("employment.hireDate")
                    .operator(Operator::StartsWith)
                    .value(json!("2020")),
            )
            .unwrap();
        let condition = builder.rule().find_condition(&id).unwrap();
        assert_eq!(condition.operator, Operator::Equals);
        assert_eq!(condition.value, serde_json::Value::Null);
    }

    #[test]
    fn test_invalid_operator_for_attribute() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let id = builder.add_condition(ROOT_ID).unwrap();
        builder
            .update_condition(&id, ConditionPatch::default().attribute("personal.gender"))
            .unwrap();
        let err = builder
            .update_condition(&id, ConditionPatch::default().operator(Operator::GreaterThan))
            .unwrap_err();
        assert!(matches!(err, BuilderError::InvalidOperator { .. }));
        assert_eq!(
            builder
                .update_condition(&id, ConditionPatch::default().attribute("made.up"))
                .unwrap_err(),
            BuilderError::UnknownAttribute("made.up".into())
        );
    }

    #[test]
    fn test_remove_root_is_rejected() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        builder.add_condition(ROOT_ID).unwrap();
        let before = builder.rule().clone();
        assert_eq!(builder.remove_node(ROOT_ID), Err(BuilderError::CannotRemoveRoot));
        assert_eq!(builder.rule(), &before);
    }

    #[test]
    fn test_remove_subtree() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let group = builder.add_group(ROOT_ID, LogicalOperator::And).unwrap();
        let inner = builder.add_condition(&group).unwrap();
        builder.remove_node(&group).unwrap();
        assert!(!builder.rule().contains_id(&inner));
        assert_eq!(
            builder.remove_node(&group),
            Err(BuilderError::NodeNotFound(group.clone()))
        );
    }

    #[test]
    fn test_not_switch_policies() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let first = builder.add_condition(ROOT_ID).unwrap();
        builder.add_condition(ROOT_ID).unwrap();

        assert_eq!(
            builder.change_logical_operator(ROOT_ID, LogicalOperator::Not),
            Err(BuilderError::NotArity {
                group_id: ROOT_ID.into(),
                children: 2
            })
        );
        assert_eq!(builder.rule().logical_operator, LogicalOperator::And);

        let config = SegmentationConfig {
            not_switch_policy: NotSwitchPolicy::Truncate,
            ..Default::default()
        };
        let mut builder = RuleBuilder::from_rule(&catalog, builder.into_rule()).with_config(&config);
        builder
            .change_logical_operator(ROOT_ID, LogicalOperator::Not)
            .unwrap();
        let rule = builder.rule();
        assert_eq!(rule.logical_operator, LogicalOperator::Not);
        assert_eq!(rule.node_ids(), vec![ROOT_ID, first.as_str()]);

        // A NOT group never takes a second child.
        assert!(matches!(
            builder.add_condition(ROOT_ID),
            Err(BuilderError::NotArity { children: 2, .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let catalog = AttributeCatalog::standard();
        let config = SegmentationConfig {
            max_rule_depth: 2,
            ..Default::default()
        };
        let mut builder = RuleBuilder::new(&catalog).with_config(&config);
        let g = builder.add_group(ROOT_ID, LogicalOperator::Or).unwrap();
        assert!(matches!(
            builder.add_group(&g, LogicalOperator::And),
            Err(BuilderError::TooDeep { max_depth: 2, .. })
        ));
    }

    #[test]
    fn test_move_node() {
        let catalog = AttributeCatalog::standard();
        let mut builder = RuleBuilder::new(&catalog);
        let c1 = builder.add_condition(ROOT_ID).unwrap();
        let g1 = builder.add_group(ROOT_ID, LogicalOperator::Or).unwrap();
        let g2 = builder.add_group(&g1, LogicalOperator::And).unwrap();

        builder.move_node(&c1, &g2, 0).unwrap();
        assert_eq!(builder.rule().depth_of(&g2), Some(3));
        assert!(builder
            .rule()
            .find_group(&g2)
            .is_some_and(|g| g.children.len() == 1));

        // Reorder within the root.
        let c3 = builder.add_condition(ROOT_ID).unwrap();
        builder.move_node(&c3, ROOT_ID, 0).unwrap();
        assert_eq!(builder.rule().children[0].id(), c3);

        assert!(matches!(
            builder.move_node(&g1, &g2, 0),
            Err(BuilderError::InvalidMove { .. })
        ));
        assert!(matches!(
            builder.move_node(ROOT_ID, &g1, 0),
            Err(BuilderError::InvalidMove { .. })
        ));
    }

    #[test]
    fn test_previous_tree_is_untouched_and_undo() {
        let catalog = AttributeCatalog::standard();
        let seen = RefCell::new(Vec::new());
        let mut builder =
            RuleBuilder::new(&catalog).on_change(|rule| seen.borrow_mut().push(rule.clone()));

        let id = builder.add_condition(ROOT_ID).unwrap();
        let snapshot = builder.rule().clone();
        builder
            .update_condition(
                &id,
                ConditionPatch::default().attribute("location.city"),
            )
            .unwrap();
        assert!(snapshot.find_condition(&id).is_some_and(Condition::is_unset));

        builder.undo().unwrap();
        assert_eq!(builder.rule(), &snapshot);
        builder.undo().unwrap();
        assert_eq!(builder.rule(), &create_empty_rule());
        assert_eq!(builder.undo(), Err(BuilderError::NothingToUndo));
        drop(builder);

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[1].conditions()[0].attribute, "location.city");
    }
}

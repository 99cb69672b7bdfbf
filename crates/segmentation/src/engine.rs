//! Rule evaluator. Decides whether a worker belongs to a segment.
//!
//! Evaluation is pure: the same tree and attribute set always give the same
//! answer, and nothing is shared between calls, so batches fan out across
//! the rayon pool.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::attributes::WorkerAttributeSet;
use crate::catalog::AttributeCatalog;
use crate::error::EvaluationError;
use crate::predicates::compare_values;
use crate::rule::{Condition, Group, LogicalOperator, RuleNode};

pub struct RuleEvaluator<'a> {
    catalog: &'a AttributeCatalog,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(catalog: &'a AttributeCatalog) -> Self {
        Self { catalog }
    }

    /// Evaluate a whole rule (its root group).
    pub fn evaluate_rule(
        &self,
        rule: &Group,
        attributes: &WorkerAttributeSet,
    ) -> Result<bool, EvaluationError> {
        check_arity(rule)?;
        Ok(self.matches_group(rule, attributes))
    }

    pub fn evaluate_node(
        &self,
        node: &RuleNode,
        attributes: &WorkerAttributeSet,
    ) -> Result<bool, EvaluationError> {
        match node {
            RuleNode::Group(g) => self.evaluate_rule(g, attributes),
            RuleNode::Condition(c) => Ok(self.matches_condition(c, attributes)),
        }
    }

    /// Ids of the workers matching `rule`, sorted. Runs in parallel once the
    /// batch reaches `parallel_threshold` workers.
    pub fn evaluate_batch(
        &self,
        rule: &Group,
        workers: &HashMap<String, WorkerAttributeSet>,
        parallel_threshold: usize,
    ) -> Result<Vec<String>, EvaluationError> {
        check_arity(rule)?;

        let mut members: Vec<String> = if workers.len() >= parallel_threshold {
            workers
                .par_iter()
                .filter(|(_, attrs)| self.matches_group(rule, attrs))
                .map(|(id, _)| id.clone())
                .collect()
        } else {
            workers
                .iter()
                .filter(|(_, attrs)| self.matches_group(rule, attrs))
                .map(|(id, _)| id.clone())
                .collect()
        };
        members.sort();

        metrics::counter!("segmentation.evaluations").increment(workers.len() as u64);
        debug!(
            rule_id = %rule.id,
            workers = workers.len(),
            members = members.len(),
            "Batch membership evaluated"
        );
        Ok(members)
    }

    fn matches_group(&self, group: &Group, attributes: &WorkerAttributeSet) -> bool {
        match group.logical_operator {
            LogicalOperator::And => group
                .children
                .iter()
                .all(|child| self.matches_node(child, attributes)),
            LogicalOperator::Or => group
                .children
                .iter()
                .any(|child| self.matches_node(child, attributes)),
            // Arity is checked before any walk starts.
            LogicalOperator::Not => group
                .children
                .first()
                .map_or(false, |child| !self.matches_node(child, attributes)),
        }
    }

    fn matches_node(&self, node: &RuleNode, attributes: &WorkerAttributeSet) -> bool {
        match node {
            RuleNode::Group(g) => self.matches_group(g, attributes),
            RuleNode::Condition(c) => self.matches_condition(c, attributes),
        }
    }

    /// Dangling attributes and operators the attribute's type does not admit
    /// evaluate to false.
    fn matches_condition(&self, condition: &Condition, attributes: &WorkerAttributeSet) -> bool {
        let ty = match self.catalog.attribute_type(&condition.attribute) {
            Some(ty) => ty,
            None => return false,
        };
        if !ty.supports(&condition.operator) {
            return false;
        }
        compare_values(
            attributes.resolve(&condition.attribute),
            &condition.operator,
            &condition.value,
            ty,
        )
    }
}

/// Evaluate `node` against the standard worker catalog.
pub fn evaluate(node: &RuleNode, attributes: &WorkerAttributeSet) -> Result<bool, EvaluationError> {
    RuleEvaluator::new(AttributeCatalog::shared()).evaluate_node(node, attributes)
}

/// Every NOT group in the tree must hold exactly one child.
pub fn check_arity(group: &Group) -> Result<(), EvaluationError> {
    if group.logical_operator == LogicalOperator::Not && group.children.len() != 1 {
        return Err(EvaluationError::NotArity {
            group_id: group.id.clone(),
            children: group.children.len(),
        });
    }
    group
        .children
        .iter()
        .filter_map(RuleNode::as_group)
        .try_for_each(check_arity)
}

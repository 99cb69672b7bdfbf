//! Segment service. Tenant-scoped segment lifecycle and membership.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coach_core::config::SegmentationConfig;
use coach_core::{AccessContext, CoachError, CoachResult, Permission};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::attributes::WorkerAttributeSet;
use crate::catalog::AttributeCatalog;
use crate::engine::RuleEvaluator;
use crate::rule::SegmentRule;
use crate::store::{Segment, SegmentStore};
use crate::validate::validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResult {
    pub segment_id: Uuid,
    pub members: Vec<String>,
    pub evaluated: usize,
    pub computed_at: DateTime<Utc>,
}

pub struct SegmentService {
    store: Arc<dyn SegmentStore>,
    catalog: Arc<AttributeCatalog>,
    config: SegmentationConfig,
}

impl SegmentService {
    pub fn new(
        store: Arc<dyn SegmentStore>,
        catalog: Arc<AttributeCatalog>,
        config: SegmentationConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &AttributeCatalog {
        &self.catalog
    }

    pub async fn create_segment(
        &self,
        ctx: &AccessContext,
        name: impl Into<String>,
        description: Option<String>,
        rule: SegmentRule,
    ) -> CoachResult<Segment> {
        ctx.require(Permission::SegmentWrite)?;
        self.ensure_valid(&rule)?;

        let mut segment = Segment::new(ctx.organization_id, name, rule);
        segment.description = description;
        self.store.put(&segment).await?;

        info!(
            segment_id = %segment.id,
            organization_id = %segment.organization_id,
            name = %segment.name,
            "Segment created"
        );
        Ok(segment)
    }

    pub async fn get_segment(&self, ctx: &AccessContext, id: Uuid) -> CoachResult<Segment> {
        ctx.require(Permission::SegmentRead)?;
        self.load_scoped(ctx, id).await
    }

    pub async fn list_segments(&self, ctx: &AccessContext) -> CoachResult<Vec<Segment>> {
        ctx.require(Permission::SegmentRead)?;
        self.store.list_for_organization(ctx.organization_id).await
    }

    /// Replace a segment's rule. Rules with validation issues are refused.
    pub async fn update_rule(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        rule: SegmentRule,
    ) -> CoachResult<Segment> {
        ctx.require(Permission::SegmentWrite)?;
        self.ensure_valid(&rule)?;

        let mut segment = self.load_scoped(ctx, id).await?;
        segment.rule = rule;
        segment.updated_at = Utc::now();
        self.store.put(&segment).await?;

        info!(segment_id = %id, "Segment rule updated");
        Ok(segment)
    }

    pub async fn delete_segment(&self, ctx: &AccessContext, id: Uuid) -> CoachResult<()> {
        ctx.require(Permission::SegmentDelete)?;
        self.load_scoped(ctx, id).await?;
        self.store.delete(id).await?;
        info!(segment_id = %id, "Segment deleted");
        Ok(())
    }

    /// Evaluate a stored segment against a batch of workers.
    pub async fn compute_membership(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        workers: &HashMap<String, WorkerAttributeSet>,
    ) -> CoachResult<MembershipResult> {
        ctx.require(Permission::SegmentRead)?;
        ctx.require(Permission::WorkerRead)?;
        let segment = self.load_scoped(ctx, id).await?;

        let evaluator = RuleEvaluator::new(&self.catalog);
        let members =
            evaluator.evaluate_batch(&segment.rule, workers, self.config.parallel_threshold)?;

        metrics::counter!("segmentation.membership_runs").increment(1);
        info!(
            segment_id = %id,
            evaluated = workers.len(),
            members = members.len(),
            "Segment membership computed"
        );
        Ok(MembershipResult {
            segment_id: id,
            members,
            evaluated: workers.len(),
            computed_at: Utc::now(),
        })
    }

    /// Every segment of the caller's organization that `worker` belongs to.
    pub async fn segments_for_worker(
        &self,
        ctx: &AccessContext,
        worker: &WorkerAttributeSet,
    ) -> CoachResult<Vec<Uuid>> {
        ctx.require(Permission::SegmentRead)?;
        ctx.require(Permission::WorkerRead)?;
        let evaluator = RuleEvaluator::new(&self.catalog);

        let mut memberships = Vec::new();
        for segment in self.store.list_for_organization(ctx.organization_id).await? {
            if evaluator.evaluate_rule(&segment.rule, worker)? {
                memberships.push(segment.id);
            }
        }
        Ok(memberships)
    }

    async fn load_scoped(&self, ctx: &AccessContext, id: Uuid) -> CoachResult<Segment> {
        let segment = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CoachError::NotFound(format!("segment {id}")))?;
        ctx.require_organization(segment.organization_id)?;
        Ok(segment)
    }

    fn ensure_valid(&self, rule: &SegmentRule) -> CoachResult<()> {
        let issues = validate(rule, &self.catalog);
        if issues.is_empty() {
            return Ok(());
        }
        let summary = issues
            .iter()
            .map(|i| format!("{}: {}", i.node_id, i.kind))
            .collect::<Vec<_>>()
            .join("; ");
        Err(CoachError::Validation(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::Operator;
    use crate::rule::{Condition, Group};
    use crate::store::InMemorySegmentStore;
    use serde_json::json;

    fn service() -> SegmentService {
        SegmentService::new(
            Arc::new(InMemorySegmentStore::new()),
            Arc::new(AttributeCatalog::standard()),
            SegmentationConfig::default(),
        )
    }

    fn active_rule() -> SegmentRule {
        Group::empty_rule().with_child(Condition {
            id: "c1".into(),
            attribute: "employment.employmentStatus".into(),
            operator: Operator::Equals,
            value: json!("active"),
        })
    }

    #[tokio::test]
    async fn test_create_and_compute_membership() {
        let svc = service();
        let ctx = AccessContext::admin(Uuid::new_v4(), Uuid::new_v4());
        let segment = svc
            .create_segment(&ctx, "Active workers", None, active_rule())
            .await
            .unwrap();

        let workers: HashMap<String, WorkerAttributeSet> = [
            ("w1", json!({"employment": {"employmentStatus": "active"}})),
            ("w2", json!({"employment": {"employmentStatus": "terminated"}})),
            ("w3", json!({})),
        ]
        .into_iter()
        .map(|(id, doc)| (id.to_string(), WorkerAttributeSet::from_value(doc)))
        .collect();

        let result = svc.compute_membership(&ctx, segment.id, &workers).await.unwrap();
        assert_eq!(result.members, vec!["w1".to_string()]);
        assert_eq!(result.evaluated, 3);

        let matched = svc.segments_for_worker(&ctx, &workers["w1"]).await.unwrap();
        assert_eq!(matched, vec![segment.id]);
    }

    #[tokio::test]
    async fn test_invalid_rule_is_not_saved() {
        let svc = service();
        let ctx = AccessContext::admin(Uuid::new_v4(), Uuid::new_v4());
        let rule = Group::empty_rule().with_child(Condition::unset("c1"));
        let err = svc.create_segment(&ctx, "Draft", None, rule).await.unwrap_err();
        assert!(matches!(err, CoachError::Validation(msg) if msg.contains("c1")));
        assert!(svc.list_segments(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permissions_and_tenant_scope() {
        let svc = service();
        let org = Uuid::new_v4();
        let admin = AccessContext::admin(Uuid::new_v4(), org);
        let segment = svc
            .create_segment(&admin, "Active", None, active_rule())
            .await
            .unwrap();

        let reader = AccessContext::new(Uuid::new_v4(), org, [Permission::SegmentRead]);
        assert!(svc.get_segment(&reader, segment.id).await.is_ok());
        assert!(matches!(
            svc.delete_segment(&reader, segment.id).await,
            Err(CoachError::Forbidden(_))
        ));
        assert!(matches!(
            svc.update_rule(&reader, segment.id, active_rule()).await,
            Err(CoachError::Forbidden(_))
        ));

        let outsider = AccessContext::admin(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            svc.get_segment(&outsider, segment.id).await,
            Err(CoachError::Forbidden(_))
        ));
        assert!(svc.list_segments(&outsider).await.unwrap().is_empty());

        svc.delete_segment(&admin, segment.id).await.unwrap();
        assert!(matches!(
            svc.get_segment(&admin, segment.id).await,
            Err(CoachError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rule_bumps_timestamp() {
        let svc = service();
        let ctx = AccessContext::admin(Uuid::new_v4(), Uuid::new_v4());
        let segment = svc
            .create_segment(&ctx, "Active", None, active_rule())
            .await
            .unwrap();
        let rule = active_rule().with_child(Condition {
            id: "c2".into(),
            attribute: "engagement.engagementRate".into(),
            operator: Operator::GreaterThanOrEqual,
            value: json!(50),
        });
        let updated = svc.update_rule(&ctx, segment.id, rule.clone()).await.unwrap();
        assert_eq!(updated.rule, rule);
        assert!(updated.updated_at >= segment.updated_at);
        assert_eq!(updated.created_at, segment.created_at);
    }
}

//! Session-scoped access context. Built once per authenticated session and
//! passed explicitly to whatever needs a permission check.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoachError, CoachResult};

/// Fine-grained permission for segment resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SegmentRead,
    SegmentWrite,
    SegmentDelete,
    WorkerRead,
}

impl Permission {
    /// All permission variants.
    pub fn all() -> Vec<Permission> {
        vec![
            Permission::SegmentRead,
            Permission::SegmentWrite,
            Permission::SegmentDelete,
            Permission::WorkerRead,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub permissions: HashSet<Permission>,
    pub is_admin: bool,
}

impl AccessContext {
    pub fn new(
        user_id: Uuid,
        organization_id: Uuid,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            user_id,
            organization_id,
            permissions: permissions.into_iter().collect(),
            is_admin: false,
        }
    }

    /// Organization admin. Holds every permission but stays scoped to its
    /// own organization.
    pub fn admin(user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id,
            permissions: Permission::all().into_iter().collect(),
            is_admin: true,
        }
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.is_admin || self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> CoachResult<()> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(CoachError::Forbidden(format!(
                "user {} lacks {:?}",
                self.user_id, permission
            )))
        }
    }

    pub fn require_organization(&self, organization_id: Uuid) -> CoachResult<()> {
        if self.organization_id == organization_id {
            Ok(())
        } else {
            Err(CoachError::Forbidden(format!(
                "user {} cannot access organization {}",
                self.user_id, organization_id
            )))
        }
    }
}

//! Segment persistence. The segment entity and the stores that hold it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coach_core::CoachResult;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::rule::SegmentRule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "crate::codec::versioned")]
    pub rule: SegmentRule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn new(organization_id: Uuid, name: impl Into<String>, rule: SegmentRule) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            description: None,
            rule,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> CoachResult<Option<Segment>>;

    /// Insert or replace.
    async fn put(&self, segment: &Segment) -> CoachResult<()>;

    /// Returns whether a segment was removed.
    async fn delete(&self, id: Uuid) -> CoachResult<bool>;

    /// Segments of one organization, sorted by name.
    async fn list_for_organization(&self, organization_id: Uuid) -> CoachResult<Vec<Segment>>;
}

/// Process-local store backed by DashMap.
#[derive(Default)]
pub struct InMemorySegmentStore {
    segments: DashMap<Uuid, Segment>,
}

impl InMemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn get(&self, id: Uuid) -> CoachResult<Option<Segment>> {
        Ok(self.segments.get(&id).map(|s| s.clone()))
    }

    async fn put(&self, segment: &Segment) -> CoachResult<()> {
        self.segments.insert(segment.id, segment.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoachResult<bool> {
        Ok(self.segments.remove(&id).is_some())
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> CoachResult<Vec<Segment>> {
        let mut segments: Vec<Segment> = self
            .segments
            .iter()
            .filter(|s| s.organization_id == organization_id)
            .map(|s| s.value().clone())
            .collect();
        segments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(segments)
    }
}

/// One pretty-printed JSON document per segment, `<dir>/<id>.json`.
pub struct FileSegmentStore {
    dir: PathBuf,
}

impl FileSegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SegmentStore for FileSegmentStore {
    async fn get(&self, id: Uuid) -> CoachResult<Option<Segment>> {
        let text = match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn put(&self, segment: &Segment) -> CoachResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(segment)?;
        let path = self.path_for(segment.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(segment_id = %segment.id, path = %path.display(), "Segment written");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoachResult<bool> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> CoachResult<Vec<Segment>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut segments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Segment>(&text) {
                Ok(segment) if segment.organization_id == organization_id => segments.push(segment),
                Ok(_) => {}
                // Left on disk for repair; listing carries on.
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable segment"),
            }
        }
        segments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(segments)
    }
}

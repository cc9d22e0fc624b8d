//! Durable, deduplicating result store: one JSON array of posts per target,
//! full-file rewrite on every append.

use std::path::{Path, PathBuf};

use groupharvest_common::{HarvestError, Post, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Result set for one output target. Every `append` reloads, checks
/// identity, and rewrites the whole file as a unit, so an interrupted run
/// can lose at most the in-flight write, never corrupt prior data.
pub struct ResultStore {
    target: PathBuf,
}

impl ResultStore {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Previously collected posts, in their persisted order. A missing or
    /// unreadable file means no prior data, never an error.
    pub async fn load(&self) -> Vec<Post> {
        let raw = match tokio::fs::read_to_string(&self.target).await {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(posts) => posts,
            Err(e) => {
                warn!(
                    target = %self.target.display(),
                    error = %e,
                    "Result file unreadable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Append one post unless a post with the same identity is already
    /// persisted. Returns whether the post was added.
    pub async fn append(&self, post: &Post) -> Result<bool> {
        let mut posts = self.load().await;
        if posts.iter().any(|existing| existing.same_post(post)) {
            debug!(id = %post.id, "Duplicate post skipped");
            return Ok(false);
        }
        posts.push(post.clone());
        self.save(&posts).await?;
        Ok(true)
    }

    /// Rewrite the whole result file: 4-space indented JSON array, UTF-8,
    /// written to a sibling temp file and renamed into place.
    pub async fn save(&self, posts: &[Post]) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        posts
            .serialize(&mut serializer)
            .map_err(HarvestError::storage)?;

        if let Some(parent) = self.target.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(HarvestError::storage)?;
            }
        }

        let tmp = self.target.with_extension("json.tmp");
        tokio::fs::write(&tmp, &buf)
            .await
            .map_err(HarvestError::storage)?;
        tokio::fs::rename(&tmp, &self.target)
            .await
            .map_err(HarvestError::storage)?;
        Ok(())
    }
}

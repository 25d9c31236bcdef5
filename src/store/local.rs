//! Local filesystem store implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── sources/              # One snapshot per source
//! │   ├── ooms.json
//! │   └── klipenvw.json
//! └── changes.jsonl         # Append-only change audit log
//! ```
//!
//! A source snapshot is replaced with a temp-file write followed by a
//! rename, so a scan's upserts and removal pass land as one unit; a
//! crash mid-commit leaves the previous snapshot in place.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, Listing};
use crate::store::{ListingPage, ListingQuery, ListingStore, SourceState};

const SOURCES_DIR: &str = "sources";
const CHANGES_LOG: &str = "changes.jsonl";

/// On-disk form of one source's committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceSnapshot {
    updated_at: DateTime<Utc>,
    count: usize,
    listings: Vec<Listing>,
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (and create) a store rooted at the given directory.
    ///
    /// Failure here means the store is unavailable, which is fatal for
    /// the process at startup.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(SOURCES_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn source_path(&self, source_id: &str) -> PathBuf {
        self.root.join(SOURCES_DIR).join(format!("{source_id}.json"))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes_atomic(&self, path: &PathBuf, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read JSON data, returning None if the file doesn't exist.
    async fn read_json<T: DeserializeOwned>(&self, path: &PathBuf) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn append_changes(&self, events: &[ChangeEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for event in events {
            lines.push_str(&serde_json::to_string(event)?);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(CHANGES_LOG))
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_all_listings(&self) -> Result<Vec<Listing>> {
        let mut listings = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(SOURCES_DIR)).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_json::<SourceSnapshot>(&path).await {
                Ok(Some(snapshot)) => listings.extend(snapshot.listings),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable snapshot {path:?}: {e}"),
            }
        }

        listings.sort_by(|a, b| {
            (a.source_id.as_str(), a.external_id.as_str())
                .cmp(&(b.source_id.as_str(), b.external_id.as_str()))
        });
        Ok(listings)
    }
}

#[async_trait]
impl ListingStore for LocalStore {
    async fn load_source(&self, source_id: &str) -> Result<SourceState> {
        match self
            .read_json::<SourceSnapshot>(&self.source_path(source_id))
            .await?
        {
            Some(snapshot) => Ok(SourceState::from_listings(source_id, snapshot.listings)),
            None => Ok(SourceState::empty(source_id)),
        }
    }

    async fn commit_source(&self, state: &SourceState, events: &[ChangeEvent]) -> Result<()> {
        let source_id = state.source_id();
        let snapshot = SourceSnapshot {
            updated_at: Utc::now(),
            count: state.len(),
            listings: state.sorted_listings(),
        };

        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| AppError::store_commit(source_id, e))?;
        self.write_bytes_atomic(&self.source_path(source_id), &bytes)
            .await
            .map_err(|e| AppError::store_commit(source_id, e))?;

        // The audit log is best-effort once the snapshot has landed; the
        // events have already been handed to the dispatcher.
        if let Err(e) = self.append_changes(events).await {
            log::error!("Failed to append {} change(s) to audit log: {e}", events.len());
        }
        Ok(())
    }

    async fn list_listings(&self, query: &ListingQuery) -> Result<ListingPage> {
        let all = self.load_all_listings().await?;
        let matched: Vec<Listing> = all.into_iter().filter(|l| query.matches(l)).collect();
        let total = matched.len();

        let listings: Vec<Listing> = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(ListingPage { total, listings })
    }

    async fn recent_changes(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>> {
        let path = self.root.join(CHANGES_LOG);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ChangeEvent>(line) {
                Ok(event) if event.occurred_at >= since => events.push(event),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping corrupt audit log line: {e}"),
            }
        }

        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}

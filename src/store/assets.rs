//! Asset status store and JSON persistence.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::provider::{AssetStatus, JobStatus};
use crate::webhook::VideoEvent;

/// Where the latest update for an asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Submission,
    Webhook,
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub status: JobStatus,
    pub playback_id: Option<String>,
    pub duration_secs: Option<u64>,
    /// Last failure seen while tracking this asset (stalled poll, provider error).
    pub last_error: Option<String>,
    pub source: UpdateSource,
    /// Unix seconds.
    pub updated_at: u64,
}

/// Concurrent asset map, cheap to clone.
#[derive(Clone, Default)]
pub struct AssetStore {
    inner: Arc<DashMap<String, AssetRecord>>,
    persistence_path: Option<String>,
}

impl AssetStore {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from `path` if the file exists; start empty otherwise.
    pub fn load_from_file(path: &str) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, AssetRecord> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                store.inner.insert(k, v);
            }
            metrics::record_assets_tracked(store.inner.len());
            tracing::info!(count = store.inner.len(), path, "Loaded asset store");
        }
        Ok(store)
    }

    /// Write the store to its configured path. No-op without one.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.persistence_path {
            let map: HashMap<_, _> = self
                .inner
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect();

            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(writer, &map)?;
            tracing::info!(count = map.len(), path = %path, "Saved asset store");
        }
        Ok(())
    }

    /// Apply a provider status. Returns `false` if it was ignored because
    /// the asset already reached a terminal state.
    pub fn apply_status(&self, status: &AssetStatus, source: UpdateSource) -> bool {
        self.upsert(
            &status.asset_id,
            status.status.clone(),
            status.playback_id.clone(),
            status.duration_secs,
            source,
        )
    }

    /// Apply a verified webhook event. Non-asset events and events without
    /// a status are ignored.
    pub fn apply_event(&self, event: &VideoEvent) -> bool {
        if !event.is_asset_event() {
            return false;
        }
        let Some(status) = event.status() else {
            return false;
        };
        self.upsert(
            event.asset_id(),
            status,
            event.playback_id().map(str::to_string),
            event.duration_secs(),
            UpdateSource::Webhook,
        )
    }

    /// Note a failure without changing the asset's status. Unknown assets
    /// are not created; returns `false` for them.
    pub fn record_failure(&self, asset_id: &str, error: impl Into<String>) -> bool {
        let Some(mut record) = self.inner.get_mut(asset_id) else {
            return false;
        };
        record.last_error = Some(error.into());
        record.updated_at = now_unix();
        true
    }

    /// Settle a known asset as errored, e.g. after the provider stopped
    /// recognising it. Unknown assets are not created.
    pub fn mark_errored(&self, asset_id: &str, error: impl Into<String>) -> bool {
        if !self.inner.contains_key(asset_id) {
            return false;
        }
        self.upsert(
            asset_id,
            JobStatus::Errored(Some(error.into())),
            None,
            None,
            UpdateSource::Poll,
        )
    }

    pub fn get(&self, asset_id: &str) -> Option<AssetRecord> {
        self.inner.get(asset_id).map(|r| r.value().clone())
    }

    /// All records, sorted by asset id.
    pub fn list(&self) -> Vec<AssetRecord> {
        let mut records: Vec<_> = self.inner.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        records
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    fn upsert(
        &self,
        asset_id: &str,
        status: JobStatus,
        playback_id: Option<String>,
        duration_secs: Option<u64>,
        source: UpdateSource,
    ) -> bool {
        let mut entry = self
            .inner
            .entry(asset_id.to_string())
            .or_insert_with(|| AssetRecord {
                asset_id: asset_id.to_string(),
                status: JobStatus::Waiting,
                playback_id: None,
                duration_secs: None,
                last_error: None,
                source,
                updated_at: 0,
            });
        let record = entry.value_mut();

        // A finished asset only accepts repeats of its own outcome.
        if record.status.is_terminal() && !same_outcome(&record.status, &status) {
            tracing::debug!(
                asset_id,
                current = record.status.as_str(),
                incoming = status.as_str(),
                "Ignoring update for finished asset"
            );
            return false;
        }

        if let JobStatus::Errored(reason) = &status {
            record.last_error = reason.clone().or(record.last_error.take());
        } else {
            record.last_error = None;
        }
        record.status = status;
        record.playback_id = playback_id.or(record.playback_id.take());
        record.duration_secs = duration_secs.or(record.duration_secs);
        record.source = source;
        record.updated_at = now_unix();
        drop(entry);

        metrics::record_assets_tracked(self.inner.len());
        true
    }
}

fn same_outcome(current: &JobStatus, incoming: &JobStatus) -> bool {
    matches!(
        (current, incoming),
        (JobStatus::Ready, JobStatus::Ready) | (JobStatus::Errored(_), JobStatus::Errored(_))
    )
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: &str, status: JobStatus) -> AssetStatus {
        AssetStatus {
            asset_id: id.to_string(),
            status,
            playback_id: None,
            duration_secs: None,
        }
    }

    #[test]
    fn test_status_updates() {
        let store = AssetStore::new(None);
        assert!(store.get("a1").is_none());

        assert!(store.apply_status(&status("a1", JobStatus::Preparing), UpdateSource::Poll));
        assert_eq!(store.get("a1").unwrap().status, JobStatus::Preparing);

        let mut ready = status("a1", JobStatus::Ready);
        ready.playback_id = Some("pb-1".into());
        assert!(store.apply_status(&ready, UpdateSource::Poll));

        let record = store.get("a1").unwrap();
        assert_eq!(record.status, JobStatus::Ready);
        assert_eq!(record.playback_id.as_deref(), Some("pb-1"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_terminal_state_is_not_regressed() {
        let store = AssetStore::new(None);
        store.apply_status(&status("a1", JobStatus::Ready), UpdateSource::Webhook);

        assert!(!store.apply_status(&status("a1", JobStatus::Preparing), UpdateSource::Poll));
        let record = store.get("a1").unwrap();
        assert_eq!(record.status, JobStatus::Ready);
        assert_eq!(record.source, UpdateSource::Webhook);
    }

    #[test]
    fn test_apply_event() {
        let store = AssetStore::new(None);
        let event = VideoEvent::parse(
            br#"{"type":"video.asset.errored","data":{"id":"a2","status":"errored","errors":{"messages":["bad input"]}}}"#,
        )
        .unwrap();
        assert!(store.apply_event(&event));

        let record = store.get("a2").unwrap();
        assert!(record.status.is_terminal());
        assert_eq!(record.last_error.as_deref(), Some("bad input"));

        let other = VideoEvent::parse(br#"{"type":"video.live_stream.idle","data":{"id":"ls1"}}"#).unwrap();
        assert!(!store.apply_event(&other));
        assert!(store.get("ls1").is_none());
    }

    #[test]
    fn test_terminal_outcome_is_not_replaced() {
        let store = AssetStore::new(None);
        store.apply_status(&status("a1", JobStatus::Ready), UpdateSource::Webhook);

        assert!(!store.apply_status(&status("a1", JobStatus::Errored(Some("late".into()))), UpdateSource::Poll));
        assert!(!store.mark_errored("a1", "not found"));
        let record = store.get("a1").unwrap();
        assert_eq!(record.status, JobStatus::Ready);
        assert!(record.last_error.is_none());

        // A repeat of the same outcome may still fill in details.
        let mut ready = status("a1", JobStatus::Ready);
        ready.playback_id = Some("pb-1".into());
        assert!(store.apply_status(&ready, UpdateSource::Poll));
        assert_eq!(store.get("a1").unwrap().playback_id.as_deref(), Some("pb-1"));

        store.apply_status(&status("a2", JobStatus::Errored(Some("bad input".into()))), UpdateSource::Webhook);
        assert!(!store.apply_status(&status("a2", JobStatus::Ready), UpdateSource::Poll));
        assert!(matches!(store.get("a2").unwrap().status, JobStatus::Errored(_)));
    }

    #[test]
    fn test_record_failure_keeps_status() {
        let store = AssetStore::new(None);
        store.apply_status(&status("a3", JobStatus::Preparing), UpdateSource::Poll);
        assert!(store.record_failure("a3", "polling timed out"));

        let record = store.get("a3").unwrap();
        assert_eq!(record.status, JobStatus::Preparing);
        assert_eq!(record.last_error.as_deref(), Some("polling timed out"));
    }

    #[test]
    fn test_failures_never_create_records() {
        let store = AssetStore::new(None);
        assert!(!store.record_failure("bogus-id", "provider returned 404"));
        assert!(!store.mark_errored("bogus-id", "provider returned 404"));
        assert!(store.get("bogus-id").is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_mark_errored_settles_known_asset() {
        let store = AssetStore::new(None);
        store.apply_status(&status("a4", JobStatus::Preparing), UpdateSource::Submission);
        assert!(store.mark_errored("a4", "provider returned 404"));

        let record = store.get("a4").unwrap();
        assert!(record.status.is_terminal());
        assert_eq!(record.last_error.as_deref(), Some("provider returned 404"));
    }

    #[test]
    fn test_persistence() {
        let path = std::env::temp_dir().join(format!("video-assets-{}.json", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();

        let store = AssetStore::new(Some(path.clone()));
        store.apply_status(&status("a1", JobStatus::Ready), UpdateSource::Poll);
        store.apply_status(&status("a2", JobStatus::Errored(Some("boom".into()))), UpdateSource::Webhook);
        store.save_to_file().unwrap();

        let loaded = AssetStore::load_from_file(&path).unwrap();
        assert_eq!(loaded.count(), 2);
        assert_eq!(loaded.get("a2").unwrap().status, JobStatus::Errored(Some("boom".into())));
        assert_eq!(loaded.list()[0].asset_id, "a1");

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let loaded = AssetStore::load_from_file("/nonexistent/video-assets.json").unwrap();
        assert_eq!(loaded.count(), 0);
    }
}

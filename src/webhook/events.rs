//! Provider webhook event payloads.

use serde::Deserialize;

use crate::provider::types::{AssetErrors, PlaybackId};
use crate::provider::JobStatus;

/// A verified asset event, e.g. `video.asset.ready`.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub errors: Option<AssetErrors>,
}

impl VideoEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn asset_id(&self) -> &str {
        &self.data.id
    }

    /// Only `video.asset.*` events describe asset processing.
    pub fn is_asset_event(&self) -> bool {
        self.kind.starts_with("video.asset.")
    }

    /// Status carried by the event. Falls back to the event type suffix
    /// (`video.asset.ready` → ready) when `data.status` is absent.
    pub fn status(&self) -> Option<JobStatus> {
        let raw = match &self.data.status {
            Some(status) => status.as_str(),
            None => self.kind.strip_prefix("video.asset.")?,
        };
        let mut status = JobStatus::from_provider(raw);
        if let JobStatus::Errored(reason) = &mut status {
            *reason = self.data.errors.as_ref().and_then(AssetErrors::summary);
        }
        Some(status)
    }

    pub fn playback_id(&self) -> Option<&str> {
        self.data.playback_ids.first().map(|p| p.id.as_str())
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.data.duration.map(|d| d.round() as u64)
    }
}

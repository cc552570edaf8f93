//! Provider-facing data types.

use serde::{Deserialize, Serialize};

/// Processing status of an asset (transcode job) at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Upload not yet received.
    Waiting,
    /// Transcoding in progress.
    Preparing,
    /// Playable; terminal success.
    Ready,
    /// Terminal failure, with the provider's reason when given.
    Errored(Option<String>),
    /// A status string this service does not know; treated as non-terminal.
    Unknown(String),
}

impl JobStatus {
    /// Map a provider status string (case-insensitive).
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "waiting" => JobStatus::Waiting,
            "preparing" | "processing" => JobStatus::Preparing,
            "ready" => JobStatus::Ready,
            "errored" | "error" | "error_no_playback_id" => JobStatus::Errored(None),
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Errored(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Preparing => "preparing",
            JobStatus::Ready => "ready",
            JobStatus::Errored(_) => "errored",
            JobStatus::Unknown(s) => s,
        }
    }
}

/// Asset as returned by the provider's status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetStatus {
    pub asset_id: String,
    pub status: JobStatus,
    pub playback_id: Option<String>,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssetEnvelope {
    pub data: AssetBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssetBody {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub errors: Option<AssetErrors>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackId {
    pub id: String,
    #[serde(default)]
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetErrors {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl AssetErrors {
    pub fn summary(&self) -> Option<String> {
        if self.messages.is_empty() {
            self.kind.clone()
        } else {
            Some(self.messages.join("; "))
        }
    }
}

impl From<AssetBody> for AssetStatus {
    fn from(body: AssetBody) -> Self {
        let mut status = JobStatus::from_provider(&body.status);
        if let JobStatus::Errored(reason) = &mut status {
            *reason = body.errors.as_ref().and_then(AssetErrors::summary);
        }
        Self {
            asset_id: body.id,
            status,
            playback_id: body.playback_ids.into_iter().next().map(|p| p.id),
            duration_secs: body.duration.map(|d| d.round() as u64),
        }
    }
}

/// Request body for asset submission.
#[derive(Debug, Serialize)]
pub(crate) struct CreateAssetRequest<'a> {
    pub input: &'a str,
    pub playback_policy: [&'a str; 1],
}

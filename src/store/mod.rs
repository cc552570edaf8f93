//! Local mirror of provider asset state.
//!
//! Fed by verified webhooks, poll outcomes and submissions. Terminal states
//! win: once an asset is `ready` or `errored`, late updates with any other
//! status are ignored. Failures annotate known assets and never create one.

pub mod assets;

pub use assets::{AssetRecord, AssetStore, UpdateSource};

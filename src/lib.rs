// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod error;
pub mod indicator;
pub mod location;
pub mod records;
pub mod text;

// Privacy boundary
pub mod anonymize;
pub mod audit;

// Scoring and spatial analysis
pub mod aggregate;
pub mod cluster;
pub mod severity;
pub mod signal;

// Alerting and response
pub mod alert;
pub mod notify;
pub mod resources;

// Orchestration
pub mod config;
pub mod inbox;
pub mod metrics;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::alert::{Alert, AlertGenerator, AlertTier};
pub use crate::anonymize::Anonymizer;
pub use crate::cluster::{detect_hotspots, Hotspot, HotspotDetector};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::indicator::Indicator;
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::resources::{ResourceRecommendation, ResourceRecommender};
pub use crate::signal::SignalDetector;

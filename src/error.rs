//! Typed failure kinds of the hotspot pipeline.
//!
//! Only `AnonymizationViolation` is terminal for a record; every other kind is
//! a degradation the pipeline logs and routes around.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed required field on an inbound record.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Residual PII found by the validator after scrubbing. Carries pattern
    /// names only, never the matched text.
    #[error("anonymization violation on record {record_id}: {patterns:?}")]
    AnonymizationViolation {
        record_id: String,
        patterns: Vec<&'static str>,
    },

    #[error("model strategy unavailable: {0}")]
    ModelUnavailable(String),

    #[error("density clustering unavailable: {0}")]
    ClusteringUnavailable(String),

    #[error("alert delivery failed: {0}")]
    AlertDelivery(String),

    /// Optimistic version check lost against a concurrent writer.
    #[error("state conflict for hotspot {hotspot_id}: expected version {expected}, found {found}")]
    StateConflict {
        hotspot_id: String,
        expected: u64,
        found: u64,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Short machine-friendly label used as a log field and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::AnonymizationViolation { .. } => "anonymization_violation",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::ClusteringUnavailable(_) => "clustering_unavailable",
            PipelineError::AlertDelivery(_) => "alert_delivery",
            PipelineError::StateConflict { .. } => "state_conflict",
            PipelineError::Config(_) => "config",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_message_names_patterns_not_text() {
        let e = PipelineError::AnonymizationViolation {
            record_id: "abc123".into(),
            patterns: vec!["email", "phone"],
        };
        let s = e.to_string();
        assert!(s.contains("abc123"));
        assert!(s.contains("email"));
        assert_eq!(e.kind(), "anonymization_violation");
    }
}

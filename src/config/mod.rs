// src/config/mod.rs
pub mod classifier;
pub mod pipeline;

pub use classifier::ClassifierConfig;
pub use pipeline::{ClusterAlgorithm, PipelineConfig};

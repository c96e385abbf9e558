use thiserror::Error;

/// Errors produced while running scenarios.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    /// A key the pipeline reads is absent from the configuration.
    #[error("missing configuration field: {0}")]
    MissingConfigField(String),
    /// The sampler rejected a distribution's parameters.
    #[error("invalid {kind} parameters: {reason}")]
    InvalidDistributionParameters { kind: &'static str, reason: String },
}

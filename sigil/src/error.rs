//! Error in sigil

/// Sendable error
pub type SendableError = Box<dyn std::error::Error + Send + Sync>;

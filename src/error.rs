use thiserror::Error;

/// Failures callers may want to tell apart from generic I/O or SQL errors.
#[derive(Error, Debug)]
pub enum N3moError {
    #[error("store unavailable at {path} after {attempts} attempts: {reason}")]
    StoreUnavailable {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("resolve pass `{pass}` failed and was rolled back: {reason}")]
    ResolvePass { pass: &'static str, reason: String },

    #[error("parse failed for {0}")]
    Parse(String),
}

//! Error taxonomy for registry operations.
//!
//! Absence is a normal outcome: empty lookups return `Ok` with an empty
//! result, and the retriever's give-up variants are typed terminal states
//! callers are expected to branch on, not exceptions.

use thiserror::Error;

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Caller bug: empty tag or name, or an object the object system does
    /// not know. Surfaced immediately, never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Construction was asked for a class the object system cannot build.
    #[error("invalid class: {0}")]
    InvalidClass(String),
    /// Retrieval gave up because the wall-clock timeout elapsed.
    #[error("object '{name}' with tag '{tag}' not found: timed out after {attempts} attempts")]
    NotFoundTimeout {
        tag: String,
        name: String,
        attempts: u32,
    },
    /// Retrieval gave up because the attempt budget ran out.
    #[error("object '{name}' with tag '{tag}' not found: {attempts} attempts exhausted")]
    NotFoundExhausted {
        tag: String,
        name: String,
        attempts: u32,
    },
    /// A single key failed to apply inside a settings batch.
    #[error("property '{key}' failed to apply: {reason}")]
    PropertyApply { key: String, reason: String },
}

/// Convenience result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

//! # tagreg-protocol — registry contract crate
//!
//! Shared types and trait boundaries for the tag-indexed object registry.
//! Intentionally dependency-light (no tokio, no locks) so it can serve as a
//! pure contract crate for embedders and collaborator implementations.
//!
//! ## Module overview
//!
//! - [`ids`] — Typed uuid wrappers (`ObjectId`, `SubscriptionId`)
//! - [`tag`] — Normalized [`Tag`] labels and the [`fold_key`] sanitizer
//! - [`event`] — [`TagEvent`], published on every net-new tag association
//! - [`ports`] — Collaborator boundary (`ObjectSystemPort`, `TelemetryPort`)
//! - [`retry`] — [`RetryPolicy`] for blocking retrieval
//! - [`error`] — `RegistryError`, `RegistryResult`

pub mod error;
pub mod event;
pub mod ids;
pub mod ports;
pub mod retry;
pub mod tag;

pub use error::{RegistryError, RegistryResult};
pub use event::TagEvent;
pub use ids::{ObjectId, SubscriptionId};
pub use ports::{ObjectSystemPort, OperationRecord, TelemetryPort};
pub use retry::RetryPolicy;
pub use tag::{FRAMEWORK_TAG, Tag, fold_key};

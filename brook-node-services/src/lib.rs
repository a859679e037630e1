//! The interfaces of some Brook node services.
//!
//! The verification and acknowledgment core talks to the rest of the node
//! through the narrow contracts in this crate: the producer-facing
//! [`Notifier`], health readback via [`ServiceStatus`], persistence cleanup
//! via [`BlockRemover`], and pluggable [`SignatureVerifier`] capability.
//! The implementations live with the transport, storage, and operational
//! layers; this crate keeps the core decoupled from all of them.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod notifier;
pub mod remove;
pub mod signature;
pub mod status;

pub use notifier::{EndOfStreamCode, Notifier};
pub use remove::BlockRemover;
pub use signature::SignatureVerifier;
pub use status::{ServiceStatus, StatusHandle};

/// Error type alias to make working with tower traits easier.
///
/// Note: the 'static lifetime bound means that the *type* cannot have any
/// non-'static lifetimes, (e.g., when a type contains a borrow and is
/// parameterized by 'a), *not* that the object itself has 'static lifetime.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

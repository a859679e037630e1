//! Block verification and acknowledgment for Brook.
//!
//! Verification consumes the node's single ordered stream of block items,
//! hashes each block's items into a Merkle root as they arrive, and
//! resolves a per-block outcome asynchronously. Independently, the
//! persistence collaborator reports when each block's bytes are durably
//! written. The acknowledgment coordinator joins the two signals and emits
//! acknowledgments back to producers in strictly ascending block order,
//! each exactly once, with verification failures converted into a
//! protocol-level stream abort.
//!
//! # Correctness
//!
//! Item batches must be delivered in stream order: the Merkle root is
//! order-sensitive, so reordering items silently changes every computed
//! root. Delivery threads never block on hashing; roots resolve on
//! background tasks.

#![warn(missing_docs)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

pub mod ack;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod session;


pub use ack::AckCoordinator;
pub use config::Config;
pub use coordinator::{init, VerificationCoordinator, VerificationService};
pub use error::BlockError;
pub use session::{VerificationResult, VerificationSession};

pub use brook_node_services::BoxError;

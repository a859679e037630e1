//! Block removal requests to the persistence collaborator.

use brook_chain::block::Number;

use crate::BoxError;

/// Cleanup interface into block persistence.
///
/// A block that fails verification may already have been durably written;
/// its bytes must not be served to consumers, so the acknowledgment
/// pipeline asks the persistence layer to remove them through this trait.
pub trait BlockRemover: Send + Sync {
    /// Removes the stored block `number`.
    fn remove_block(&self, number: Number) -> Result<(), BoxError>;
}

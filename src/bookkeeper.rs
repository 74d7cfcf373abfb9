//! Bookkeeper contract: persists a finished canonical stream and
//! match metadata. Out of scope for the core beyond this trait — database
//! bookkeeping and file persistence are external collaborators.

use async_trait::async_trait;

use crate::error::ReplayError;

/// Persists a finished match. A failure is logged by the caller and does not
/// prevent `Sender` from draining to its own `ended`.
#[async_trait(?Send)]
pub trait Bookkeeper {
    async fn save_replay(&self, match_id: u64, canonical: &[u8]) -> Result<(), ReplayError>;
}

/// Sentinel bookkeeper for tests and for callers that haven't wired one up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBookkeeper;

#[async_trait(?Send)]
impl Bookkeeper for NullBookkeeper {
    async fn save_replay(&self, _match_id: u64, _canonical: &[u8]) -> Result<(), ReplayError> {
        Ok(())
    }
}

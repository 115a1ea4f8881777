//! Construction errors. Runtime errors are [`shared_types::BusError`].

use ch_01_state_machine::TableError;
use thiserror::Error;

/// Failure to build a [`ProcessBus`](crate::ProcessBus).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid lifecycle table: {0}")]
    Table(#[from] TableError),

    #[error("cannot spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
}

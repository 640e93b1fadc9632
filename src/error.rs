use thiserror::Error;
use tokio::task::JoinError;

use crate::model::PalletError;

/// Fatal repacking failures. Any of these stops the affected pack line.
#[derive(Error, Debug)]
pub enum RepackError {
    #[error("{lost} of {total} boxes lost")]
    BoxesLost { lost: usize, total: usize },

    #[error("pallet {pallet} is not correctly packed: {source}")]
    Placement {
        pallet: usize,
        #[source]
        source: PalletError,
    },

    #[error("output channel closed before truck {truck} could be sent")]
    OutputClosed { truck: i64 },

    #[error("pack line worker failed: {0}")]
    Worker(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, RepackError>;

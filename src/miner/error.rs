//! Miner error types.

use crate::chain::ChainError;
use crate::engine::EngineError;
use crate::miner::token::TokenError;
use alloy_primitives::B256;
use thiserror::Error;

/// Errors raised while preparing, filling or sealing a block.
///
/// Only the synchronous get-work path surfaces these to callers; the
/// background loops log and drop the attempt.
#[derive(Debug, Error)]
pub enum MinerError {
    /// The requested parent block is unknown.
    #[error("missing parent {0}")]
    MissingParent(B256),

    /// A forced timestamp is not after the parent's.
    #[error("invalid timestamp, parent {parent} given {given}")]
    InvalidTimestamp {
        /// Parent block timestamp.
        parent: u64,
        /// Requested timestamp.
        given: u64,
    },

    /// No etherbase configured while the worker is running.
    #[error("refusing to mine without etherbase")]
    NoEtherbase,

    /// Uncle inclusion is disabled in leader mode.
    #[error("uncles are not supported in leader mode")]
    UnclesDisabled,

    /// No uncles once the terminal total difficulty is reached.
    #[error("ignoring uncle at or past the merge")]
    TtdReached,

    /// The uncle is already part of the sealing block.
    #[error("uncle {0} not unique")]
    UncleNotUnique(B256),

    /// The uncle shares a parent with the sealing block.
    #[error("uncle {0} is a sibling")]
    UncleIsSibling(B256),

    /// The uncle's parent is not a known ancestor.
    #[error("parent of uncle {0} unknown")]
    UncleParentUnknown(B256),

    /// The uncle is already in the ancestor family.
    #[error("uncle {0} already included")]
    UncleAlreadyIncluded(B256),

    /// The node is not the leader for this round.
    #[error("mining token unavailable")]
    NotLeader,

    /// Chain access failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The consensus engine rejected the attempt.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The mining-token service failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The worker is shutting down.
    #[error("miner closed")]
    Closed,
}

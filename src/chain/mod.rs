//! The canonical-chain seam.
//!
//! Block storage, fork choice and event feeds live outside this crate;
//! [`Blockchain`] is the surface the sealing worker consumes: head and
//! ancestor lookups, state retrieval with a bounded recovery path,
//! block insertion, and chain-head / side-chain subscriptions.
//!
//! [`InMemoryChain`] is a reference implementation backing the worker
//! tests.

mod config;
mod events;
mod fees;
mod memory;
mod traits;

pub use config::{ChainConfig, CliqueConfig};
pub use events::{
    ChainHeadEvent, ChainSideEvent, NewMinedBlockEvent, NewTxsEvent, CHAIN_HEAD_CHAN_SIZE,
    CHAIN_SIDE_CHAN_SIZE,
};
pub use fees::{calc_base_fee, calc_gas_limit, ELASTICITY_MULTIPLIER, INITIAL_BASE_FEE};
pub use memory::InMemoryChain;
pub use traits::{Blockchain, ChainError};

//! Dual-mode block-sealing worker for an Ethereum-derived chain.
//!
//! This crate implements the subsystem that continuously assembles
//! candidate blocks from the mempool, drives the consensus engine to
//! seal them and inserts sealed blocks into the canonical chain. It
//! supports two coexisting scheduling policies: legacy proof-of-work
//! (uncles, pre-sealed empty blocks, adaptive resubmit intervals) and
//! a token-arbitrated leader mode (cooperative leadership, adaptive
//! block pacing, synchronous seal-and-commit).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        Worker                                  │
//! │                                                                │
//! │  dispatcher ──► main loop ──► task loop ──► result loop        │
//! │  (PoW/leader)   │                                              │
//! │                 ├── Environment (state, txs, receipts, uncles) │
//! │                 ├── pending snapshot (RPC-visible)             │
//! │                 └── leader mode: synchronous seal + token      │
//! └───────┬──────────────┬──────────────┬──────────────┬──────────┘
//!         ▼              ▼              ▼              ▼
//!   TransactionPool  Blockchain      Engine    MiningTokenService
//!   (pending txs)    (store, state)  (seal)    (leader election)
//! ```
//!
//! The pool, chain store, EVM/state database, consensus engine and
//! token service are external collaborators behind traits; in-memory
//! implementations of each back the tests and local development.
//!
//! # Modules
//!
//! - [`primitives`]: blocks, transactions, receipts, logs.
//! - [`chain`]: the chain seam, fee arithmetic and chain events.
//! - [`state`]: the execution-state seam with snapshot/revert.
//! - [`txpool`]: the pool seam and both block-packing orderings.
//! - [`engine`]: the consensus-engine seam and the dev engine.
//! - [`miner`]: the worker, its controllers and public API.

#![warn(missing_docs)]

pub mod chain;
pub mod engine;
pub mod miner;
pub mod primitives;
pub mod state;
pub mod txpool;

// Re-export the block primitives.
pub use primitives::{Block, Header, Log, Receipt, Signer, Transaction};

// Re-export the external seams.
pub use chain::{Blockchain, ChainConfig, ChainError, InMemoryChain};
pub use engine::{DevEngine, Engine, EngineError};
pub use state::{ExecutionError, GasPool, InMemoryState, PendingState};
pub use txpool::{InMemoryPool, TransactionPool, TransactionsByPriceAndNonce, TxOrderer};

// Re-export the worker surface.
pub use miner::{
    BlockBuildParameters, Hooks, LocalTokenService, MinerConfig, MinerError, MiningTokenService,
    SealingMode, Worker, WorkerBuilder,
};

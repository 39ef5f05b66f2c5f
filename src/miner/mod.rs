//! The block-sealing worker and its controllers.
//!
//! This module implements continuous block production for a chain that
//! runs in one of two modes:
//!
//! - **PoW**: uncles, pre-sealed empty blocks, interrupt-driven
//!   resubmits with an adaptive interval, asynchronous sealing through
//!   a task/result pipeline.
//! - **Leader**: an external mining token arbitrates who produces the
//!   next block; builds are paced against ancestor timestamps and run
//!   to a wall-clock deadline, then seal synchronously.
//!
//! # Modules
//!
//! - `config` ([`MinerConfig`]): gas ceiling, recommit interval, build
//!   parameters.
//! - `token` ([`MiningTokenService`]): the leader-election seam.
//! - `environment`: the per-attempt scratchpad (crate-internal).
//! - `pacing` ([`ancestor_times`]): block-cadence control for leader
//!   mode.
//! - `recommit` ([`recalc_recommit`]): the adaptive resubmit
//!   controller.
//! - `mode` ([`SealingMode`]): the PoW/leader policy object.
//! - `unconfirmed`: locally mined blocks awaiting confirmation.
//! - `worker` ([`Worker`]): the loops, committers and public API.
//!
//! # Usage
//!
//! ```ignore
//! use sealer_node::miner::{MinerConfig, WorkerBuilder};
//!
//! let config = MinerConfig::new(coinbase).with_gas_ceil(30_000_000);
//! let worker = WorkerBuilder::new(config, engine, chain, pool, tokens)
//!     .with_init(true)
//!     .build();
//!
//! worker.start();
//! let mut mined = worker.subscribe_mined_blocks();
//! while let Ok(event) = mined.recv().await {
//!     // gossip event.block
//! }
//! ```

mod config;
mod environment;
mod error;
mod mode;
mod pacing;
mod recommit;
mod token;
mod unconfirmed;
mod worker;

pub use config::{
    MinerConfig, DEFAULT_BLOCK_MIN_BUILD_TIME_MS, DEFAULT_BLOCK_TIME_ADJ_BLOCKS,
    DEFAULT_BLOCK_TIME_ADJ_MULTIPLE, DEFAULT_BLOCK_TRAIL_TIME_MS, DEFAULT_GAS_CEIL,
    DEFAULT_GAS_PRICE, DEFAULT_RECOMMIT_INTERVAL,
};
pub use error::MinerError;
pub use mode::SealingMode;
pub use pacing::{ancestor_times, throttle_delay};
pub use recommit::{
    recalc_recommit, INTERVAL_ADJUST_BIAS, INTERVAL_ADJUST_RATIO, MAX_RECOMMIT_INTERVAL,
    MIN_RECOMMIT_INTERVAL,
};
pub use token::{BlockBuildParameters, LocalTokenService, MiningTokenService, TokenError};
pub use worker::{Hooks, Worker, WorkerBuilder};

//! The block-sealing worker.
//!
//! Four cooperating tasks glued together by bounded channels:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ dispatcher (PoW or leader)                                     │
//! │   start / head events / recommit timer → NewWorkReq            │
//! └──────────────┬─────────────────────────────────────────────────┘
//!                ↓ new_work
//! ┌────────────────────────────────────────────────────────────────┐
//! │ main loop                                                      │
//! │   prepare env → commit transactions → commit / commit_ex       │
//! │   also: get-work requests, side blocks, pool events, snapshot  │
//! └──────────────┬─────────────────────────────────────────────────┘
//!                ↓ task (PoW only)
//! ┌────────────────────────────────────────────────────────────────┐
//! │ task loop: dedup by seal hash, abort stale seal, engine.seal   │
//! └──────────────┬─────────────────────────────────────────────────┘
//!                ↓ result
//! ┌────────────────────────────────────────────────────────────────┐
//! │ result loop: stamp receipts, write block, announce             │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! In leader mode the task/result loops stay idle: sealing is cheap,
//! so the main loop seals synchronously in `commit_ex` and releases
//! the mining token once the block is written.

use super::config::MinerConfig;
use super::environment::{Environment, GenerateParams, Task};
use super::error::MinerError;
use super::mode::SealingMode;
use super::pacing;
use super::recommit::{IntervalAdjust, ResubmitController, MIN_RECOMMIT_INTERVAL};
use super::token::MiningTokenService;
use super::unconfirmed::UnconfirmedBlocks;
use crate::chain::{
    calc_base_fee, calc_gas_limit, Blockchain, ChainSideEvent, NewMinedBlockEvent,
    ELASTICITY_MULTIPLIER,
};
use crate::engine::Engine;
use crate::primitives::{
    copy_receipts, stamp_block_location, Block, Header, Log, Receipt, Signer, Transaction, TX_GAS,
};
use crate::state::{ExecutionError, GasPool, PendingState};
use crate::txpool::{TransactionPool, TransactionsByPriceAndNonce, TxOrderer};
use alloy_primitives::{Address, Bytes, B256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Size of the channel listening to sealing results.
pub(crate) const RESULT_QUEUE_SIZE: usize = 10;

/// Size of the resubmit interval adjustment channel.
pub(crate) const RESUBMIT_ADJUST_CHAN_SIZE: usize = 10;

/// Size of the new-work request channel.
const NEW_WORK_CHAN_SIZE: usize = 4;

/// Number of confirmations before logging successful sealing.
pub(crate) const SEALING_LOG_AT_DEPTH: u64 = 7;

/// Maximum depth of an acceptable stale block (uncles, pending tasks).
pub(crate) const STALE_THRESHOLD: u64 = 7;

/// Maximum blocks to regenerate pruned state from.
const STATE_RECOVERY_DEPTH: u64 = 1024;

/// No interrupt requested.
pub(crate) const COMMIT_INTERRUPT_NONE: i32 = 0;
/// Discard the in-flight build; a new head arrived.
pub(crate) const COMMIT_INTERRUPT_NEW_HEAD: i32 = 1;
/// Submit the in-flight build as-is and start a fresh one.
pub(crate) const COMMIT_INTERRUPT_RESUBMIT: i32 = 2;

/// A request for new sealing work with its interrupt handle.
struct NewWorkReq {
    interrupt: Option<Arc<AtomicI32>>,
    noempty: bool,
    timestamp: i64,
}

/// A synchronous request for a sealing block built to order.
struct GetWorkReq {
    params: GenerateParams,
    result: oneshot::Sender<Result<Block, MinerError>>,
}

/// Test hooks, all optional.
#[derive(Default)]
pub struct Hooks {
    /// Called when the task loop receives a sealing task.
    pub new_task: Option<Box<dyn Fn(&Block) + Send + Sync>>,
    /// Decides whether the task loop skips handing a task to the
    /// engine.
    pub skip_seal: Option<Box<dyn Fn(&Block) -> bool + Send + Sync>>,
    /// Called before pushing the full (non-empty) sealing task.
    pub full_task: Option<Box<dyn Fn() + Send + Sync>>,
    /// Called after every resubmit-interval change with
    /// `(min, current)`.
    pub resubmit: Option<Box<dyn Fn(Duration, Duration) + Send + Sync>>,
}

/// Runtime-mutable worker parameters.
struct MutableParams {
    coinbase: Address,
    extra: Bytes,
    gas_ceil: u64,
}

/// The published pending snapshot.
struct Snapshot {
    block: Block,
    receipts: Vec<Receipt>,
    state: Box<dyn PendingState>,
}

/// Releases the single-flight mining flag on drop.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Shared worker state, owned behind an `Arc` by the loop tasks and
/// the public [`Worker`] handle.
struct WorkerCore {
    config: MinerConfig,
    chain_config: crate::chain::ChainConfig,
    engine: Arc<dyn Engine>,
    chain: Arc<dyn Blockchain>,
    pool: Arc<dyn TransactionPool>,
    tokens: Arc<dyn MiningTokenService>,
    mode: SealingMode,

    mined_feed: broadcast::Sender<NewMinedBlockEvent>,
    pending_logs_feed: broadcast::Sender<Vec<Log>>,

    new_work_tx: mpsc::Sender<NewWorkReq>,
    get_work_tx: mpsc::Sender<GetWorkReq>,
    task_tx: mpsc::Sender<Task>,
    result_tx: mpsc::Sender<Block>,
    start_tx: mpsc::Sender<()>,
    side_inject_tx: mpsc::Sender<ChainSideEvent>,
    resubmit_interval_tx: mpsc::Sender<Duration>,
    resubmit_adjust_tx: mpsc::Sender<IntervalAdjust>,

    mu: RwLock<MutableParams>,
    pending_tasks: Mutex<HashMap<B256, Task>>,
    snapshot: RwLock<Option<Snapshot>>,
    local_uncles: Mutex<HashMap<B256, Arc<Block>>>,
    remote_uncles: Mutex<HashMap<B256, Arc<Block>>>,
    unconfirmed: UnconfirmedBlocks,

    running: AtomicBool,
    new_txs: AtomicI32,
    /// Set when pre-sealing empty blocks is disabled.
    noempty: AtomicBool,
    /// Single-flight flag for block-build attempts across every entry
    /// point: timer tick, head event, pending refresh. Intentionally
    /// coarse.
    busy_mining: AtomicBool,

    is_local_block: Option<Box<dyn Fn(&Header) -> bool + Send + Sync>>,
    hooks: Hooks,
}

/// Builder for a [`Worker`].
pub struct WorkerBuilder {
    config: MinerConfig,
    engine: Arc<dyn Engine>,
    chain: Arc<dyn Blockchain>,
    pool: Arc<dyn TransactionPool>,
    tokens: Arc<dyn MiningTokenService>,
    is_local_block: Option<Box<dyn Fn(&Header) -> bool + Send + Sync>>,
    hooks: Hooks,
    init: bool,
}

impl WorkerBuilder {
    /// Start building a worker over the given collaborators.
    pub fn new(
        config: MinerConfig,
        engine: Arc<dyn Engine>,
        chain: Arc<dyn Blockchain>,
        pool: Arc<dyn TransactionPool>,
        tokens: Arc<dyn MiningTokenService>,
    ) -> Self {
        Self {
            config,
            engine,
            chain,
            pool,
            tokens,
            is_local_block: None,
            hooks: Hooks::default(),
            init: false,
        }
    }

    /// Predicate classifying side blocks as locally authored.
    pub fn with_is_local_block(
        mut self,
        predicate: impl Fn(&Header) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_local_block = Some(Box::new(predicate));
        self
    }

    /// Install test hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Submit a first work request on startup so the pending state is
    /// initialized immediately.
    pub fn with_init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    /// Spawn the worker's loops and return the handle.
    pub fn build(mut self) -> Worker {
        if self.config.recommit < MIN_RECOMMIT_INTERVAL {
            warn!(
                target: "miner",
                provided = ?self.config.recommit,
                updated = ?MIN_RECOMMIT_INTERVAL,
                "sanitizing miner recommit interval"
            );
            self.config.recommit = MIN_RECOMMIT_INTERVAL;
        }

        let (new_work_tx, new_work_rx) = mpsc::channel(NEW_WORK_CHAN_SIZE);
        let (get_work_tx, get_work_rx) = mpsc::channel(1);
        let (task_tx, task_rx) = mpsc::channel(1);
        let (result_tx, result_rx) = mpsc::channel(RESULT_QUEUE_SIZE);
        let (start_tx, start_rx) = mpsc::channel(1);
        let (side_inject_tx, side_inject_rx) = mpsc::channel(crate::chain::CHAIN_SIDE_CHAN_SIZE);
        let (resubmit_interval_tx, resubmit_interval_rx) = mpsc::channel(NEW_WORK_CHAN_SIZE);
        let (resubmit_adjust_tx, resubmit_adjust_rx) = mpsc::channel(RESUBMIT_ADJUST_CHAN_SIZE);
        let (exit_tx, exit_rx) = watch::channel(false);
        let (mined_feed, _) = broadcast::channel(RESULT_QUEUE_SIZE);
        let (pending_logs_feed, _) = broadcast::channel(RESULT_QUEUE_SIZE);

        let mode = SealingMode::from_service(self.tokens.as_ref());
        let core = Arc::new(WorkerCore {
            mu: RwLock::new(MutableParams {
                coinbase: self.config.coinbase,
                extra: self.config.extra_data.clone(),
                gas_ceil: self.config.gas_ceil,
            }),
            chain_config: self.chain.config().clone(),
            unconfirmed: UnconfirmedBlocks::new(self.chain.clone(), SEALING_LOG_AT_DEPTH),
            config: self.config,
            engine: self.engine,
            chain: self.chain,
            pool: self.pool,
            tokens: self.tokens,
            mode,
            mined_feed,
            pending_logs_feed,
            new_work_tx,
            get_work_tx,
            task_tx,
            result_tx,
            start_tx,
            side_inject_tx,
            resubmit_interval_tx,
            resubmit_adjust_tx,
            pending_tasks: Mutex::new(HashMap::new()),
            snapshot: RwLock::new(None),
            local_uncles: Mutex::new(HashMap::new()),
            remote_uncles: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            new_txs: AtomicI32::new(0),
            noempty: AtomicBool::new(false),
            busy_mining: AtomicBool::new(false),
            is_local_block: self.is_local_block,
            hooks: self.hooks,
        });

        let txs_rx = core.pool.subscribe_new_txs();
        let side_rx = core.chain.subscribe_chain_side();
        let head_rx = core.chain.subscribe_chain_head();

        let mut handles = Vec::with_capacity(4);
        handles.push(tokio::spawn(main_loop(
            core.clone(),
            new_work_rx,
            get_work_rx,
            txs_rx,
            side_rx,
            side_inject_rx,
            exit_rx.clone(),
        )));
        if mode.is_pow() {
            handles.push(tokio::spawn(work_loop_pow(
                core.clone(),
                start_rx,
                head_rx,
                resubmit_interval_rx,
                resubmit_adjust_rx,
                exit_rx.clone(),
            )));
        } else {
            handles.push(tokio::spawn(work_loop_leader(
                core.clone(),
                start_rx,
                head_rx,
                resubmit_interval_rx,
                resubmit_adjust_rx,
                exit_rx.clone(),
            )));
        }
        handles.push(tokio::spawn(task_loop(core.clone(), task_rx, exit_rx.clone())));
        handles.push(tokio::spawn(result_loop(core.clone(), result_rx, exit_rx)));

        if self.init {
            let _ = core.start_tx.try_send(());
        }
        Worker { core, exit: exit_tx, handles: Mutex::new(handles) }
    }
}

/// The public worker handle.
///
/// Cheap to share; loop tasks run in the background until
/// [`Worker::close`].
pub struct Worker {
    core: Arc<WorkerCore>,
    exit: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    /// Set the etherbase used to initialize the block coinbase field.
    pub fn set_etherbase(&self, address: Address) {
        self.core.mu.write().expect("miner lock poisoned").coinbase = address;
    }

    /// Set the gas ceiling for newly built blocks.
    pub fn set_gas_ceil(&self, ceil: u64) {
        self.core.mu.write().expect("miner lock poisoned").gas_ceil = ceil;
    }

    /// Set the content used to initialize the block extra field.
    pub fn set_extra(&self, extra: Bytes) {
        self.core.mu.write().expect("miner lock poisoned").extra = extra;
    }

    /// Update the interval for sealing work resubmitting.
    pub async fn set_recommit_interval(&self, interval: Duration) {
        let _ = self.core.resubmit_interval_tx.send(interval).await;
    }

    /// Disable the pre-sealing of empty blocks.
    pub fn disable_preseal(&self) {
        self.core.noempty.store(true, Ordering::SeqCst);
    }

    /// Re-enable the pre-sealing of empty blocks.
    pub fn enable_preseal(&self) {
        self.core.noempty.store(false, Ordering::SeqCst);
    }

    /// The pending block and a deep copy of the pending state.
    pub fn pending(&self) -> Option<(Block, Box<dyn PendingState>)> {
        let snapshot = self.core.snapshot.read().expect("snapshot lock poisoned");
        snapshot.as_ref().map(|s| (s.block.clone(), s.state.deep_copy()))
    }

    /// The pending block.
    pub fn pending_block(&self) -> Option<Block> {
        let snapshot = self.core.snapshot.read().expect("snapshot lock poisoned");
        snapshot.as_ref().map(|s| s.block.clone())
    }

    /// The pending block and its receipts.
    pub fn pending_block_and_receipts(&self) -> Option<(Block, Vec<Receipt>)> {
        let snapshot = self.core.snapshot.read().expect("snapshot lock poisoned");
        snapshot.as_ref().map(|s| (s.block.clone(), copy_receipts(&s.receipts)))
    }

    /// Mark the worker running and trigger new work submitting.
    pub fn start(&self) {
        self.core.running.store(true, Ordering::SeqCst);
        let _ = self.core.start_tx.try_send(());
    }

    /// Mark the worker stopped.
    pub fn stop(&self) {
        self.core.running.store(false, Ordering::SeqCst);
    }

    /// Whether the worker is running.
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Terminate all background tasks. Not re-entrant.
    pub async fn close(&self) {
        self.core.running.store(false, Ordering::SeqCst);
        let _ = self.exit.send(true);
        let handles: Vec<_> =
            std::mem::take(&mut *self.handles.lock().expect("miner lock poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Build a sealing block to order, synchronously.
    ///
    /// The only worker operation that surfaces errors to the caller.
    pub async fn get_sealing_block(
        &self,
        parent: B256,
        timestamp: u64,
        coinbase: Address,
        random: B256,
    ) -> Result<Block, MinerError> {
        let (result, result_rx) = oneshot::channel();
        let req = GetWorkReq {
            params: GenerateParams {
                timestamp,
                force_time: true,
                parent_hash: parent,
                coinbase,
                random,
                no_uncle: true,
                no_extra: true,
            },
            result,
        };
        if self.core.get_work_tx.send(req).await.is_err() {
            return Err(MinerError::Closed);
        }
        result_rx.await.map_err(|_| MinerError::Closed)?
    }

    /// Subscribe to locally mined block announcements.
    pub fn subscribe_mined_blocks(&self) -> broadcast::Receiver<NewMinedBlockEvent> {
        self.core.mined_feed.subscribe()
    }

    /// Subscribe to pending-log batches.
    pub fn subscribe_pending_logs(&self) -> broadcast::Receiver<Vec<Log>> {
        self.core.pending_logs_feed.subscribe()
    }

    /// Inject a side-chain event, as the chain's side feed would.
    /// Only used for testing.
    pub async fn post_side_block(&self, event: ChainSideEvent) {
        let _ = self.core.side_inject_tx.send(event).await;
    }
}

impl WorkerCore {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clean pending tasks whose block fell behind the head by more
    /// than the stale threshold.
    fn clear_pending(&self, number: u64) {
        let mut tasks = self.pending_tasks.lock().expect("pending lock poisoned");
        tasks.retain(|_, task| task.block.number() + STALE_THRESHOLD > number);
    }

    /// Evict uncle candidates that fell behind the head.
    fn clean_stale_uncles(&self) {
        let head = self.chain.current_block().number();
        self.local_uncles
            .lock()
            .expect("uncle lock poisoned")
            .retain(|_, block| block.number() + STALE_THRESHOLD > head);
        self.remote_uncles
            .lock()
            .expect("uncle lock poisoned")
            .retain(|_, block| block.number() + STALE_THRESHOLD > head);
    }

    /// Atomically publish the pending snapshot from the environment.
    fn update_snapshot(&self, env: &Environment) {
        let block =
            Block::new(env.header.clone(), env.txs.clone(), env.uncle_list(), &env.receipts);
        let mut snapshot = self.snapshot.write().expect("snapshot lock poisoned");
        *snapshot = Some(Snapshot {
            block,
            receipts: copy_receipts(&env.receipts),
            state: env.state.deep_copy(),
        });
    }

    /// Whether the parent of `header` reached terminal total
    /// difficulty.
    fn is_ttd_reached(&self, header: &Header) -> bool {
        let td = self
            .chain
            .total_difficulty(header.parent_hash, header.number.saturating_sub(1));
        match (td, self.chain_config.terminal_total_difficulty) {
            (Some(td), Some(ttd)) => td >= ttd,
            _ => false,
        }
    }

    /// Add an uncle to the environment if it passes the acceptance
    /// predicate.
    fn commit_uncle(&self, env: &mut Environment, uncle: &Header) -> Result<(), MinerError> {
        if !self.mode.use_uncles() {
            return Err(MinerError::UnclesDisabled);
        }
        if self.is_ttd_reached(&env.header) {
            return Err(MinerError::TtdReached);
        }
        let hash = uncle.hash();
        if env.uncles.contains_key(&hash) {
            return Err(MinerError::UncleNotUnique(hash));
        }
        if env.header.parent_hash == uncle.parent_hash {
            return Err(MinerError::UncleIsSibling(hash));
        }
        if !env.ancestors.contains(&uncle.parent_hash) {
            return Err(MinerError::UncleParentUnknown(hash));
        }
        if env.family.contains(&hash) {
            return Err(MinerError::UncleAlreadyIncluded(hash));
        }
        env.uncles.insert(hash, uncle.clone());
        Ok(())
    }

    /// Build the execution environment over the parent's state,
    /// seeding the ancestry sets from the seven most recent ancestors.
    fn make_env(
        &self,
        parent: &Block,
        header: Header,
        coinbase: Address,
    ) -> Result<Environment, MinerError> {
        let state = match self.chain.state_at(parent.header.state_root) {
            Ok(state) => state,
            Err(err) => {
                // The parent state may already be pruned when sealing
                // on an arbitrary parent; regenerate within a bounded
                // reorg depth.
                let recovered = self.chain.state_at_block(parent, STATE_RECOVERY_DEPTH);
                warn!(
                    target: "miner",
                    root = %parent.header.state_root,
                    %err,
                    "recovered mining state"
                );
                recovered?
            }
        };
        let mut state = state;
        state.start_prefetcher("miner");

        let mut env = Environment::new(
            Signer::new(self.chain_config.chain_id),
            state,
            coinbase,
            header,
        );
        for ancestor in self.chain.blocks_from_hash(parent.hash(), STALE_THRESHOLD) {
            for uncle in &ancestor.uncles {
                env.family.insert(uncle.hash());
            }
            env.family.insert(ancestor.hash());
            env.ancestors.insert(ancestor.hash());
        }
        Ok(env)
    }

    /// Construct the sealing environment according to the given
    /// parameters; transactions are not filled yet.
    fn prepare_work(&self, params: &GenerateParams) -> Result<Environment, MinerError> {
        let mu = self.mu.read().expect("miner lock poisoned");

        let parent = if params.parent_hash != B256::ZERO {
            self.chain
                .block_by_hash(params.parent_hash)
                .ok_or(MinerError::MissingParent(params.parent_hash))?
        } else {
            self.chain.current_block()
        };
        let build = self.tokens.block_build_parameters(parent.number());
        let (timestamp, till) = self.mode.pick_timestamp(
            self.chain.as_ref(),
            build.block_interval_ms,
            &self.config,
            params.timestamp,
            params.force_time,
            parent.time(),
        )?;

        let number = parent.number() + 1;
        let mut header = Header {
            parent_hash: parent.hash(),
            number,
            gas_limit: calc_gas_limit(parent.gas_limit(), mu.gas_ceil),
            time: timestamp,
            coinbase: params.coinbase,
            ..Default::default()
        };
        if !params.no_extra && !mu.extra.is_empty() {
            header.extra = mu.extra.clone();
        }
        if !self.mode.is_pow() {
            header.gas_limit = calc_gas_limit(parent.gas_limit(), build.block_gas_limit);
        }
        if params.random != B256::ZERO {
            header.mix_digest = params.random;
        }
        if self.chain_config.is_london(number) {
            let parent_is_london = self.chain_config.is_london(parent.number());
            header.base_fee = Some(calc_base_fee(
                &parent.header,
                parent_is_london,
                build.base_fee_max_change_rate,
                build.gas_target_percentage,
            ));
            if !parent_is_london {
                // On the activation block the gas limit adjusts for the
                // doubled elasticity target under PoW; leader mode
                // keeps the parent's limit.
                if self.mode.is_pow() {
                    let parent_gas_limit = parent.gas_limit() * ELASTICITY_MULTIPLIER;
                    header.gas_limit = calc_gas_limit(parent_gas_limit, mu.gas_ceil);
                } else {
                    header.gas_limit = parent.gas_limit();
                }
            }
        }
        if let Err(err) = self.engine.prepare(self.chain.as_ref(), &mut header) {
            error!(target: "miner", %err, "failed to prepare header for sealing");
            return Err(err.into());
        }
        let mut env = match self.make_env(&parent, header, params.coinbase) {
            Ok(env) => env,
            Err(err) => {
                error!(target: "miner", %err, "failed to create sealing context");
                return Err(err);
            }
        };
        if !self.mode.is_pow() {
            env.till = till;
        }
        env.block_interval_ms = build.block_interval_ms;
        env.block_gas_limit = build.block_gas_limit;
        env.base_fee_max_change_rate = build.base_fee_max_change_rate;
        env.gas_target_percentage = build.gas_target_percentage;

        if !params.no_uncle {
            // Prefer locally generated uncles.
            let locals: Vec<Header> = self
                .local_uncles
                .lock()
                .expect("uncle lock poisoned")
                .values()
                .map(|b| b.header.clone())
                .collect();
            let remotes: Vec<Header> = self
                .remote_uncles
                .lock()
                .expect("uncle lock poisoned")
                .values()
                .map(|b| b.header.clone())
                .collect();
            for uncle in locals.iter().chain(remotes.iter()) {
                if env.uncles.len() == 2 {
                    break;
                }
                let hash = uncle.hash();
                match self.commit_uncle(&mut env, uncle) {
                    Ok(()) => debug!(target: "miner", %hash, "committing new uncle to block"),
                    Err(reason) => {
                        trace!(target: "miner", %hash, %reason, "possible uncle rejected")
                    }
                }
            }
        }
        Ok(env)
    }

    /// Apply one transaction inside a state snapshot; the environment
    /// is extended only on success.
    fn commit_transaction(
        &self,
        env: &mut Environment,
        tx: &Transaction,
    ) -> Result<Vec<Log>, ExecutionError> {
        let snap = env.state.snapshot();
        let mut gas_pool = env
            .gas_pool
            .unwrap_or_else(|| GasPool::new(env.header.gas_limit));
        match env
            .state
            .apply_transaction(&env.header, env.coinbase, tx, &mut gas_pool)
        {
            Ok(receipt) => {
                env.gas_pool = Some(gas_pool);
                env.header.gas_used += receipt.gas_used;
                let logs = receipt.logs.clone();
                env.txs.push(tx.clone());
                env.receipts.push(receipt);
                Ok(logs)
            }
            Err(err) => {
                env.state.revert_to_snapshot(snap);
                Err(err)
            }
        }
    }

    /// Drive the price+nonce committer loop.
    ///
    /// Returns `true` iff the build was aborted because a new head
    /// arrived; the caller must then discard the environment.
    async fn commit_transactions(
        &self,
        env: &mut Environment,
        txs: &mut TransactionsByPriceAndNonce,
        interrupt: Option<&Arc<AtomicI32>>,
        respect_deadline: bool,
        mut committed: Option<&mut HashSet<B256>>,
    ) -> bool {
        let gas_limit = env.header.gas_limit;
        if env.gas_pool.is_none() {
            env.gas_pool = Some(GasPool::new(gas_limit));
        }
        let mut coalesced_logs: Vec<Log> = Vec::new();

        loop {
            // A NewHead interrupt discards the semi-finished work; a
            // Resubmit interrupt submits it and asks for a slower
            // resubmit cadence.
            if let Some(interrupt) = interrupt {
                let signal = interrupt.load(Ordering::SeqCst);
                if signal != COMMIT_INTERRUPT_NONE {
                    if signal == COMMIT_INTERRUPT_RESUBMIT {
                        let gas_left = env.gas_pool.map(|g| g.gas()).unwrap_or_default();
                        let ratio =
                            ((gas_limit - gas_left) as f64 / gas_limit as f64).max(0.1);
                        let _ = self
                            .resubmit_adjust_tx
                            .send(IntervalAdjust { ratio, inc: true })
                            .await;
                    }
                    return signal == COMMIT_INTERRUPT_NEW_HEAD;
                }
            }
            let gas_left = env.gas_pool.map(|g| g.gas()).unwrap_or_default();
            if gas_left < TX_GAS {
                trace!(target: "miner", have = gas_left, want = TX_GAS, "not enough gas for further transactions");
                break;
            }
            let Some(tx) = txs.peek().cloned() else { break };
            if self.config.max_txs_per_block > 0 && env.tcount >= self.config.max_txs_per_block {
                break;
            }
            if respect_deadline {
                if let (Some(till), Some(done)) = (env.till, committed.as_deref()) {
                    if pacing::unix_ms() >= till && done.len() >= self.config.block_min_build_txs {
                        break;
                    }
                }
            }
            if let Some(done) = committed.as_deref_mut() {
                done.insert(tx.hash());
            }
            let from = env.signer.sender(&tx);
            // Replay-protected transactions cannot execute before the
            // EIP-155 fork; skip the sender until then.
            if tx.protected() && !self.chain_config.is_eip155(env.header.number) {
                trace!(target: "miner", hash = %tx.hash(), "ignoring replay protected transaction");
                txs.pop();
                continue;
            }
            env.state.prepare(tx.hash(), env.tcount);

            match self.commit_transaction(env, &tx) {
                Ok(logs) => {
                    coalesced_logs.extend(logs);
                    env.tcount += 1;
                    txs.shift();
                }
                Err(ExecutionError::GasLimitReached) => {
                    trace!(target: "miner", sender = %from, "gas limit exceeded for current block");
                    txs.pop();
                }
                Err(ExecutionError::NonceTooLow { .. }) => {
                    trace!(target: "miner", sender = %from, nonce = tx.nonce, "skipping transaction with low nonce");
                    txs.shift();
                }
                Err(ExecutionError::NonceTooHigh { .. }) => {
                    trace!(target: "miner", sender = %from, nonce = tx.nonce, "skipping account with high nonce");
                    txs.pop();
                }
                Err(ExecutionError::TxTypeNotSupported) => {
                    trace!(target: "miner", sender = %from, "skipping unsupported transaction type");
                    txs.pop();
                }
                Err(err) => {
                    debug!(target: "miner", hash = %tx.hash(), %err, "transaction failed, account skipped");
                    txs.shift();
                }
            }
        }

        if !self.is_running() && !coalesced_logs.is_empty() {
            // The receipts still reference these logs; publish copies
            // so the pending-log consumers never share objects that
            // get block-stamped later.
            let _ = self.pending_logs_feed.send(coalesced_logs.clone());
        }
        if interrupt.is_some() {
            let _ = self
                .resubmit_adjust_tx
                .send(IntervalAdjust { ratio: 0.0, inc: false })
                .await;
        }
        false
    }

    /// Drive the round-robin committer loop; same contract as
    /// [`Self::commit_transactions`].
    async fn commit_transactions_simple(
        &self,
        env: &mut Environment,
        txs: &mut TxOrderer,
        interrupt: Option<&Arc<AtomicI32>>,
        respect_deadline: bool,
    ) -> bool {
        let gas_limit = env.header.gas_limit;
        if env.gas_pool.is_none() {
            env.gas_pool = Some(GasPool::new(gas_limit));
        }
        let mut coalesced_logs: Vec<Log> = Vec::new();

        loop {
            if let Some(interrupt) = interrupt {
                let signal = interrupt.load(Ordering::SeqCst);
                if signal != COMMIT_INTERRUPT_NONE {
                    if signal == COMMIT_INTERRUPT_RESUBMIT {
                        let gas_left = env.gas_pool.map(|g| g.gas()).unwrap_or_default();
                        let ratio =
                            ((gas_limit - gas_left) as f64 / gas_limit as f64).max(0.1);
                        let _ = self
                            .resubmit_adjust_tx
                            .send(IntervalAdjust { ratio, inc: true })
                            .await;
                    }
                    return signal == COMMIT_INTERRUPT_NEW_HEAD;
                }
            }
            let gas_left = env.gas_pool.map(|g| g.gas()).unwrap_or_default();
            if gas_left < TX_GAS {
                trace!(target: "miner", have = gas_left, want = TX_GAS, "not enough gas for further transactions");
                break;
            }
            let Some(tx) = txs.peek().cloned() else { break };
            if respect_deadline {
                if let Some(till) = env.till {
                    if pacing::unix_ms() >= till
                        && txs.committed_len() >= self.config.block_min_build_txs
                    {
                        break;
                    }
                }
            }
            txs.mark_committed(&tx);

            let from = env.signer.sender(&tx);
            if tx.protected() && !self.chain_config.is_eip155(env.header.number) {
                trace!(target: "miner", hash = %tx.hash(), "ignoring replay protected transaction");
                txs.pop();
                continue;
            }
            env.state.prepare(tx.hash(), env.tcount);

            match self.commit_transaction(env, &tx) {
                Ok(logs) => {
                    coalesced_logs.extend(logs);
                    env.tcount += 1;
                    txs.shift();
                }
                Err(ExecutionError::GasLimitReached) => {
                    trace!(target: "miner", sender = %from, "gas limit exceeded for current block");
                    txs.pop();
                }
                Err(ExecutionError::NonceTooLow { .. }) => {
                    trace!(target: "miner", sender = %from, nonce = tx.nonce, "skipping transaction with low nonce");
                    txs.shift();
                }
                Err(ExecutionError::NonceTooHigh { .. }) => {
                    trace!(target: "miner", sender = %from, nonce = tx.nonce, "skipping account with high nonce");
                    txs.pop();
                }
                Err(ExecutionError::TxTypeNotSupported) => {
                    trace!(target: "miner", sender = %from, "skipping unsupported transaction type");
                    txs.pop();
                }
                Err(err) => {
                    debug!(target: "miner", hash = %tx.hash(), %err, "transaction failed, account skipped");
                    txs.shift();
                }
            }
        }

        if !self.is_running() && !coalesced_logs.is_empty() {
            let _ = self.pending_logs_feed.send(coalesced_logs.clone());
        }
        if interrupt.is_some() {
            let _ = self
                .resubmit_adjust_tx
                .send(IntervalAdjust { ratio: 0.0, inc: false })
                .await;
        }
        false
    }

    /// Deadline-driven outer commit loop for leader mode: poll the
    /// pool every 10 ms until the build deadline passes, feeding each
    /// round's fresh transactions to the committer.
    async fn commit_transactions_ex(
        &self,
        env: &mut Environment,
        interrupt: Option<&Arc<AtomicI32>>,
        start: Instant,
    ) -> bool {
        let poll = Duration::from_millis(10);
        let mut committed: HashSet<B256> = HashSet::new();
        let mut round = 0u32;

        let past_deadline = |env: &Environment| match env.till {
            Some(till) => pacing::unix_ms() >= till,
            None => true,
        };

        loop {
            round += 1;
            let mut pending = self.pool.pending(true);
            if pending.is_empty() {
                if past_deadline(env) {
                    break;
                }
                tokio::time::sleep(poll).await;
                continue;
            }

            if self.config.prefetch_count == 0 {
                if !committed.is_empty() {
                    for txs in pending.values_mut() {
                        txs.retain(|tx| !committed.contains(&tx.hash()));
                    }
                    pending.retain(|_, txs| !txs.is_empty());
                }
                let mut set =
                    TransactionsByPriceAndNonce::new(env.signer, pending, env.header.base_fee);
                if self
                    .commit_transactions(env, &mut set, interrupt, true, Some(&mut committed))
                    .await
                {
                    return true;
                }
            } else {
                let mut orderer = TxOrderer::new(
                    pending,
                    std::mem::take(&mut committed),
                    self.config.prefetch_count,
                );
                let aborted = self
                    .commit_transactions_simple(env, &mut orderer, interrupt, true)
                    .await;
                committed = orderer.into_committed();
                if aborted {
                    return true;
                }
            }

            if past_deadline(env) {
                break;
            }
            tokio::time::sleep(poll).await;
        }
        debug!(
            target: "miner",
            number = env.header.number,
            elapsed = ?start.elapsed(),
            txs = committed.len(),
            round,
            "block build finished"
        );
        false
    }

    /// Fill the environment from the pool, locals first.
    async fn fill_transactions(&self, interrupt: Option<&Arc<AtomicI32>>, env: &mut Environment) {
        let mut pending = self.pool.pending(true);
        let mut local_txs = HashMap::new();
        for account in self.pool.locals() {
            if let Some(txs) = pending.remove(&account) {
                if !txs.is_empty() {
                    local_txs.insert(account, txs);
                }
            }
        }
        if !local_txs.is_empty() {
            let mut set =
                TransactionsByPriceAndNonce::new(env.signer, local_txs, env.header.base_fee);
            if self
                .commit_transactions(env, &mut set, interrupt, false, None)
                .await
            {
                return;
            }
        }
        if !pending.is_empty() {
            let mut set =
                TransactionsByPriceAndNonce::new(env.signer, pending, env.header.base_fee);
            if self
                .commit_transactions(env, &mut set, interrupt, false, None)
                .await
            {
                return;
            }
        }
    }

    /// Reinitialize the pending snapshot from the current head without
    /// filling transactions.
    fn refresh_pending(&self, already_busy: bool) {
        if !already_busy {
            if self
                .busy_mining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
        }
        self.refresh_pending_locked();
        if !already_busy {
            self.busy_mining.store(false, Ordering::SeqCst);
        }
    }

    fn refresh_pending_locked(&self) {
        let mu = self.mu.read().expect("miner lock poisoned");
        let parent = self.chain.current_block();
        let build = self.tokens.block_build_parameters(parent.number());
        let number = parent.number() + 1;

        let mut header = Header {
            parent_hash: parent.hash(),
            number,
            gas_limit: calc_gas_limit(parent.gas_limit(), mu.gas_ceil),
            extra: mu.extra.clone(),
            time: pacing::unix_secs() as u64,
            coinbase: mu.coinbase,
            ..Default::default()
        };
        if !self.mode.is_pow() {
            header.gas_limit = calc_gas_limit(parent.gas_limit(), build.block_gas_limit);
        }
        if self.chain_config.is_london(number) {
            let parent_is_london = self.chain_config.is_london(parent.number());
            header.base_fee = Some(calc_base_fee(
                &parent.header,
                parent_is_london,
                build.base_fee_max_change_rate,
                build.gas_target_percentage,
            ));
            if !parent_is_london {
                header.gas_limit = parent.gas_limit();
            }
        }
        let coinbase = header.coinbase;
        if let Err(err) = self.engine.prepare(self.chain.as_ref(), &mut header) {
            error!(target: "miner", %err, "failed to prepare header for pending refresh");
            return;
        }
        drop(mu);
        if let Ok(mut env) = self.make_env(&parent, header, coinbase) {
            env.block_interval_ms = build.block_interval_ms;
            env.block_gas_limit = build.block_gas_limit;
            env.base_fee_max_change_rate = build.base_fee_max_change_rate;
            env.gas_target_percentage = build.gas_target_percentage;
            self.update_snapshot(&env);
            env.discard();
        }
    }

    /// Generate a sealing block to order (the synchronous get-work
    /// path).
    async fn generate_work(&self, params: &GenerateParams) -> Result<Block, MinerError> {
        let mut work = self.prepare_work(params)?;
        self.fill_transactions(None, &mut work).await;
        let uncle_list = work.uncle_list();
        let result = self
            .engine
            .finalize_and_assemble(
                self.chain.as_ref(),
                work.header.clone(),
                work.state.as_mut(),
                work.txs.clone(),
                uncle_list,
                &work.receipts,
            )
            .map_err(MinerError::from);
        work.discard();
        result
    }

    /// One block-build attempt, guarded by the single-flight flag.
    async fn commit_work(
        &self,
        current: &mut Option<Environment>,
        interrupt: Option<Arc<AtomicI32>>,
        noempty: bool,
        _timestamp: i64,
    ) {
        if self
            .busy_mining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let _busy = BusyGuard(&self.busy_mining);

        if !self.mode.is_pow() {
            let parent = self.chain.current_block();
            let height = parent.number() + 1;
            match self
                .mode
                .acquire_leadership(self.tokens.as_ref(), height, parent.hash())
            {
                Ok(true) => {
                    debug!(target: "miner", height, parent = %parent.hash(), "mining token acquired");
                }
                Ok(false) => {
                    debug!(target: "miner", height, parent = %parent.hash(), "mining token unavailable");
                    self.refresh_pending(true);
                    return;
                }
                Err(err) => {
                    debug!(target: "miner", height, %err, "mining token acquisition failed");
                    self.refresh_pending(true);
                    return;
                }
            }
        }

        let start = Instant::now();
        let timestamp = pacing::unix_secs();

        let coinbase = if self.is_running() {
            let coinbase = self.mu.read().expect("miner lock poisoned").coinbase;
            if coinbase == Address::ZERO {
                error!(target: "miner", "refusing to mine without etherbase");
                return;
            }
            coinbase
        } else {
            Address::ZERO
        };
        let params = GenerateParams {
            timestamp: timestamp as u64,
            coinbase,
            ..Default::default()
        };
        let Ok(mut work) = self.prepare_work(&params) else { return };

        if !self.mode.is_pow() {
            if !self
                .commit_transactions_ex(&mut work, interrupt.as_ref(), start)
                .await
            {
                if let Err(err) = self.commit_ex(&work, true, start).await {
                    debug!(target: "miner", %err, "synchronous commit failed");
                }
            }
            work.discard();
            return;
        }

        // Pre-seal an empty block so the sealer starts while the
        // transactions still fill.
        if !noempty && !self.noempty.load(Ordering::SeqCst) {
            if let Err(err) = self.commit(&work, false, false, start).await {
                debug!(target: "miner", %err, "empty commit failed");
            }
        }
        self.fill_transactions(interrupt.as_ref(), &mut work).await;
        if let Err(err) = self.commit(&work, true, true, start).await {
            debug!(target: "miner", %err, "commit failed");
        }

        // Swap out the old environment, terminating its prefetcher.
        if let Some(old) = current.take() {
            old.discard();
        }
        *current = Some(work);
    }

    /// Assemble the environment into a sealing task for the task loop.
    ///
    /// The environment is deep-copied before finalize/assemble so the
    /// engine never mutates state still referenced by the pending
    /// snapshot.
    async fn commit(
        &self,
        env: &Environment,
        fire_full_task_hook: bool,
        update: bool,
        start: Instant,
    ) -> Result<(), MinerError> {
        if !self.mode.is_pow() && !self.tokens.has_mining_token() {
            return Err(MinerError::NotLeader);
        }
        if self.is_running() {
            if fire_full_task_hook {
                if let Some(hook) = &self.hooks.full_task {
                    hook();
                }
            }
            let mut inner = env.deep_copy();
            let uncle_list = inner.uncle_list();
            let block = self.engine.finalize_and_assemble(
                self.chain.as_ref(),
                inner.header.clone(),
                inner.state.as_mut(),
                inner.txs.clone(),
                uncle_list,
                &inner.receipts,
            )?;
            if !self.is_ttd_reached(&block.header) {
                let number = block.number();
                let seal_hash = self.engine.seal_hash(&block.header);
                let gas = block.gas_used();
                let fees = total_fees(&block, &inner.receipts);
                let uncles = inner.uncles.len();
                let tcount = inner.tcount;
                let task = inner.into_task(block);
                if self.task_tx.send(task).await.is_ok() {
                    self.unconfirmed.shift(number.saturating_sub(1));
                    info!(
                        target: "miner",
                        number,
                        %seal_hash,
                        uncles,
                        txs = tcount,
                        gas,
                        fees,
                        elapsed = ?start.elapsed(),
                        "commit new sealing work"
                    );
                } else {
                    info!(target: "miner", "worker has exited");
                }
            } else {
                inner.discard();
            }
        }
        if update {
            self.update_snapshot(env);
        }
        Ok(())
    }

    /// Finalize, seal synchronously and write the block to the chain.
    ///
    /// Uncles are unwelcome and difficulty negligible in leader mode,
    /// so there is no reason to run the sealer asynchronously.
    async fn commit_ex(
        &self,
        env: &Environment,
        update: bool,
        start: Instant,
    ) -> Result<(), MinerError> {
        if !self.mode.is_pow() && !self.tokens.has_mining_token() {
            return Err(MinerError::NotLeader);
        }
        if self.is_running() {
            let mut inner = env.deep_copy();
            let sealed = self.seal_and_write(&mut inner, start).await;
            inner.discard();
            sealed?;
        }
        if update {
            self.update_snapshot(env);
        }
        Ok(())
    }

    async fn seal_and_write(
        &self,
        inner: &mut Environment,
        start: Instant,
    ) -> Result<(), MinerError> {
        let uncle_list = inner.uncle_list();
        let block = self.engine.finalize_and_assemble(
            self.chain.as_ref(),
            inner.header.clone(),
            inner.state.as_mut(),
            inner.txs.clone(),
            uncle_list,
            &inner.receipts,
        )?;
        if self.is_ttd_reached(&block.header) {
            return Ok(());
        }
        let created_at = Instant::now();
        self.unconfirmed.shift(block.number().saturating_sub(1));
        info!(
            target: "miner",
            number = block.number(),
            seal_hash = %self.engine.seal_hash(&block.header),
            uncles = inner.uncles.len(),
            txs = inner.tcount,
            gas = block.gas_used(),
            fees = total_fees(&block, &inner.receipts),
            elapsed = ?start.elapsed(),
            "commit new sealing work"
        );

        let (result_tx, mut result_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();
        let sealed = match self
            .engine
            .seal(self.chain.clone(), block.clone(), result_tx, stop_rx)
        {
            Ok(()) => result_rx.recv().await,
            Err(err) => {
                warn!(target: "miner", %err, "block sealing failed");
                None
            }
        };
        drop(stop_tx);

        let Some(sealed) = sealed else { return Ok(()) };
        if self.chain.has_block(sealed.hash(), sealed.number()) {
            return Ok(());
        }
        let seal_hash = self.engine.seal_hash(&sealed.header);
        let hash = sealed.hash();
        let (receipts, logs) = stamp_block_location(&inner.receipts, hash, sealed.number());

        if !self.mode.is_pow() {
            self.mode.release_leadership(
                self.tokens.as_ref(),
                sealed.number(),
                hash,
                sealed.parent_hash(),
            )?;
        }
        let state = inner.state.deep_copy();
        if let Err(err) = self
            .chain
            .write_block_and_set_head(&sealed, &receipts, &logs, state, true)
        {
            error!(target: "miner", %err, "failed writing block to chain");
            return Err(err.into());
        }
        info!(
            target: "miner",
            number = sealed.number(),
            %seal_hash,
            %hash,
            elapsed = ?created_at.elapsed(),
            "successfully sealed new block"
        );
        let _ = self
            .mined_feed
            .send(NewMinedBlockEvent { block: Arc::new(sealed.clone()) });
        self.unconfirmed.insert(sealed.number(), hash);
        Ok(())
    }

    /// Side block arrival: remember it as an uncle candidate and, if a
    /// block is being sealed with room for uncles, graft it in and
    /// re-commit.
    async fn handle_side_block(&self, current: &mut Option<Environment>, ev: ChainSideEvent) {
        let hash = ev.block.hash();
        {
            let mut locals = self.local_uncles.lock().expect("uncle lock poisoned");
            let mut remotes = self.remote_uncles.lock().expect("uncle lock poisoned");
            if locals.contains_key(&hash) || remotes.contains_key(&hash) {
                return;
            }
            let is_local = self
                .is_local_block
                .as_ref()
                .is_some_and(|f| f(&ev.block.header));
            if is_local {
                locals.insert(hash, ev.block.clone());
            } else {
                remotes.insert(hash, ev.block.clone());
            }
        }
        if self.is_running() {
            if let Some(env) = current.as_mut() {
                if env.uncles.len() < 2 {
                    let start = Instant::now();
                    if self.commit_uncle(env, &ev.block.header).is_ok() {
                        let copy = env.deep_copy();
                        if let Err(err) = self.commit_ex(&copy, true, start).await {
                            debug!(target: "miner", %err, "uncle recommit failed");
                        }
                        copy.discard();
                    }
                }
            }
        }
    }

    /// New pool transactions: while not sealing, stream them straight
    /// into the pending block; under zero-period Clique, trigger a
    /// fresh build instead.
    async fn handle_new_txs(
        &self,
        current: &mut Option<Environment>,
        txs: Vec<Transaction>,
    ) {
        let count = txs.len() as i32;
        if !self.is_running() && current.is_some() {
            let Some(env) = current.as_mut() else { return };
            // The pending block may already be full.
            if let Some(gas_pool) = env.gas_pool {
                if gas_pool.gas() < TX_GAS {
                    return;
                }
            }
            let mut grouped: HashMap<Address, Vec<Transaction>> = HashMap::new();
            for tx in txs {
                grouped.entry(env.signer.sender(&tx)).or_default().push(tx);
            }
            for queue in grouped.values_mut() {
                queue.sort_by_key(|tx| tx.nonce);
            }
            let mut set =
                TransactionsByPriceAndNonce::new(env.signer, grouped, env.header.base_fee);
            let tcount = env.tcount;
            self.commit_transactions(env, &mut set, None, false, None).await;
            if tcount != env.tcount {
                self.update_snapshot(env);
            }
        } else if self
            .chain_config
            .clique
            .is_some_and(|clique| clique.period == 0)
        {
            // Zero-period Clique rejects empty submissions, so seal on
            // demand when transactions arrive.
            self.commit_work(current, None, false, pacing::unix_secs()).await;
        }
        self.new_txs.fetch_add(count, Ordering::SeqCst);
    }

    /// Swap the previous interrupt to `signal`, enqueue a fresh work
    /// request and reset the transaction counter. Returns `false` when
    /// the worker is shutting down.
    async fn dispatch_work(
        &self,
        interrupt_slot: &mut Option<Arc<AtomicI32>>,
        noempty: bool,
        signal: i32,
        timestamp: i64,
    ) -> bool {
        if let Some(previous) = interrupt_slot.as_ref() {
            previous.store(signal, Ordering::SeqCst);
        }
        let fresh = Arc::new(AtomicI32::new(COMMIT_INTERRUPT_NONE));
        *interrupt_slot = Some(fresh.clone());
        let req = NewWorkReq { interrupt: Some(fresh), noempty, timestamp };
        if self.new_work_tx.send(req).await.is_err() {
            return false;
        }
        self.new_txs.store(0, Ordering::SeqCst);
        true
    }

    /// Single-flight new-work kick for the leader dispatcher.
    async fn commit_simple(&self) {
        if self
            .busy_mining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let req = NewWorkReq {
                interrupt: None,
                noempty: false,
                timestamp: pacing::unix_secs(),
            };
            let _ = self.new_work_tx.send(req).await;
            self.new_txs.store(0, Ordering::SeqCst);
            // Released before the request is dequeued; a second tick
            // may enqueue another request, which the main loop
            // coalesces by replacing the current environment.
            self.busy_mining.store(false, Ordering::SeqCst);
        }
    }
}

/// Total producer fees of a block in ether.
fn total_fees(block: &Block, receipts: &[Receipt]) -> f64 {
    let mut wei: u128 = 0;
    for (tx, receipt) in block.transactions.iter().zip(receipts) {
        if let Some(tip) = tx.effective_gas_tip(block.base_fee()) {
            wei += tip * receipt.gas_used as u128;
        }
    }
    wei as f64 / 1e18
}

/// Generate and submit sealing work from received events; also serves
/// the synchronous get-work path and streams pool transactions into
/// the pending block while idle.
async fn main_loop(
    core: Arc<WorkerCore>,
    mut new_work_rx: mpsc::Receiver<NewWorkReq>,
    mut get_work_rx: mpsc::Receiver<GetWorkReq>,
    mut txs_rx: broadcast::Receiver<crate::chain::NewTxsEvent>,
    mut side_rx: broadcast::Receiver<ChainSideEvent>,
    mut side_inject_rx: mpsc::Receiver<ChainSideEvent>,
    mut exit_rx: watch::Receiver<bool>,
) {
    let mut current: Option<Environment> = None;
    let mut clean_ticker = tokio::time::interval(Duration::from_secs(10));
    clean_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            req = new_work_rx.recv() => {
                let Some(req) = req else { break };
                // Costly interrupt/resubmit handling is disabled in
                // leader mode.
                let interrupt = if core.mode.is_pow() { req.interrupt } else { None };
                core.commit_work(&mut current, interrupt, req.noempty, req.timestamp).await;
            }
            req = get_work_rx.recv() => {
                let Some(req) = req else { break };
                let result = core.generate_work(&req.params).await;
                let _ = req.result.send(result);
            }
            event = side_rx.recv() => {
                match event {
                    Ok(ev) => core.handle_side_block(&mut current, ev).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "miner", skipped, "side-chain subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(ev) = side_inject_rx.recv() => {
                core.handle_side_block(&mut current, ev).await;
            }
            event = txs_rx.recv() => {
                match event {
                    Ok(ev) => core.handle_new_txs(&mut current, ev.txs).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "miner", skipped, "transaction subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = clean_ticker.tick() => {
                core.clean_stale_uncles();
            }
            _ = exit_rx.changed() => break,
        }
    }
    if let Some(env) = current.take() {
        env.discard();
    }
    debug!(target: "miner", "main loop stopped");
}

/// Submit new PoW sealing work upon start/head events, resubmitting on
/// an adaptive timer while new transactions keep arriving.
async fn work_loop_pow(
    core: Arc<WorkerCore>,
    mut start_rx: mpsc::Receiver<()>,
    mut head_rx: broadcast::Receiver<crate::chain::ChainHeadEvent>,
    mut interval_rx: mpsc::Receiver<Duration>,
    mut adjust_rx: mpsc::Receiver<IntervalAdjust>,
    mut exit_rx: watch::Receiver<bool>,
) {
    let mut controller = ResubmitController::new(core.config.recommit);
    let mut interrupt: Option<Arc<AtomicI32>> = None;
    let mut timestamp: i64 = 0;

    // One-shot resubmit timer, armed after each dispatch.
    let far_future = Duration::from_secs(86_400 * 365);
    let timer = tokio::time::sleep(far_future);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            started = start_rx.recv() => {
                if started.is_none() { break }
                core.clear_pending(core.chain.current_block().number());
                timestamp = pacing::unix_secs();
                if !core.dispatch_work(&mut interrupt, false, COMMIT_INTERRUPT_NEW_HEAD, timestamp).await {
                    break;
                }
                timer.as_mut().reset(tokio::time::Instant::now() + controller.recommit());
            }
            event = head_rx.recv() => {
                match event {
                    Ok(head) => {
                        core.clear_pending(head.block.number());
                        timestamp = pacing::unix_secs();
                        if !core.dispatch_work(&mut interrupt, false, COMMIT_INTERRUPT_NEW_HEAD, timestamp).await {
                            break;
                        }
                        timer.as_mut().reset(tokio::time::Instant::now() + controller.recommit());
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "miner", skipped, "chain-head subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut timer => {
                // Periodically pull in higher-priced transactions,
                // unless the engine seals instantly (zero-period
                // Clique) or nothing new arrived.
                let clique_active = core.chain_config.clique.is_some_and(|c| c.period == 0);
                if core.is_running() && !clique_active {
                    if core.new_txs.load(Ordering::SeqCst) == 0 {
                        timer.as_mut().reset(tokio::time::Instant::now() + controller.recommit());
                        continue;
                    }
                    if !core.dispatch_work(&mut interrupt, true, COMMIT_INTERRUPT_RESUBMIT, timestamp).await {
                        break;
                    }
                }
                timer.as_mut().reset(tokio::time::Instant::now() + controller.recommit());
            }
            interval = interval_rx.recv() => {
                let Some(interval) = interval else { break };
                let before = controller.min_recommit();
                let applied = controller.update_interval(interval);
                if applied != interval {
                    warn!(target: "miner", provided = ?interval, updated = ?applied, "sanitizing miner recommit interval");
                }
                info!(target: "miner", from = ?before, to = ?applied, "miner recommit interval update");
                if let Some(hook) = &core.hooks.resubmit {
                    hook(controller.min_recommit(), controller.recommit());
                }
            }
            adjust = adjust_rx.recv() => {
                let Some(adjust) = adjust else { break };
                let before = controller.recommit();
                controller.adjust(adjust);
                trace!(
                    target: "miner",
                    from = ?before,
                    to = ?controller.recommit(),
                    inc = adjust.inc,
                    "adjusted miner recommit interval"
                );
                if let Some(hook) = &core.hooks.resubmit {
                    hook(controller.min_recommit(), controller.recommit());
                }
            }
            _ = exit_rx.changed() => break,
        }
    }
    debug!(target: "miner", "work loop stopped");
}

/// Submit new leader-mode work on a short timer, guarded by the
/// single-flight flag. The resubmit channels are drained without
/// acting so senders never block in this mode.
async fn work_loop_leader(
    core: Arc<WorkerCore>,
    mut start_rx: mpsc::Receiver<()>,
    mut head_rx: broadcast::Receiver<crate::chain::ChainHeadEvent>,
    mut interval_rx: mpsc::Receiver<Duration>,
    mut adjust_rx: mpsc::Receiver<IntervalAdjust>,
    mut exit_rx: watch::Receiver<bool>,
) {
    let timer = tokio::time::sleep(Duration::from_millis(10));
    tokio::pin!(timer);

    loop {
        tokio::select! {
            started = start_rx.recv() => {
                if started.is_none() { break }
                core.refresh_pending(false);
                core.clear_pending(core.chain.current_block().number());
                core.commit_simple().await;
            }
            event = head_rx.recv() => {
                match event {
                    Ok(head) => {
                        core.clear_pending(head.block.number());
                        core.commit_simple().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "miner", skipped, "chain-head subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut timer => {
                core.commit_simple().await;
                timer.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(1));
            }
            _ = interval_rx.recv() => {}
            _ = adjust_rx.recv() => {}
            _ = exit_rx.changed() => break,
        }
    }
    debug!(target: "miner", "work loop stopped");
}

/// Serialize sealing: dedup resubmitted tasks by seal hash, abort the
/// previous in-flight seal and hand the task to the engine.
async fn task_loop(
    core: Arc<WorkerCore>,
    mut task_rx: mpsc::Receiver<Task>,
    mut exit_rx: watch::Receiver<bool>,
) {
    let mut stop_tx: Option<oneshot::Sender<()>> = None;
    let mut prev: Option<B256> = None;

    loop {
        tokio::select! {
            task = task_rx.recv() => {
                let Some(task) = task else { break };
                if let Some(hook) = &core.hooks.new_task {
                    hook(&task.block);
                }
                // Reject duplicate sealing work caused by resubmits.
                let seal_hash = core.engine.seal_hash(&task.block.header);
                if prev == Some(seal_hash) {
                    continue;
                }
                // Dropping the previous stop handle aborts the
                // in-flight seal.
                let (stop, stop_rx) = oneshot::channel();
                stop_tx = Some(stop);
                prev = Some(seal_hash);

                if let Some(skip) = &core.hooks.skip_seal {
                    if skip(&task.block) {
                        continue;
                    }
                }
                let block = task.block.clone();
                core.pending_tasks
                    .lock()
                    .expect("pending lock poisoned")
                    .insert(seal_hash, task);
                if let Err(err) = core.engine.seal(core.chain.clone(), block, core.result_tx.clone(), stop_rx) {
                    warn!(target: "miner", %err, "block sealing failed");
                    core.pending_tasks
                        .lock()
                        .expect("pending lock poisoned")
                        .remove(&seal_hash);
                }
            }
            _ = exit_rx.changed() => {
                stop_tx = None;
                break;
            }
        }
    }
    drop(stop_tx);
    debug!(target: "miner", "task loop stopped");
}

/// Handle sealed blocks: re-stamp receipts with the final block hash,
/// write the block to the chain and announce it.
async fn result_loop(
    core: Arc<WorkerCore>,
    mut result_rx: mpsc::Receiver<Block>,
    mut exit_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            block = result_rx.recv() => {
                let Some(block) = block else { break };
                // Duplicate results caused by resubmitting.
                if core.chain.has_block(block.hash(), block.number()) {
                    continue;
                }
                let seal_hash = core.engine.seal_hash(&block.header);
                let hash = block.hash();
                // Different blocks can share a seal hash: work on deep
                // copies to prevent write-write conflicts on receipts
                // and logs.
                let task_data = {
                    let tasks = core.pending_tasks.lock().expect("pending lock poisoned");
                    tasks.get(&seal_hash).map(|task| {
                        let (receipts, logs) =
                            stamp_block_location(&task.receipts, hash, block.number());
                        (receipts, logs, task.state.deep_copy(), task.created_at)
                    })
                };
                let Some((receipts, logs, state, created_at)) = task_data else {
                    error!(target: "miner", number = block.number(), %seal_hash, %hash, "block found but no relative pending task");
                    continue;
                };
                if let Err(err) = core.chain.write_block_and_set_head(&block, &receipts, &logs, state, true) {
                    error!(target: "miner", %err, "failed writing block to chain");
                    continue;
                }
                info!(
                    target: "miner",
                    number = block.number(),
                    %seal_hash,
                    %hash,
                    elapsed = ?created_at.elapsed(),
                    "successfully sealed new block"
                );
                let number = block.number();
                let _ = core.mined_feed.send(NewMinedBlockEvent { block: Arc::new(block) });
                core.unconfirmed.insert(number, hash);
            }
            _ = exit_rx.changed() => break,
        }
    }
    debug!(target: "miner", "result loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainConfig, InMemoryChain};
    use crate::engine::DevEngine;
    use crate::miner::token::{BlockBuildParameters, LocalTokenService};
    use crate::state::InMemoryState;
    use crate::txpool::InMemoryPool;
    use alloy_primitives::U256;
    use tokio::time::timeout;

    const CHAIN_ID: u64 = 1112;

    fn coinbase() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn sender(i: u8) -> Address {
        Address::repeat_byte(i)
    }

    fn one_ether() -> U256 {
        U256::from(10).pow(U256::from(18))
    }

    fn funded_state() -> InMemoryState {
        InMemoryState::new()
            .with_account(sender(1), 0, one_ether())
            .with_account(sender(2), 0, one_ether())
            .with_account(sender(3), 0, one_ether())
    }

    fn transfer(from: Address, nonce: u64, tip_gwei: u128) -> Transaction {
        Transaction {
            from,
            to: sender(0xee),
            nonce,
            gas_limit: TX_GAS,
            max_fee_per_gas: 5_000_000_000,
            max_priority_fee_per_gas: tip_gwei * 1_000_000_000,
            value: U256::from(1_000),
            chain_id: CHAIN_ID,
            ..Default::default()
        }
    }

    struct Harness {
        chain: Arc<InMemoryChain>,
        pool: Arc<InMemoryPool>,
        tokens: Arc<LocalTokenService>,
        worker: Worker,
    }

    fn harness(
        pow: bool,
        config: MinerConfig,
        hooks: Hooks,
        init: bool,
        seal_delay: Duration,
    ) -> Harness {
        let state = funded_state();
        let root = crate::state::PendingState::state_root(&state);
        let base = Block::new(
            Header {
                number: 100,
                time: 1_000_000,
                gas_limit: 30_000_000,
                state_root: root,
                ..Default::default()
            },
            vec![],
            vec![],
            &[],
        );
        let chain = Arc::new(InMemoryChain::new(
            ChainConfig::all_active(CHAIN_ID),
            base,
            Box::new(state),
        ));
        let pool = Arc::new(InMemoryPool::with_channel_capacity(1024));
        let tokens = Arc::new(if pow {
            LocalTokenService::pow()
        } else {
            LocalTokenService::leader(BlockBuildParameters::default())
        });
        let engine = Arc::new(DevEngine::new().with_seal_delay(seal_delay));
        let worker = WorkerBuilder::new(
            config,
            engine,
            chain.clone(),
            pool.clone(),
            tokens.clone(),
        )
        .with_is_local_block(|header: &Header| header.coinbase == Address::repeat_byte(0xaa))
        .with_hooks(hooks)
        .with_init(init)
        .build();
        Harness { chain, pool, tokens, worker }
    }

    fn head_params() -> GenerateParams {
        GenerateParams {
            timestamp: pacing::unix_secs() as u64,
            coinbase: coinbase(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn leader_happy_path_seals_in_tip_order() {
        let h = harness(
            false,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let mut mined = h.worker.subscribe_mined_blocks();
        h.pool.add_transactions(vec![
            transfer(sender(1), 0, 3),
            transfer(sender(2), 0, 2),
            transfer(sender(3), 0, 1),
        ]);
        h.worker.start();

        let event = timeout(Duration::from_secs(5), mined.recv())
            .await
            .expect("no mined block")
            .expect("mined feed closed");
        let block = event.block;

        assert_eq!(block.number(), 101);
        assert_eq!(block.header.coinbase, coinbase());
        let tips: Vec<u128> = block
            .transactions
            .iter()
            .map(|tx| tx.max_priority_fee_per_gas)
            .collect();
        assert_eq!(tips, vec![3_000_000_000, 2_000_000_000, 1_000_000_000]);

        // Receipts were re-stamped with the sealed hash.
        let receipts = h.chain.receipts_of(block.hash()).expect("no receipts stored");
        assert_eq!(receipts.len(), 3);
        for (i, receipt) in receipts.iter().enumerate() {
            assert_eq!(receipt.block_hash, block.hash());
            assert_eq!(receipt.block_number, 101);
            assert_eq!(receipt.transaction_index, i as u64);
            assert!(receipt.logs.iter().all(|l| l.block_hash == block.hash()));
        }
        assert_eq!(h.chain.canonical_hash(101), Some(block.hash()));

        // The mining token went back after the write.
        let released = h.tokens.released();
        assert!(released
            .iter()
            .any(|(n, hash, parent)| *n == 101
                && *hash == block.hash()
                && *parent == block.parent_hash()));

        h.worker.close().await;
    }

    #[tokio::test]
    async fn lost_leadership_refreshes_pending_only() {
        let h = harness(
            false,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        h.tokens.set_deny(true);
        let mut mined = h.worker.subscribe_mined_blocks();
        h.worker.start();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.chain.current_block().number(), 100);
        let pending = h.worker.pending_block().expect("no pending snapshot");
        assert_eq!(pending.number(), 101);
        assert!(mined.try_recv().is_err());

        h.worker.close().await;
    }

    #[tokio::test]
    async fn idle_worker_streams_txs_into_pending_block() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            true,
            Duration::ZERO,
        );
        // The init kick materializes a pending snapshot.
        let deadline = Instant::now() + Duration::from_secs(2);
        while h.worker.pending_block().is_none() {
            assert!(Instant::now() < deadline, "no pending snapshot");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        h.pool.add_transaction(transfer(sender(1), 0, 3));

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some((block, receipts)) = h.worker.pending_block_and_receipts() {
                if !block.transactions.is_empty() {
                    assert_eq!(block.transactions.len(), receipts.len());
                    assert_eq!(block.number(), 101);
                    break;
                }
            }
            assert!(Instant::now() < deadline, "transaction never reached pending block");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        h.worker.close().await;
    }

    #[tokio::test]
    async fn new_head_interrupt_discards_work() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let core = h.worker.core.clone();
        let mut env = core.prepare_work(&head_params()).expect("prepare failed");

        let pending: HashMap<Address, Vec<Transaction>> = (1u8..=3)
            .map(|i| (sender(i), vec![transfer(sender(i), 0, i as u128)]))
            .collect();
        let mut set = TransactionsByPriceAndNonce::new(env.signer, pending, env.header.base_fee);

        let interrupt = Arc::new(AtomicI32::new(COMMIT_INTERRUPT_NEW_HEAD));
        let aborted = core
            .commit_transactions(&mut env, &mut set, Some(&interrupt), false, None)
            .await;

        assert!(aborted, "new-head interrupt must discard");
        assert_eq!(env.tcount, 0);
        assert!(env.txs.is_empty());
        assert!(core.pending_tasks.lock().unwrap().is_empty());

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn resubmit_interrupt_submits_and_slows_cadence() {
        let calls: Arc<Mutex<Vec<(Duration, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let hooks = Hooks {
            resubmit: Some(Box::new(move |min, cur| {
                recorded.lock().unwrap().push((min, cur));
            })),
            ..Default::default()
        };
        let h = harness(true, MinerConfig::new(coinbase()), hooks, false, Duration::ZERO);
        let core = h.worker.core.clone();
        let mut env = core.prepare_work(&head_params()).expect("prepare failed");
        let mut set =
            TransactionsByPriceAndNonce::new(env.signer, HashMap::new(), env.header.base_fee);

        let interrupt = Arc::new(AtomicI32::new(COMMIT_INTERRUPT_RESUBMIT));
        let aborted = core
            .commit_transactions(&mut env, &mut set, Some(&interrupt), false, None)
            .await;
        assert!(!aborted, "resubmit interrupt submits partial work");

        // The feedback lands in the dispatcher: ratio 0.1, prev 3 s ->
        // 3e9 * 0.9 + 0.1 * (3e10 + 2e8) = 5.72 s.
        let deadline = Instant::now() + Duration::from_secs(2);
        let expected = Duration::from_nanos(5_720_000_000);
        loop {
            {
                let calls = calls.lock().unwrap();
                if let Some((_, cur)) = calls.first() {
                    let diff = cur.as_nanos().abs_diff(expected.as_nanos());
                    assert!(diff < 1_000, "recommit {cur:?}, expected {expected:?}");
                    break;
                }
            }
            assert!(Instant::now() < deadline, "resubmit hook never fired");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn get_sealing_block_honors_params() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        h.worker.set_extra(Bytes::from_static(b"vanity"));
        let parent = h.chain.current_block();
        let random = B256::repeat_byte(0x01);

        let block = h
            .worker
            .get_sealing_block(parent.hash(), parent.time() + 5, coinbase(), random)
            .await
            .expect("get sealing block failed");

        assert_eq!(block.number(), 101);
        assert_eq!(block.header.mix_digest, random);
        assert_eq!(block.header.time, parent.time() + 5);
        assert!(block.uncles.is_empty());
        assert!(block.header.extra.is_empty());

        h.worker.close().await;
    }

    #[tokio::test]
    async fn duplicate_seal_hash_is_dropped() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::from_secs(5),
        );
        let core = h.worker.core.clone();
        core.running.store(true, Ordering::SeqCst);

        let env = core.prepare_work(&head_params()).expect("prepare failed");
        core.commit(&env, false, false, Instant::now()).await.unwrap();
        core.commit(&env, false, false, Instant::now()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(core.pending_tasks.lock().unwrap().len(), 1);

        // A different header is a new sealing attempt.
        let params = GenerateParams { coinbase: sender(0xbb), ..head_params() };
        let other = core.prepare_work(&params).expect("prepare failed");
        core.commit(&other, false, false, Instant::now()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(core.pending_tasks.lock().unwrap().len(), 2);

        env.discard();
        other.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn sealed_result_is_written_and_announced() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let core = h.worker.core.clone();
        core.running.store(true, Ordering::SeqCst);
        let mut mined = h.worker.subscribe_mined_blocks();

        let mut env = core.prepare_work(&head_params()).expect("prepare failed");
        env.gas_pool = Some(GasPool::new(env.header.gas_limit));
        let tx = transfer(sender(1), 0, 3);
        env.state.prepare(tx.hash(), 0);
        core.commit_transaction(&mut env, &tx).expect("apply failed");
        env.tcount += 1;

        core.commit(&env, false, false, Instant::now()).await.unwrap();

        let event = timeout(Duration::from_secs(2), mined.recv())
            .await
            .expect("no mined block")
            .expect("mined feed closed");
        assert_eq!(event.block.number(), 101);
        assert_eq!(event.block.transactions.len(), 1);
        assert_eq!(h.chain.canonical_hash(101), Some(event.block.hash()));

        let receipts = h.chain.receipts_of(event.block.hash()).expect("no receipts");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].block_hash, event.block.hash());

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn committer_stops_on_exhausted_gas_pool() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let core = h.worker.core.clone();
        let mut env = core.prepare_work(&head_params()).expect("prepare failed");
        env.gas_pool = Some(GasPool::new(TX_GAS - 1));

        let pending = HashMap::from([(sender(1), vec![transfer(sender(1), 0, 3)])]);
        let mut set = TransactionsByPriceAndNonce::new(env.signer, pending, env.header.base_fee);

        let aborted = core.commit_transactions(&mut env, &mut set, None, false, None).await;

        assert!(!aborted);
        assert_eq!(env.tcount, 0);
        // Nothing was popped from the ordering.
        assert!(set.peek().is_some());

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn deadline_respects_minimum_build_txs() {
        let config = MinerConfig::new(coinbase()).with_block_min_build_txs(2);
        let h = harness(false, config, Hooks::default(), false, Duration::ZERO);
        let core = h.worker.core.clone();

        // Leader-mode environments carry a deadline; set one already in
        // the past.
        core.running.store(true, Ordering::SeqCst);
        core.tokens.acquire_mining_token(101, B256::ZERO).unwrap();
        let mut env = core.prepare_work(&head_params()).expect("prepare failed");
        env.till = Some(pacing::unix_ms() - 10);

        let pending: HashMap<Address, Vec<Transaction>> = (1u8..=3)
            .map(|i| (sender(i), vec![transfer(sender(i), 0, i as u128)]))
            .collect();
        let mut set = TransactionsByPriceAndNonce::new(env.signer, pending, env.header.base_fee);
        let mut committed = HashSet::new();

        let aborted = core
            .commit_transactions(&mut env, &mut set, None, true, Some(&mut committed))
            .await;

        assert!(!aborted);
        // The elapsed deadline only fires once two transactions are in.
        assert_eq!(env.tcount, 2);
        assert_eq!(committed.len(), 2);

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn uncle_acceptance_predicate() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let core = h.worker.core.clone();

        // Extend the chain so the environment has two ancestors.
        let base = h.chain.current_block();
        let child = Block::new(
            Header {
                parent_hash: base.hash(),
                number: 101,
                gas_limit: base.gas_limit(),
                time: base.time() + 1,
                state_root: base.header.state_root,
                ..Default::default()
            },
            vec![],
            vec![],
            &[],
        );
        h.chain
            .write_block_and_set_head(&child, &[], &[], Box::new(funded_state()), false)
            .unwrap();

        let mut env = core.prepare_work(&head_params()).expect("prepare failed");
        assert_eq!(env.header.number, 102);

        // A side block on the grandparent is a valid uncle.
        let uncle = Header {
            parent_hash: base.hash(),
            number: 101,
            extra: Bytes::from_static(b"uncle"),
            ..Default::default()
        };
        core.commit_uncle(&mut env, &uncle).expect("valid uncle rejected");
        assert_eq!(env.uncles.len(), 1);

        // Again: no longer unique.
        assert!(matches!(
            core.commit_uncle(&mut env, &uncle),
            Err(MinerError::UncleNotUnique(_))
        ));

        // Sharing the sealing block's parent makes it a sibling.
        let sibling = Header {
            parent_hash: child.hash(),
            number: 102,
            extra: Bytes::from_static(b"sibling"),
            ..Default::default()
        };
        assert!(matches!(
            core.commit_uncle(&mut env, &sibling),
            Err(MinerError::UncleIsSibling(_))
        ));

        // Unknown parentage.
        let orphan = Header {
            parent_hash: B256::repeat_byte(0x99),
            number: 101,
            ..Default::default()
        };
        assert!(matches!(
            core.commit_uncle(&mut env, &orphan),
            Err(MinerError::UncleParentUnknown(_))
        ));

        // An ancestor itself is already family.
        assert!(matches!(
            core.commit_uncle(&mut env, &child.header),
            Err(MinerError::UncleAlreadyIncluded(_))
        ));

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn leader_mode_rejects_uncles() {
        let h = harness(
            false,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let core = h.worker.core.clone();
        core.tokens.acquire_mining_token(101, B256::ZERO).unwrap();
        let mut env = core.prepare_work(&head_params()).expect("prepare failed");

        let uncle = Header { parent_hash: B256::repeat_byte(0x01), ..Default::default() };
        assert!(matches!(
            core.commit_uncle(&mut env, &uncle),
            Err(MinerError::UnclesDisabled)
        ));

        env.discard();
        h.worker.close().await;
    }

    #[tokio::test]
    async fn side_blocks_classified_by_author() {
        let h = harness(
            true,
            MinerConfig::new(coinbase()),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        let base = h.chain.current_block();

        let local = Block::new(
            Header {
                parent_hash: base.hash(),
                number: 101,
                coinbase: coinbase(),
                extra: Bytes::from_static(b"local"),
                ..Default::default()
            },
            vec![],
            vec![],
            &[],
        );
        let remote = Block::new(
            Header {
                parent_hash: base.hash(),
                number: 101,
                coinbase: sender(0x77),
                extra: Bytes::from_static(b"remote"),
                ..Default::default()
            },
            vec![],
            vec![],
            &[],
        );
        h.worker
            .post_side_block(ChainSideEvent { block: Arc::new(local.clone()) })
            .await;
        h.worker
            .post_side_block(ChainSideEvent { block: Arc::new(remote.clone()) })
            .await;

        let core = h.worker.core.clone();
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let locals = core.local_uncles.lock().unwrap().len();
            let remotes = core.remote_uncles.lock().unwrap().len();
            if locals == 1 && remotes == 1 {
                assert!(core.local_uncles.lock().unwrap().contains_key(&local.hash()));
                assert!(core.remote_uncles.lock().unwrap().contains_key(&remote.hash()));
                break;
            }
            assert!(Instant::now() < deadline, "side blocks never classified");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        h.worker.close().await;
    }

    #[tokio::test]
    async fn worker_lifecycle_api() {
        let h = harness(
            true,
            MinerConfig::new(Address::ZERO),
            Hooks::default(),
            false,
            Duration::ZERO,
        );
        assert!(!h.worker.is_running());

        h.worker.set_etherbase(coinbase());
        h.worker.set_gas_ceil(20_000_000);
        h.worker.set_extra(Bytes::from_static(b"hello"));
        h.worker.disable_preseal();
        h.worker.enable_preseal();
        h.worker.set_recommit_interval(Duration::from_secs(2)).await;

        h.worker.start();
        assert!(h.worker.is_running());
        h.worker.stop();
        assert!(!h.worker.is_running());

        h.worker.close().await;
    }
}

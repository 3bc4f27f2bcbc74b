//! Socket Server Lifecycle
//!
//! ## Overview
//!
//! The RPC listener only makes sense while the node has a network link. The
//! coordinator ties the two together:
//!
//! ```text
//!                 link up, backoff elapsed
//!   ┌─────────┐ ─────────────────────────────▶ ┌─────────┐
//!   │ stopped │                                 │ running │
//!   └─────────┘ ◀───────────────────────────── └─────────┘
//!        ▲  │        link lost: stop listener,
//!        │  │        clear subscriptions
//!        └──┘ start failed: retry after 5 s
//! ```
//!
//! The registry and dispatcher are built once, the first time a step gets
//! the setup lock; later restarts reuse them.
//!
//! ## Lock Discipline
//!
//! The running flag and the setup latch share one [`TimedMutex`]. Setup waits
//! up to 500 ms for it, steady-state checks up to 100 ms. A step that does
//! not get the lock does nothing and reports [`LifecycleStep::Skipped`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use fieldnode_core::constants::{
    LIFECYCLE_CHECK_WAIT_MS, LIFECYCLE_SETUP_WAIT_MS, LISTENER_RETRY_BACKOFF_MS,
};
use fieldnode_core::{TimeSource, TimedMutex, Timestamp};

use crate::context::NodeContext;
use crate::rpc::{Registry, RpcDispatcher, RpcServer, RunningServer, SubscriptionTable};

/// Delay between lifecycle steps in [`LifecycleCoordinator::run`]
pub const LIFECYCLE_STEP_INTERVAL_MS: u64 = 1_000;

/// Interval of the "server running" log line
const RUNNING_LOG_INTERVAL_MS: u64 = 5_000;

/// What one lifecycle step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    /// Lock not acquired; nothing changed
    Skipped,
    /// Link down and server stopped
    Idle,
    /// Link up and server already running
    Running,
    /// Listener started on the given address
    Started(SocketAddr),
    /// Link lost; listener stopped and subscriptions cleared
    Stopped,
    /// Listener could not be started; retried after the backoff
    StartFailed,
    /// Link up, server stopped, waiting out the retry backoff
    BackingOff,
}

#[derive(Default)]
struct ServerState {
    running: bool,
    setup_completed: bool,
    last_attempt: Option<Timestamp>,
    last_running_log: Timestamp,
    server: Option<RpcServer>,
    listener: Option<RunningServer>,
}

pub struct LifecycleCoordinator {
    ctx: Arc<NodeContext>,
    clock: Arc<dyn TimeSource>,
    address: String,
    subscriptions: Arc<SubscriptionTable>,
    poll_interval: Option<Duration>,
    state: TimedMutex<ServerState>,
}

impl LifecycleCoordinator {
    pub fn new(ctx: Arc<NodeContext>, clock: Arc<dyn TimeSource>, address: impl Into<String>) -> Self {
        Self {
            ctx,
            clock,
            address: address.into(),
            subscriptions: Arc::new(SubscriptionTable::new()),
            poll_interval: None,
            state: TimedMutex::new(ServerState::default()),
        }
    }

    /// Override the subscription poll interval of the server
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionTable> {
        &self.subscriptions
    }

    /// Address of the running listener, if any
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let state = self
            .state
            .try_lock_for(Duration::from_millis(LIFECYCLE_CHECK_WAIT_MS))
            .await?;
        state.listener.as_ref().map(RunningServer::local_addr)
    }

    pub async fn is_running(&self) -> Option<bool> {
        let state = self
            .state
            .try_lock_for(Duration::from_millis(LIFECYCLE_CHECK_WAIT_MS))
            .await?;
        Some(state.running)
    }

    async fn ensure_setup(&self) -> bool {
        let Some(mut state) = self
            .state
            .try_lock_for(Duration::from_millis(LIFECYCLE_SETUP_WAIT_MS))
            .await
        else {
            warn!("lifecycle: setup lock busy, skipping");
            return false;
        };
        if !state.setup_completed {
            let registry = Arc::new(Registry::standard());
            let dispatcher = Arc::new(RpcDispatcher::new(
                Arc::clone(&self.ctx),
                registry,
                Arc::clone(&self.subscriptions),
            ));
            let mut server = RpcServer::new(dispatcher, Arc::clone(&self.clock));
            if let Some(interval) = self.poll_interval {
                server = server.with_poll_interval(interval);
            }
            state.server = Some(server);
            state.setup_completed = true;
            info!("lifecycle: rpc server set up");
        }
        true
    }

    /// Reconcile the listener with the current link state
    pub async fn step(&self) -> LifecycleStep {
        if !self.ensure_setup().await {
            return LifecycleStep::Skipped;
        }

        let Some(mut state) = self
            .state
            .try_lock_for(Duration::from_millis(LIFECYCLE_CHECK_WAIT_MS))
            .await
        else {
            warn!("lifecycle: state lock busy, skipping");
            return LifecycleStep::Skipped;
        };

        let now = self.clock.now();
        let link_up = self.ctx.network.is_link_up();

        match (link_up, state.running) {
            (true, true) => {
                if now.saturating_sub(state.last_running_log) >= RUNNING_LOG_INTERVAL_MS {
                    state.last_running_log = now;
                    if let Some(listener) = &state.listener {
                        info!("rpc server running on {}", listener.local_addr());
                    }
                }
                LifecycleStep::Running
            }
            (true, false) => {
                if let Some(last) = state.last_attempt {
                    if now.saturating_sub(last) < LISTENER_RETRY_BACKOFF_MS {
                        return LifecycleStep::BackingOff;
                    }
                }
                let Some(server) = state.server.as_ref() else {
                    return LifecycleStep::Skipped;
                };
                let started = server.start(&self.address).await;
                match started {
                    Ok(listener) => {
                        let addr = listener.local_addr();
                        state.listener = Some(listener);
                        state.running = true;
                        state.last_running_log = now;
                        state.last_attempt = None;
                        LifecycleStep::Started(addr)
                    }
                    Err(e) => {
                        error!("lifecycle: could not start rpc server: {}", e);
                        state.last_attempt = Some(now);
                        LifecycleStep::StartFailed
                    }
                }
            }
            (false, true) => {
                warn!("lifecycle: network link lost, stopping rpc server");
                if let Some(listener) = state.listener.take() {
                    listener.stop().await;
                }
                self.subscriptions.clear().await;
                state.running = false;
                LifecycleStep::Stopped
            }
            (false, false) => LifecycleStep::Idle,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let interval = Duration::from_millis(LIFECYCLE_STEP_INTERVAL_MS);
        loop {
            self.step().await;
            tokio::time::sleep(interval).await;
        }
    }
}

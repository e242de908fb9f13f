//! Bridge manager: the supervisory state machine around the REST listener.
//!
//! # States
//!
//! ```text
//!            start(cfg)                bound
//!  Stopped ─────────────▶ Starting ─────────▶ Running
//!     ▲                      │                   │ stop() / config change
//!     │      bind failure    │                   ▼
//!     └──────────────────────┴────────────── Stopping
//!                            pending forced to {}, socket closed, thread joined
//! ```
//!
//! Transitions are serialized by one lifecycle mutex. The observable state and
//! status string live behind a separate lock so they can be read while a
//! transition is in progress.
//!
//! One manager is expected per process. It is constructed explicitly and handed
//! to whoever needs it (engine, CLI); there is no global instance.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::catalog::Catalog;
use crate::core::dispatch::JobDispatcher;
use crate::core::error::{BridgeError, Result};
use crate::core::pending::PendingRequests;
use crate::core::progress::ProgressTracker;
use crate::core::request::{BridgeRequest, RequestId};
use crate::core::shared::{BridgeShared, JobTarget};
use crate::server::Listener;

/// Job type the client-side graph registers its serving node under
pub const DEFAULT_JOB_TYPE: &str = "OpenOutpainterServingV1";

/// Listener and routing configuration. Treated as a value: any change to a
/// listener field while running forces a full stop/start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub cors: bool,
    pub job_type: String,
    pub job_owner: String,
    /// Dump request/response bodies (images truncated)
    pub verbose: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "127.0.0.1".to_string(),
            port: 7860,
            cors: false,
            job_type: DEFAULT_JOB_TYPE.to_string(),
            job_owner: String::new(),
            verbose: false,
        }
    }
}

impl BridgeConfig {
    /// Whether moving from `self` to `other` requires rebinding the listener.
    pub fn listener_differs(&self, other: &BridgeConfig) -> bool {
        self.address != other.address
            || self.port != other.port
            || self.cors != other.cors
            || self.verbose != other.verbose
    }

    pub fn target(&self) -> JobTarget {
        JobTarget {
            job_type: self.job_type.clone(),
            job_owner: self.job_owner.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

const STATUS_STOPPED: &str = "Server not running";

struct Lifecycle {
    listener: Option<Listener>,
    /// Config the running listener was started with
    active: Option<BridgeConfig>,
}

struct Observed {
    state: BridgeState,
    status: String,
}

pub struct BridgeManager {
    shared: Arc<BridgeShared>,
    lifecycle: Mutex<Lifecycle>,
    observed: RwLock<Observed>,
}

impl BridgeManager {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            shared: Arc::new(BridgeShared::new(dispatcher)),
            lifecycle: Mutex::new(Lifecycle {
                listener: None,
                active: None,
            }),
            observed: RwLock::new(Observed {
                state: BridgeState::Stopped,
                status: STATUS_STOPPED.to_string(),
            }),
        }
    }

    // ========== Lifecycle ==========

    /// Start the listener with `config`.
    ///
    /// Already running with the same config: no-op. Running with a different
    /// config: full stop, then start. Bind failure leaves the manager `Stopped`
    /// with an `ERROR:` status and returns [`BridgeError::Bind`].
    pub fn start(&self, config: &BridgeConfig) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());

        self.shared.set_target(config.target());
        if let Some(active) = &lifecycle.active {
            if !active.listener_differs(config) {
                return Ok(());
            }
            info!("API server config changed, restarting");
            self.stop_locked(&mut lifecycle);
        }

        self.observe(BridgeState::Starting, format!("Starting on {}:{}", config.address, config.port));
        self.shared.pending().reopen();

        match Listener::spawn(config, Arc::clone(&self.shared)) {
            Ok(listener) => {
                let addr = listener.local_addr();
                info!("API server running on http://{}", addr);
                self.observe(BridgeState::Running, format!("Server is running on {}", addr));
                lifecycle.listener = Some(listener);
                lifecycle.active = Some(config.clone());
                Ok(())
            }
            Err(e) => {
                error!("Could not start API server: {}", e);
                self.observe(BridgeState::Stopped, format!("ERROR: Could not start API server: {}", e));
                Err(e)
            }
        }
    }

    /// Release every pending handler with `{}`, close the socket and join the
    /// listener thread. Safe to call when already stopped.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        self.stop_locked(&mut lifecycle);
    }

    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        let Some(listener) = lifecycle.listener.take() else {
            // Nothing bound, but a caller may still be parked in execute()
            self.shared.pending().close();
            self.observe(BridgeState::Stopped, STATUS_STOPPED.to_string());
            return;
        };
        lifecycle.active = None;

        self.observe(BridgeState::Stopping, format!("Stopping server on {}", listener.local_addr()));
        let released = self.shared.pending().close();
        if released > 0 {
            warn!("Released {} pending request(s) with an empty result", released);
        }
        let addr = listener.local_addr();
        listener.shutdown();
        self.shared.progress().reset();

        info!("API server stopped on {}", addr);
        self.observe(BridgeState::Stopped, STATUS_STOPPED.to_string());
    }

    /// Reconcile with `config`: stop if disabled or a listener field changed,
    /// start if enabled and not running. Job routing fields apply immediately.
    pub fn apply(&self, config: &BridgeConfig) -> Result<()> {
        self.shared.set_target(config.target());
        let running_with = self
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .clone();

        match running_with {
            Some(active) if !config.enabled || active.listener_differs(config) => {
                self.stop();
            }
            Some(_) => return Ok(()),
            None => {}
        }
        if config.enabled {
            self.start(config)?;
        }
        Ok(())
    }

    fn observe(&self, state: BridgeState, status: String) {
        let mut observed = self.observed.write().unwrap_or_else(|e| e.into_inner());
        observed.state = state;
        observed.status = status;
    }

    pub fn state(&self) -> BridgeState {
        self.observed.read().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Human readable state, including the bound address while running.
    pub fn status(&self) -> String {
        self.observed.read().unwrap_or_else(|e| e.into_inner()).status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listener
            .as_ref()
            .map(Listener::local_addr)
    }

    // ========== Engine-facing ==========

    /// Look up a pending request for the engine, attaching the current catalog.
    pub fn checkout(&self, id: RequestId) -> Option<Arc<BridgeRequest>> {
        self.shared.checkout(id)
    }

    /// Completion callback. Ids that are no longer pending are ignored.
    pub fn finalize(&self, id: RequestId, output: Value) -> Result<()> {
        self.shared.finalize(id, output)
    }

    pub fn progress(&self) -> &ProgressTracker {
        self.shared.progress()
    }

    pub fn pending(&self) -> &PendingRequests {
        self.shared.pending()
    }

    pub fn catalog(&self) -> Catalog {
        self.shared.catalog()
    }

    pub fn set_catalog(&self, catalog: Catalog) {
        self.shared.set_catalog(catalog);
    }

    pub fn shared(&self) -> &Arc<BridgeShared> {
        &self.shared
    }
}

impl Drop for BridgeManager {
    fn drop(&mut self) {
        self.stop();
    }
}

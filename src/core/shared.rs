//! State shared by the manager, every listener handler thread and the engine.

use std::sync::{Arc, RwLock};

use log::{debug, warn};
use serde_json::Value;

use super::catalog::Catalog;
use super::dispatch::{JobDispatcher, JobSubmission};
use super::error::Result;
use super::pending::PendingRequests;
use super::progress::ProgressTracker;
use super::request::{BridgeRequest, EXTRA_CHECKPOINTS, EXTRA_STYLES, RequestId};
use super::routes::CommandPath;

/// Who the engine should route a submission to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTarget {
    pub job_type: String,
    pub job_owner: String,
}

pub struct BridgeShared {
    pending: PendingRequests,
    progress: ProgressTracker,
    catalog: RwLock<Catalog>,
    target: RwLock<JobTarget>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl BridgeShared {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            pending: PendingRequests::new(),
            progress: ProgressTracker::new(),
            catalog: RwLock::new(Catalog::default()),
            target: RwLock::new(JobTarget::default()),
            dispatcher,
        }
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_catalog(&self, catalog: Catalog) {
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = catalog;
    }

    pub fn target(&self) -> JobTarget {
        self.target.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_target(&self, target: JobTarget) {
        *self.target.write().unwrap_or_else(|e| e.into_inner()) = target;
    }

    /// Queue `payload` as a job and block until the engine finalizes it.
    ///
    /// The entry is inserted before submission and removed after the output is
    /// read, whatever the outcome. A failed submission removes the entry at once,
    /// since nothing would ever finalize it.
    pub fn execute(&self, command: CommandPath, payload: Value, bridge_port: u16) -> Result<Value> {
        let request = self.pending.allocate(payload, command)?;
        let id = request.id();
        let target = self.target();

        let submission = JobSubmission {
            job_type: target.job_type,
            job_owner: target.job_owner,
            bridge_port,
            request_id: id,
        };
        if let Err(e) = self.dispatcher.submit(submission) {
            warn!("Request {} not queued: {}", id, e);
            self.pending.remove(id);
            return Err(e);
        }

        debug!("Request {} queued, waiting for engine", id);
        let output = request.wait();

        self.pending.remove(id);
        self.progress.reset();
        debug!("Request {} finished", id);
        Ok(output)
    }

    /// Engine-side lookup. Attaches the current catalog to the request's side channel.
    pub fn checkout(&self, id: RequestId) -> Option<Arc<BridgeRequest>> {
        let request = self.pending.get(id)?;
        let catalog = self.catalog();
        request.set_extra(
            EXTRA_STYLES,
            serde_json::to_value(&catalog.styles).unwrap_or(Value::Null),
        );
        request.set_extra(EXTRA_CHECKPOINTS, Value::from(catalog.advertised_checkpoints()));
        Some(request)
    }

    /// Engine completion callback. Stale ids are ignored (returned as `Err`).
    pub fn finalize(&self, id: RequestId, output: Value) -> Result<()> {
        self.pending.finalize(id, output)
    }
}

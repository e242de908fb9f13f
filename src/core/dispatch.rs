//! Hand-off from an accepted REST call to the execution engine.
//!
//! Submission only enqueues. The HTTP handler's own wait on the request's
//! latch is what makes the call synchronous for the client.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::error::{BridgeError, Result};
use super::request::RequestId;

/// Message the engine receives for each queued command. The engine echoes
/// `request_id` back when it finalizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_type: String,
    pub job_owner: String,
    pub bridge_port: u16,
    pub request_id: RequestId,
}

/// Execution-engine side of the bridge. Must not block on job execution.
pub trait JobDispatcher: Send + Sync {
    fn submit(&self, job: JobSubmission) -> Result<()>;
}

/// Dispatcher backed by an unbounded crossbeam channel; the engine owns the receiver.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: Sender<JobSubmission>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, Receiver<JobSubmission>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl JobDispatcher for ChannelDispatcher {
    fn submit(&self, job: JobSubmission) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|e| BridgeError::Dispatch(format!("engine is not listening ({})", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64) -> JobSubmission {
        JobSubmission {
            job_type: "OpenOutpainterServingV1".into(),
            job_owner: "12".into(),
            bridge_port: 7860,
            request_id: RequestId(id),
        }
    }

    #[test]
    fn test_submit_enqueues_without_blocking() {
        let (dispatcher, rx) = ChannelDispatcher::new();
        for id in 0..3 {
            dispatcher.submit(job(id)).unwrap();
        }
        let got: Vec<_> = rx.try_iter().map(|j| j.request_id).collect();
        assert_eq!(got, vec![RequestId(0), RequestId(1), RequestId(2)]);
    }

    #[test]
    fn test_submit_fails_when_engine_gone() {
        let (dispatcher, rx) = ChannelDispatcher::new();
        drop(rx);
        assert!(matches!(dispatcher.submit(job(0)), Err(BridgeError::Dispatch(_))));
    }

    #[test]
    fn test_wire_shape() {
        let v = serde_json::to_value(job(9)).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "job_type": "OpenOutpainterServingV1",
                "job_owner": "12",
                "bridge_port": 7860,
                "request_id": 9,
            })
        );
    }
}

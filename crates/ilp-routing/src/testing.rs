//! Test doubles shared by the state machine tests.

use std::sync::{Arc, Mutex};

use ilp_core::{CcpReply, CcpRequest};

use crate::error::TransportError;
use crate::transport::CcpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behaviour {
    Ack,
    Reject,
    Fail,
    Hang,
}

/// Records every request and answers according to its current behaviour.
pub(crate) struct MockTransport {
    behaviour: Mutex<Behaviour>,
    sent: Mutex<Vec<(String, CcpRequest)>>,
}

impl MockTransport {
    pub(crate) fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Mutex::new(behaviour),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub(crate) fn sent(&self) -> Vec<(String, CcpRequest)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CcpTransport for MockTransport {
    async fn send(&self, peer: &str, request: CcpRequest) -> Result<CcpReply, TransportError> {
        self.sent.lock().unwrap().push((peer.to_string(), request));
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            Behaviour::Ack => Ok(CcpReply::Ack),
            Behaviour::Reject => Ok(CcpReply::reject("not now")),
            Behaviour::Fail => Err(TransportError::Failure("unreachable".to_string())),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

/// Poll `check` on the (usually paused) clock until it holds.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(std::time::Duration::from_secs(600), async {
        while !check() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition never held");
}

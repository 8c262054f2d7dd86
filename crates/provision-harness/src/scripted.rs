//! Scripted transport for driver tests.
//!
//! Answers calls from a queue of canned envelopes. When the queue is empty a
//! call parks until the test completes it by hand, which lets a test hold a
//! request in flight, cancel the attempt, and then deliver the late
//! completion.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use provision_client::Transport;
use provision_proto::{RegistrationRequest, RequestBody, ResponseEnvelope, TransportError};
use tokio::sync::{Notify, oneshot};

/// A transport call as the transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `registration_request`.
    Register {
        /// Registration id from the request.
        registration_id: String,
    },
    /// `query_operation_status`.
    QueryStatus {
        /// Operation queried.
        operation_id: String,
    },
    /// `end_session`.
    EndSession,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<ResponseEnvelope>,
    parked: VecDeque<oneshot::Sender<ResponseEnvelope>>,
    end_session_error: Option<TransportError>,
    calls: Vec<TransportCall>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    arrived: Notify,
}

/// Transport driven by a script. Clones share the script.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    /// Transport with an empty script; every call parks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that answers calls with `responses`, in order.
    pub fn with_responses(responses: impl IntoIterator<Item = ResponseEnvelope>) -> Self {
        let transport = Self::new();
        for response in responses {
            transport.push(response);
        }
        transport
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A poisoned script only happens after a test already panicked.
        self.shared.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an envelope for the next unanswered call.
    pub fn push(&self, response: ResponseEnvelope) {
        self.script().responses.push_back(response);
    }

    /// Make every subsequent `end_session` fail with `error`.
    pub fn fail_end_session(&self, error: TransportError) {
        self.script().end_session_error = Some(error);
    }

    /// Complete the oldest parked call. Returns false if none was parked or
    /// its caller went away.
    pub fn complete(&self, response: ResponseEnvelope) -> bool {
        let parked = self.script().parked.pop_front();
        parked.is_some_and(|tx| tx.send(response).is_ok())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.script().calls.clone()
    }

    /// Number of calls currently parked.
    pub fn parked(&self) -> usize {
        self.script().parked.len()
    }

    /// Wait until at least `count` calls have been received.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let arrived = self.shared.arrived.notified();
            if self.script().calls.len() >= count {
                return;
            }
            arrived.await;
        }
    }

    async fn answer(&self, call: TransportCall) -> ResponseEnvelope {
        let parked = {
            let mut script = self.script();
            script.calls.push(call);

            match script.responses.pop_front() {
                Some(response) => Ok(response),
                None => {
                    let (tx, rx) = oneshot::channel();
                    script.parked.push_back(tx);
                    Err(rx)
                },
            }
        };
        self.shared.arrived.notify_waiters();

        match parked {
            Ok(response) => response,
            Err(rx) => rx
                .await
                .unwrap_or_else(|_| ResponseEnvelope::failed(TransportError::network("script dropped"))),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn registration_request(
        &self,
        request: RegistrationRequest,
        _body: RequestBody,
    ) -> ResponseEnvelope {
        self.answer(TransportCall::Register { registration_id: request.registration_id }).await
    }

    async fn query_operation_status(
        &self,
        _request: RegistrationRequest,
        operation_id: String,
    ) -> ResponseEnvelope {
        self.answer(TransportCall::QueryStatus { operation_id }).await
    }

    async fn end_session(&self) -> Result<(), TransportError> {
        let error = {
            let mut script = self.script();
            script.calls.push(TransportCall::EndSession);
            script.end_session_error.clone()
        };
        self.shared.arrived.notify_waiters();

        error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use provision_proto::RegistrationBody;

    use super::*;

    #[tokio::test]
    async fn queued_responses_answer_in_order() {
        let transport = ScriptedTransport::with_responses([
            ResponseEnvelope::ok(RegistrationBody::with_status("assigning")),
            ResponseEnvelope::ok(RegistrationBody::with_status("assigned")),
        ]);
        let request = RegistrationRequest::new("dev", "scope");

        let first = transport.registration_request(request.clone(), RequestBody::new("dev")).await;
        let second = transport.query_operation_status(request, "op".to_string()).await;

        assert_eq!(first.body.and_then(|b| b.status).as_deref(), Some("assigning"));
        assert_eq!(second.body.and_then(|b| b.status).as_deref(), Some("assigned"));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn parked_call_completes_by_hand() {
        let transport = ScriptedTransport::new();
        let caller = transport.clone();
        let pending = tokio::spawn(async move {
            caller
                .registration_request(RegistrationRequest::new("dev", "scope"), RequestBody::new("dev"))
                .await
        });

        transport.wait_for_calls(1).await;
        assert_eq!(transport.parked(), 1);
        assert!(transport.complete(ResponseEnvelope::ok(RegistrationBody::with_status("assigned"))));

        let envelope = pending.await.unwrap_or_default();
        assert!(envelope.body.is_some());
    }

    #[tokio::test]
    async fn end_session_failure_is_scripted() {
        let transport = ScriptedTransport::new();
        transport.fail_end_session(TransportError::network("reset"));

        assert!(transport.end_session().await.is_err());
        assert_eq!(transport.calls(), vec![TransportCall::EndSession]);
    }
}

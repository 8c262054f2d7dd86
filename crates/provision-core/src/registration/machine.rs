//! Registration state machine.
//!
//! Sequences one register/poll/complete exchange with the provisioning
//! service. Pure state machine: every event returns the actions the driver
//! must execute, and every asynchronous completion comes back as an event.
//!
//! # Transition table
//!
//! ```text
//! Disconnected ──register──▶ SendingRegistrationRequest ──response──▶ ResponseReceived
//!      ▲                         ▲                                 │    │    │
//!      │                         │ register            assigning   │    │    │ failed / unknown
//!      │                       Idle ◀── ResponseComplete ◀─assigned┘    │    │ / transport error
//!      │                         │                                      ▼    ▼
//!      │                         │ end_session              WaitingToPoll  ResponseError
//!      │                         ▼                              │  ▲            │
//!      └──session ended── EndingSession ◀──end_session──────────┤  │ response   │
//!                                ▲                         timer▼  │            │
//!                                └──────────────────────────── Polling ◀────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one [`OperationToken`] is live; a completion is acted upon only
//!   if it echoes the live token
//! - At most one pending call exists; every pending call is resolved exactly
//!   once
//! - Every attempt-terminating error flows through `EndingSession` and lands
//!   in `Disconnected`
//! - A cancelled poll timer is never acted upon, even if the driver reports
//!   it after cancellation
//! - Caller events arriving during `EndingSession` are deferred and replayed
//!   in arrival order once `Disconnected` is entered

use std::{collections::VecDeque, time::Duration};

use provision_proto::{
    ProtocolResult, RegistrationBody, RegistrationRequest, RegistrationStatus, RequestBody,
    ResponseEnvelope, TransportError,
};

use super::{
    event::{
        CallId, CallOutcome, OperationToken, RegistrationAction, RegistrationEvent,
        RegistrationOutcome, TimerId,
    },
    state::RegistrationState,
};
use crate::error::RegistrationError;

/// Default delay between status queries when the service does not specify
/// one.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(2);

/// Registration machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// Delay used when an `assigning` response carries no polling interval.
    pub default_polling_interval: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self { default_polling_interval: DEFAULT_POLLING_INTERVAL }
    }
}

/// The live attempt: its token and the call waiting on it.
#[derive(Debug, Clone, Copy)]
struct ActiveOperation {
    token: OperationToken,
    call: CallId,
}

/// What `EndingSession` carries through to `Disconnected`.
#[derive(Debug)]
struct Teardown {
    error: Option<RegistrationError>,
    call: Option<CallId>,
}

/// Resting and waiting states with their data.
#[derive(Debug, Default)]
enum Phase {
    #[default]
    Disconnected,
    Idle,
    SendingRegistrationRequest {
        request: RegistrationRequest,
    },
    WaitingToPoll {
        request: RegistrationRequest,
        operation_id: String,
        timer: TimerId,
    },
    Polling {
        request: RegistrationRequest,
    },
    EndingSession {
        teardown: Teardown,
    },
}

impl Phase {
    fn state(&self) -> RegistrationState {
        match self {
            Self::Disconnected => RegistrationState::Disconnected,
            Self::Idle => RegistrationState::Idle,
            Self::SendingRegistrationRequest { .. } => {
                RegistrationState::SendingRegistrationRequest
            },
            Self::WaitingToPoll { .. } => RegistrationState::WaitingToPoll,
            Self::Polling { .. } => RegistrationState::Polling,
            Self::EndingSession { .. } => RegistrationState::EndingSession,
        }
    }
}

/// Client-side registration state machine.
///
/// Drives the register/poll exchange, enforces a single attempt in flight
/// and funnels success, failure and cancellation into one disconnect
/// sequence. Pure state machine - returns actions, caller handles I/O.
#[derive(Debug)]
pub struct RegistrationMachine {
    config: RegistrationConfig,
    phase: Phase,
    active: Option<ActiveOperation>,
    deferred: VecDeque<RegistrationEvent>,
    next_token: u64,
    next_timer: u64,
}

impl RegistrationMachine {
    /// Create a machine in the `Disconnected` state.
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            config,
            phase: Phase::Disconnected,
            active: None,
            deferred: VecDeque::new(),
            next_token: 1,
            next_timer: 1,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> RegistrationState {
        self.phase.state()
    }

    /// Machine configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Token of the live attempt, if any.
    pub fn active_token(&self) -> Option<OperationToken> {
        self.active.map(|op| op.token)
    }

    /// The call the machine currently owes a resolution to, if any.
    pub fn pending_call(&self) -> Option<CallId> {
        match &self.phase {
            Phase::EndingSession { teardown } => teardown.call,
            _ => self.active.map(|op| op.call),
        }
    }

    /// Number of caller events waiting for the current transition to finish.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: RegistrationEvent) -> Vec<RegistrationAction> {
        let mut actions = Vec::new();
        self.dispatch(event, &mut actions);
        actions
    }

    /// Transition function keyed by (state, event).
    fn dispatch(&mut self, event: RegistrationEvent, actions: &mut Vec<RegistrationAction>) {
        use RegistrationEvent as Ev;

        match (std::mem::take(&mut self.phase), event) {
            (Phase::Disconnected | Phase::Idle, Ev::Register { call, request, body }) => {
                self.enter_sending_registration_request(call, request, body, actions);
            },

            (Phase::Disconnected, Ev::EndSession { call }) => {
                self.phase = Phase::Disconnected;
                actions.push(RegistrationAction::Resolve { call, outcome: CallOutcome::Disconnected });
            },

            (Phase::Idle, Ev::EndSession { call }) => {
                self.enter_ending_session(Teardown { error: None, call: Some(call) }, actions);
            },

            (
                phase @ (Phase::SendingRegistrationRequest { .. }
                | Phase::WaitingToPoll { .. }
                | Phase::Polling { .. }),
                Ev::Register { call, .. },
            ) => {
                tracing::debug!(%call, state = %phase.state(), "rejecting register: attempt in flight");
                self.phase = phase;
                actions.push(RegistrationAction::Resolve {
                    call,
                    outcome: CallOutcome::Failed(RegistrationError::operation_in_progress()),
                });
            },

            (
                Phase::SendingRegistrationRequest { .. } | Phase::Polling { .. },
                Ev::EndSession { call },
            ) => {
                self.enter_ending_session(Teardown { error: None, call: Some(call) }, actions);
            },

            (Phase::WaitingToPoll { timer, .. }, Ev::EndSession { call }) => {
                actions.push(RegistrationAction::CancelPollTimer { timer });
                self.enter_ending_session(Teardown { error: None, call: Some(call) }, actions);
            },

            (phase @ Phase::EndingSession { .. }, event) if event.is_caller_event() => {
                tracing::debug!(?event, "deferring caller event until session has ended");
                self.phase = phase;
                self.deferred.push_back(event);
            },

            (Phase::SendingRegistrationRequest { request }, Ev::RegistrationResponse { token, envelope })
                if self.is_live(token) =>
            {
                self.enter_response_received(request, envelope, actions);
            },

            (Phase::Polling { request }, Ev::OperationStatusResponse { token, envelope })
                if self.is_live(token) =>
            {
                self.enter_response_received(request, envelope, actions);
            },

            (
                Phase::WaitingToPoll { request, operation_id, timer },
                Ev::PollTimerElapsed { timer: fired },
            ) if fired == timer => {
                self.enter_polling(request, operation_id, actions);
            },

            (Phase::EndingSession { teardown }, Ev::SessionEnded { error }) => {
                self.on_session_ended(teardown, error, actions);
            },

            (phase, event) => {
                self.phase = phase;
                self.discard(&event);
            },
        }
    }

    fn is_live(&self, token: OperationToken) -> bool {
        self.active.is_some_and(|op| op.token == token)
    }

    /// Drop an event that does not apply to the current attempt.
    fn discard(&self, event: &RegistrationEvent) {
        let state = self.state();
        match event {
            RegistrationEvent::RegistrationResponse { token, .. }
            | RegistrationEvent::OperationStatusResponse { token, .. } => {
                tracing::debug!(
                    %token,
                    active = ?self.active_token(),
                    %state,
                    "discarding response for cancelled or superseded operation"
                );
            },
            RegistrationEvent::PollTimerElapsed { timer } => {
                tracing::debug!(%timer, %state, "discarding stale poll timer");
            },
            RegistrationEvent::SessionEnded { .. } => {
                tracing::debug!(%state, "discarding unexpected session-ended completion");
            },
            RegistrationEvent::Register { .. } | RegistrationEvent::EndSession { .. } => {
                tracing::warn!(%state, ?event, "caller event not handled in this state");
            },
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::debug!(to = %phase.state(), "registration transition");
        self.phase = phase;
    }

    fn mint_token(&mut self) -> OperationToken {
        let token = OperationToken::new(self.next_token);
        self.next_token += 1;
        token
    }

    fn mint_timer(&mut self) -> TimerId {
        let timer = TimerId::new(self.next_timer);
        self.next_timer += 1;
        timer
    }

    fn enter_sending_registration_request(
        &mut self,
        call: CallId,
        request: RegistrationRequest,
        body: RequestBody,
        actions: &mut Vec<RegistrationAction>,
    ) {
        let token = self.mint_token();
        self.active = Some(ActiveOperation { token, call });
        self.set_phase(Phase::SendingRegistrationRequest { request: request.clone() });

        actions.push(RegistrationAction::SendRegistrationRequest { token, request, body });
    }

    /// Classify a live response. Transient: always leaves for another state.
    fn enter_response_received(
        &mut self,
        request: RegistrationRequest,
        envelope: ResponseEnvelope,
        actions: &mut Vec<RegistrationAction>,
    ) {
        tracing::debug!(state = %RegistrationState::ResponseReceived, "registration transition");

        let ResponseEnvelope { error, body, result, polling_interval } = envelope;

        if let Some(err) = error {
            return self.enter_response_error(RegistrationError::Transport(err), actions);
        }

        let Some(body) = body else {
            let error = RegistrationError::ProtocolFormat {
                reason: "response carried no body".to_string(),
                body: None,
                result,
            };
            return self.enter_response_error(error, actions);
        };

        match body.classify() {
            RegistrationStatus::Assigned => self.enter_response_complete(body, result, actions),

            RegistrationStatus::Assigning => {
                let Some(operation_id) = body.operation_id.clone() else {
                    let error = RegistrationError::ProtocolFormat {
                        reason: "assigning response carried no operation id".to_string(),
                        body: Some(Box::new(body)),
                        result,
                    };
                    return self.enter_response_error(error, actions);
                };

                let delay = polling_interval.unwrap_or(self.config.default_polling_interval);
                actions.push(RegistrationAction::NotifyStatus(body));
                self.enter_waiting_to_poll(request, operation_id, delay, actions);
            },

            RegistrationStatus::Failed => {
                let error =
                    RegistrationError::DeviceRegistrationFailed { body: Box::new(body), result };
                self.enter_response_error(error, actions);
            },

            RegistrationStatus::Unrecognized(status) => {
                let reason = match status {
                    Some(status) => format!("status is {status}"),
                    None => "status is missing".to_string(),
                };
                let error =
                    RegistrationError::ProtocolFormat { reason, body: Some(Box::new(body)), result };
                self.enter_response_error(error, actions);
            },
        }
    }

    fn enter_response_complete(
        &mut self,
        body: RegistrationBody,
        result: Option<ProtocolResult>,
        actions: &mut Vec<RegistrationAction>,
    ) {
        tracing::debug!(state = %RegistrationState::ResponseComplete, "registration transition");

        let call = self.active.take().map(|op| op.call);
        actions.push(RegistrationAction::NotifyStatus(body.clone()));
        self.enter_idle(call, RegistrationOutcome { body, result }, actions);
    }

    fn enter_response_error(
        &mut self,
        error: RegistrationError,
        actions: &mut Vec<RegistrationAction>,
    ) {
        tracing::debug!(
            state = %RegistrationState::ResponseError,
            %error,
            "registration transition"
        );

        let call = self.active.take().map(|op| op.call);
        self.enter_ending_session(Teardown { error: Some(error), call }, actions);
    }

    fn enter_idle(
        &mut self,
        call: Option<CallId>,
        outcome: RegistrationOutcome,
        actions: &mut Vec<RegistrationAction>,
    ) {
        self.set_phase(Phase::Idle);

        if let Some(call) = call {
            actions.push(RegistrationAction::Resolve {
                call,
                outcome: CallOutcome::Registered(outcome),
            });
        }
    }

    fn enter_waiting_to_poll(
        &mut self,
        request: RegistrationRequest,
        operation_id: String,
        delay: Duration,
        actions: &mut Vec<RegistrationAction>,
    ) {
        let timer = self.mint_timer();
        self.set_phase(Phase::WaitingToPoll { request, operation_id, timer });

        actions.push(RegistrationAction::StartPollTimer { timer, delay });
    }

    fn enter_polling(
        &mut self,
        request: RegistrationRequest,
        operation_id: String,
        actions: &mut Vec<RegistrationAction>,
    ) {
        let Some(token) = self.active_token() else {
            // Unreachable while the token invariant holds; fall back to a
            // clean teardown rather than polling without an owner.
            tracing::warn!(%operation_id, "poll timer fired without a live operation");
            return self.enter_ending_session(Teardown { error: None, call: None }, actions);
        };

        self.set_phase(Phase::Polling { request: request.clone() });

        actions.push(RegistrationAction::QueryOperationStatus { token, request, operation_id });
    }

    /// Fail any live attempt with a cancellation, then tear down the
    /// transport session.
    fn enter_ending_session(&mut self, teardown: Teardown, actions: &mut Vec<RegistrationAction>) {
        if let Some(op) = self.active.take() {
            tracing::debug!(token = %op.token, call = %op.call, "cancelling in-flight attempt");
            actions.push(RegistrationAction::Resolve {
                call: op.call,
                outcome: CallOutcome::Failed(RegistrationError::OperationCancelled),
            });
        }

        self.set_phase(Phase::EndingSession { teardown });
        actions.push(RegistrationAction::EndTransportSession);
    }

    fn on_session_ended(
        &mut self,
        teardown: Teardown,
        error: Option<TransportError>,
        actions: &mut Vec<RegistrationAction>,
    ) {
        if let Some(err) = &error {
            tracing::warn!(%err, carried = ?teardown.error, "transport end-session failed");
        }

        let error = teardown.error.or_else(|| error.map(RegistrationError::Disconnect));
        self.enter_disconnected(teardown.call, error, actions);

        let deferred = std::mem::take(&mut self.deferred);
        for event in deferred {
            self.dispatch(event, actions);
        }
    }

    fn enter_disconnected(
        &mut self,
        call: Option<CallId>,
        error: Option<RegistrationError>,
        actions: &mut Vec<RegistrationAction>,
    ) {
        self.active = None;
        self.set_phase(Phase::Disconnected);

        if let Some(call) = call {
            let outcome = error.map_or(CallOutcome::Disconnected, CallOutcome::Failed);
            actions.push(RegistrationAction::Resolve { call, outcome });
        }
    }
}

impl Default for RegistrationMachine {
    fn default() -> Self {
        Self::new(RegistrationConfig::default())
    }
}

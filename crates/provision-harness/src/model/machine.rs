//! Reference registration machine.
//!
//! Tracks only what a caller can observe: the resting state, who is owed a
//! resolution, and how every call was resolved. No tokens, no timers, no
//! request data. Stale completions are simply ignored because the model
//! never issues them.

use provision_core::RegistrationState;

use super::operation::{ModelReply, Operation, Resolution};

/// Caller event held back while a session is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredCall {
    Register(u64),
    EndSession(u64),
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Current state.
    pub state: RegistrationState,
    /// Resolutions in the order they were produced: `(call, resolution)`.
    pub resolutions: Vec<(u64, Resolution)>,
    /// `operationStatus` notifications published.
    pub notifications: usize,
    /// Registration requests issued.
    pub requests: usize,
    /// Status queries issued.
    pub queries: usize,
    /// End-session calls issued.
    pub end_sessions: usize,
}

/// Reference model of the registration machine.
#[derive(Debug, Clone)]
pub struct ModelMachine {
    state: RegistrationState,
    /// Call waiting on the live attempt.
    active: Option<u64>,
    /// While ending: the carried error and the call owed a resolution.
    teardown: Option<(Option<Resolution>, Option<u64>)>,
    deferred: Vec<DeferredCall>,
    next_call: u64,
    observed: ObservableState,
}

impl Default for ModelMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelMachine {
    /// Create a model in `Disconnected`.
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Disconnected,
            active: None,
            teardown: None,
            deferred: Vec::new(),
            next_call: 1,
            observed: ObservableState {
                state: RegistrationState::Disconnected,
                resolutions: Vec::new(),
                notifications: 0,
                requests: 0,
                queries: 0,
                end_sessions: 0,
            },
        }
    }

    /// Current state.
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Observable state after the operations applied so far.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState { state: self.state, ..self.observed.clone() }
    }

    /// Apply an operation.
    ///
    /// Caller calls are numbered from 1 in the order they are applied.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Register => {
                let call = self.mint_call();
                self.register(call);
            },
            Operation::EndSession => {
                let call = self.mint_call();
                self.end_session(call);
            },
            Operation::Respond { reply } => {
                if matches!(
                    self.state,
                    RegistrationState::SendingRegistrationRequest | RegistrationState::Polling
                ) {
                    self.respond(*reply);
                }
            },
            Operation::FireTimer => {
                if self.state == RegistrationState::WaitingToPoll {
                    self.state = RegistrationState::Polling;
                    self.observed.queries += 1;
                }
            },
            Operation::SessionEnded { fails } => {
                if self.state == RegistrationState::EndingSession {
                    self.session_ended(*fails);
                }
            },
            Operation::RespondStale { .. } | Operation::FireStaleTimer => {},
        }
    }

    fn mint_call(&mut self) -> u64 {
        let call = self.next_call;
        self.next_call += 1;
        call
    }

    fn resolve(&mut self, call: u64, resolution: Resolution) {
        self.observed.resolutions.push((call, resolution));
    }

    fn register(&mut self, call: u64) {
        match self.state {
            RegistrationState::Disconnected | RegistrationState::Idle => {
                self.state = RegistrationState::SendingRegistrationRequest;
                self.active = Some(call);
                self.observed.requests += 1;
            },
            RegistrationState::EndingSession => self.deferred.push(DeferredCall::Register(call)),
            _ => self.resolve(call, Resolution::InvalidOperation),
        }
    }

    fn end_session(&mut self, call: u64) {
        match self.state {
            RegistrationState::Disconnected => self.resolve(call, Resolution::Disconnected),
            RegistrationState::EndingSession => self.deferred.push(DeferredCall::EndSession(call)),
            _ => self.begin_ending(None, Some(call)),
        }
    }

    fn begin_ending(&mut self, error: Option<Resolution>, call: Option<u64>) {
        if let Some(active) = self.active.take() {
            self.resolve(active, Resolution::OperationCancelled);
        }
        self.state = RegistrationState::EndingSession;
        self.teardown = Some((error, call));
        self.observed.end_sessions += 1;
    }

    fn fail(&mut self, error: Resolution) {
        let call = self.active.take();
        self.begin_ending(Some(error), call);
    }

    fn respond(&mut self, reply: ModelReply) {
        match reply {
            ModelReply::Assigned => {
                self.observed.notifications += 1;
                self.state = RegistrationState::Idle;
                if let Some(call) = self.active.take() {
                    self.resolve(call, Resolution::Registered);
                }
            },
            ModelReply::Assigning { .. } => {
                self.observed.notifications += 1;
                self.state = RegistrationState::WaitingToPoll;
            },
            ModelReply::Failed => self.fail(Resolution::DeviceRegistrationFailed),
            ModelReply::AssigningWithoutOperationId
            | ModelReply::Unrecognized
            | ModelReply::MissingStatus
            | ModelReply::MissingBody => self.fail(Resolution::ProtocolFormat),
            ModelReply::TransportFailure => self.fail(Resolution::Transport),
        }
    }

    fn session_ended(&mut self, fails: bool) {
        let (error, call) = self.teardown.take().unwrap_or((None, None));
        self.state = RegistrationState::Disconnected;
        self.active = None;

        if let Some(call) = call {
            let resolution = error
                .or(fails.then_some(Resolution::Disconnect))
                .unwrap_or(Resolution::Disconnected);
            self.resolve(call, resolution);
        }

        for deferred in std::mem::take(&mut self.deferred) {
            match deferred {
                DeferredCall::Register(call) => self.register(call),
                DeferredCall::EndSession(call) => self.end_session(call),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polls_then_completes() {
        let mut model = ModelMachine::new();
        model.apply(&Operation::Register);
        model.apply(&Operation::Respond { reply: ModelReply::Assigning { with_interval: true } });
        model.apply(&Operation::FireTimer);
        model.apply(&Operation::Respond { reply: ModelReply::Assigned });

        let state = model.observable_state();
        assert_eq!(state.state, RegistrationState::Idle);
        assert_eq!(state.resolutions, vec![(1, Resolution::Registered)]);
        assert_eq!(state.notifications, 2);
        assert_eq!(state.queries, 1);
    }

    #[test]
    fn failure_resolves_after_session_ends() {
        let mut model = ModelMachine::new();
        model.apply(&Operation::Register);
        model.apply(&Operation::Respond { reply: ModelReply::Failed });
        assert!(model.observable_state().resolutions.is_empty());

        model.apply(&Operation::SessionEnded { fails: true });
        let state = model.observable_state();
        assert_eq!(state.state, RegistrationState::Disconnected);
        assert_eq!(state.resolutions, vec![(1, Resolution::DeviceRegistrationFailed)]);
    }

    #[test]
    fn deferred_register_runs_after_disconnect() {
        let mut model = ModelMachine::new();
        model.apply(&Operation::Register);
        model.apply(&Operation::EndSession);
        model.apply(&Operation::Register);
        model.apply(&Operation::SessionEnded { fails: false });

        let state = model.observable_state();
        assert_eq!(state.state, RegistrationState::SendingRegistrationRequest);
        assert_eq!(
            state.resolutions,
            vec![(1, Resolution::OperationCancelled), (2, Resolution::Disconnected)]
        );
        assert_eq!(state.requests, 2);
    }
}

//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! registration machine behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!     ModelMachine    RealMachine      Compare
//!      (reference)  (RegistrationMachine) observable state
//! ```

use std::collections::HashMap;

use provision_core::{
    CallId, OperationToken, RegistrationAction, RegistrationEvent, RegistrationMachine,
    RegistrationState, TimerId,
};
use provision_harness::{ModelMachine, ModelReply, ObservableState, Operation, Resolution};
use provision_proto::{RegistrationRequest, RequestBody, TransportError};
use proptest::prelude::*;

/// Which transport call the live token was issued for.
#[derive(Debug, Clone, Copy)]
enum Issued {
    Registration(OperationToken),
    Query(OperationToken),
}

/// Real machine wrapper that mirrors ModelMachine's interface.
struct RealMachine {
    machine: RegistrationMachine,
    next_call: u64,
    last_issued: Option<Issued>,
    last_timer: Option<TimerId>,
    observed: ObservableState,
    resolved: HashMap<CallId, usize>,
}

impl RealMachine {
    fn new() -> Self {
        Self {
            machine: RegistrationMachine::default(),
            next_call: 1,
            last_issued: None,
            last_timer: None,
            observed: ObservableState {
                state: RegistrationState::Disconnected,
                resolutions: Vec::new(),
                notifications: 0,
                requests: 0,
                queries: 0,
                end_sessions: 0,
            },
            resolved: HashMap::new(),
        }
    }

    fn mint_call(&mut self) -> CallId {
        let call = CallId(self.next_call);
        self.next_call += 1;
        call
    }

    fn apply(&mut self, op: &Operation) {
        let event = match op {
            Operation::Register => RegistrationEvent::Register {
                call: self.mint_call(),
                request: RegistrationRequest::new("device", "scope"),
                body: RequestBody::new("device"),
            },
            Operation::EndSession => RegistrationEvent::EndSession { call: self.mint_call() },
            Operation::Respond { reply } => match self.last_issued {
                Some(Issued::Registration(token)) => {
                    RegistrationEvent::RegistrationResponse { token, envelope: reply.to_envelope() }
                },
                Some(Issued::Query(token)) => RegistrationEvent::OperationStatusResponse {
                    token,
                    envelope: reply.to_envelope(),
                },
                None => return,
            },
            Operation::RespondStale { reply } => RegistrationEvent::RegistrationResponse {
                token: OperationToken::from_raw(0),
                envelope: reply.to_envelope(),
            },
            Operation::FireTimer => match self.last_timer {
                Some(timer) => RegistrationEvent::PollTimerElapsed { timer },
                None => return,
            },
            Operation::FireStaleTimer => {
                RegistrationEvent::PollTimerElapsed { timer: TimerId::from_raw(0) }
            },
            Operation::SessionEnded { fails } => RegistrationEvent::SessionEnded {
                error: fails.then(|| TransportError::network("reset")),
            },
        };

        for action in self.machine.handle(event) {
            self.record(action);
        }
    }

    fn record(&mut self, action: RegistrationAction) {
        match action {
            RegistrationAction::SendRegistrationRequest { token, .. } => {
                self.last_issued = Some(Issued::Registration(token));
                self.observed.requests += 1;
            },
            RegistrationAction::QueryOperationStatus { token, .. } => {
                self.last_issued = Some(Issued::Query(token));
                self.observed.queries += 1;
            },
            RegistrationAction::StartPollTimer { timer, .. } => self.last_timer = Some(timer),
            RegistrationAction::CancelPollTimer { .. } => {},
            RegistrationAction::EndTransportSession => self.observed.end_sessions += 1,
            RegistrationAction::NotifyStatus(_) => self.observed.notifications += 1,
            RegistrationAction::Resolve { call, outcome } => {
                *self.resolved.entry(call).or_default() += 1;
                self.observed.resolutions.push((call.0, Resolution::from(&outcome)));
            },
        }
    }

    fn observable_state(&self) -> ObservableState {
        ObservableState { state: self.machine.state(), ..self.observed.clone() }
    }
}

/// Strategy for generating replies, weighted towards the happy path.
fn reply_strategy() -> impl Strategy<Value = ModelReply> {
    prop_oneof![
        4 => any::<bool>().prop_map(|with_interval| ModelReply::Assigning { with_interval }),
        3 => Just(ModelReply::Assigned),
        1 => Just(ModelReply::AssigningWithoutOperationId),
        1 => Just(ModelReply::Failed),
        1 => Just(ModelReply::Unrecognized),
        1 => Just(ModelReply::MissingStatus),
        1 => Just(ModelReply::MissingBody),
        1 => Just(ModelReply::TransportFailure),
    ]
}

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => Just(Operation::Register),
        2 => Just(Operation::EndSession),
        5 => reply_strategy().prop_map(|reply| Operation::Respond { reply }),
        1 => reply_strategy().prop_map(|reply| Operation::RespondStale { reply }),
        3 => Just(Operation::FireTimer),
        1 => Just(Operation::FireStaleTimer),
        2 => any::<bool>().prop_map(|fails| Operation::SessionEnded { fails }),
    ]
}

proptest! {
    /// Verify that the real machine's observable state matches the model
    /// after every operation.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(), 0..80)) {
        let mut model = ModelMachine::new();
        let mut real = RealMachine::new();

        for (i, op) in ops.iter().enumerate() {
            model.apply(op);
            real.apply(op);

            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "Divergence at operation {}: {:?}",
                i,
                op
            );
        }
    }

    /// Verify machine invariants hold after every operation.
    #[test]
    fn prop_machine_invariants(ops in prop::collection::vec(operation_strategy(), 0..120)) {
        let mut real = RealMachine::new();

        for op in &ops {
            real.apply(op);
            let state = real.machine.state();

            // Invariant: a live token exists exactly while an attempt is in flight
            prop_assert_eq!(real.machine.active_token().is_some(), state.is_in_progress());

            // Invariant: only resting and waiting states are observable
            prop_assert!(!matches!(
                state,
                RegistrationState::ResponseReceived
                    | RegistrationState::ResponseComplete
                    | RegistrationState::ResponseError
            ));

            // Invariant: caller events are only held back while ending
            if state != RegistrationState::EndingSession {
                prop_assert_eq!(real.machine.deferred_len(), 0);
            }

            // Invariant: nobody is owed a resolution while disconnected or idle
            if matches!(state, RegistrationState::Disconnected | RegistrationState::Idle) {
                prop_assert!(real.machine.pending_call().is_none());
            }
        }

        // Invariant: every call is resolved at most once
        for (call, count) in &real.resolved {
            prop_assert_eq!(*count, 1, "{} resolved {} times", call, count);
        }
    }

    /// Verify that once the session has ended and no caller events are
    /// pending, every call issued so far has been resolved.
    #[test]
    fn prop_disconnect_resolves_everything(
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut model = ModelMachine::new();
        let mut calls = 0u64;

        for op in &ops {
            model.apply(op);
            if matches!(op, Operation::Register | Operation::EndSession) {
                calls += 1;
            }
        }

        // Each round replays at least one deferred register/end-session pair.
        for _ in 0..=ops.len() + 1 {
            if model.state() == RegistrationState::Disconnected {
                break;
            }
            model.apply(&Operation::EndSession);
            calls += 1;
            model.apply(&Operation::SessionEnded { fails: false });
        }

        let state = model.observable_state();
        prop_assert_eq!(state.state, RegistrationState::Disconnected);
        prop_assert_eq!(state.resolutions.len() as u64, calls);
    }
}

#[cfg(test)]
mod smoke_tests {
    use super::*;

    /// Stale completions and timers never move the machine.
    #[test]
    fn stale_inputs_are_ignored() {
        let mut model = ModelMachine::new();
        let mut real = RealMachine::new();
        let ops = [
            Operation::Register,
            Operation::RespondStale { reply: ModelReply::Assigned },
            Operation::Respond { reply: ModelReply::Assigning { with_interval: false } },
            Operation::FireStaleTimer,
        ];

        for op in &ops {
            model.apply(op);
            real.apply(op);
        }

        assert_eq!(model.state(), RegistrationState::WaitingToPoll);
        assert_eq!(model.observable_state(), real.observable_state());
    }

    /// Cancelling while a request is in flight discards its late answer.
    #[test]
    fn late_answer_after_cancel_is_discarded() {
        let mut real = RealMachine::new();
        real.apply(&Operation::Register);
        real.apply(&Operation::EndSession);
        real.apply(&Operation::Respond { reply: ModelReply::Assigned });

        let state = real.observable_state();
        assert_eq!(state.state, RegistrationState::EndingSession);
        assert_eq!(state.notifications, 0);
        assert_eq!(state.resolutions, vec![(1, Resolution::OperationCancelled)]);
    }
}

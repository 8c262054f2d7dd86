//! Fuzz target for [`RegistrationMachine`]
//!
//! Prevent a stale or malformed completion from completing, failing or
//! polling the wrong attempt.
//!
//! # Strategy
//!
//! - Event sequences: Arbitrary interleavings of caller calls, completions,
//!   timer elapses and session teardown
//! - Token probing: Completions tagged with the live token, a recent token,
//!   or garbage
//! - Body probing: Arbitrary status strings, missing bodies, missing
//!   operation ids, transport errors
//!
//! # Invariants
//!
//! - A live token exists exactly while an attempt is in flight
//! - Every call is resolved at most once
//! - Transient states are never observable between events
//! - Caller events are only deferred while the session is ending
//! - `NotifyStatus` is only published for `assigning` and `assigned`
//! - A `Registered` resolution always leaves the machine `Idle`
//! - NEVER panic on any input

#![no_main]

use std::{collections::HashSet, time::Duration};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use provision_core::{
    CallId, CallOutcome, OperationToken, RegistrationAction, RegistrationEvent,
    RegistrationMachine, RegistrationState, TimerId,
};
use provision_proto::{
    RegistrationBody, RegistrationRequest, RegistrationStatus, RequestBody, ResponseEnvelope,
    TransportError,
};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Register,
    EndSession,
    RegistrationResponse { token: FuzzToken, response: FuzzedResponse },
    StatusResponse { token: FuzzToken, response: FuzzedResponse },
    TimerElapsed { timer: FuzzToken },
    SessionEnded { fails: bool },
}

/// Which id a completion carries.
#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzToken {
    /// Most recently issued.
    Latest,
    /// Issued `n` before the latest.
    Back(u8),
    /// Arbitrary raw value.
    Raw(u64),
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzedResponse {
    Body {
        status: Option<String>,
        operation_id: Option<String>,
        polling_interval_ms: Option<u16>,
    },
    MissingBody,
    TransportError,
}

impl FuzzedResponse {
    fn into_envelope(self) -> ResponseEnvelope {
        match self {
            Self::Body { status, operation_id, polling_interval_ms } => {
                let body = RegistrationBody { operation_id, status, registration_state: None };
                ResponseEnvelope {
                    polling_interval: polling_interval_ms
                        .map(|ms| Duration::from_millis(u64::from(ms))),
                    ..ResponseEnvelope::ok(body)
                }
            },
            Self::MissingBody => ResponseEnvelope::default(),
            Self::TransportError => ResponseEnvelope::failed(TransportError::network("fuzzed")),
        }
    }
}

fn pick(issued: &[u64], token: FuzzToken) -> u64 {
    match token {
        FuzzToken::Latest => issued.last().copied().unwrap_or(0),
        FuzzToken::Back(n) => {
            issued.len().checked_sub(usize::from(n) + 2).map_or(0, |i| issued[i])
        },
        FuzzToken::Raw(raw) => raw,
    }
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let mut machine = RegistrationMachine::default();
    let mut next_call = 1u64;
    let mut tokens: Vec<u64> = Vec::new();
    let mut timers: Vec<u64> = Vec::new();
    let mut resolved: HashSet<CallId> = HashSet::new();

    for event in events {
        let event = match event {
            FuzzEvent::Register => {
                let call = CallId(next_call);
                next_call += 1;
                RegistrationEvent::Register {
                    call,
                    request: RegistrationRequest::new("fuzz", "scope"),
                    body: RequestBody::new("fuzz"),
                }
            },
            FuzzEvent::EndSession => {
                let call = CallId(next_call);
                next_call += 1;
                RegistrationEvent::EndSession { call }
            },
            FuzzEvent::RegistrationResponse { token, response } => {
                RegistrationEvent::RegistrationResponse {
                    token: OperationToken::from_raw(pick(&tokens, token)),
                    envelope: response.into_envelope(),
                }
            },
            FuzzEvent::StatusResponse { token, response } => {
                RegistrationEvent::OperationStatusResponse {
                    token: OperationToken::from_raw(pick(&tokens, token)),
                    envelope: response.into_envelope(),
                }
            },
            FuzzEvent::TimerElapsed { timer } => RegistrationEvent::PollTimerElapsed {
                timer: TimerId::from_raw(pick(&timers, timer)),
            },
            FuzzEvent::SessionEnded { fails } => RegistrationEvent::SessionEnded {
                error: fails.then(|| TransportError::network("fuzzed")),
            },
        };

        let actions = machine.handle(event);
        let state = machine.state();

        for action in actions {
            match action {
                RegistrationAction::SendRegistrationRequest { token, .. }
                | RegistrationAction::QueryOperationStatus { token, .. } => {
                    tokens.push(token.as_u64());
                },
                RegistrationAction::StartPollTimer { timer, .. } => timers.push(timer.as_u64()),
                RegistrationAction::NotifyStatus(body) => {
                    assert!(
                        matches!(
                            body.classify(),
                            RegistrationStatus::Assigning | RegistrationStatus::Assigned
                        ),
                        "notified non-progress status {:?}",
                        body.status
                    );
                },
                RegistrationAction::Resolve { call, outcome } => {
                    assert!(resolved.insert(call), "{call} resolved twice");
                    if matches!(outcome, CallOutcome::Registered(_)) {
                        assert_eq!(state, RegistrationState::Idle);
                    }
                },
                RegistrationAction::CancelPollTimer { .. } | RegistrationAction::EndTransportSession => {},
            }
        }

        assert_eq!(machine.active_token().is_some(), state.is_in_progress());
        assert!(!matches!(
            state,
            RegistrationState::ResponseReceived
                | RegistrationState::ResponseComplete
                | RegistrationState::ResponseError
        ));
        if state != RegistrationState::EndingSession {
            assert_eq!(machine.deferred_len(), 0);
        }
    }
});

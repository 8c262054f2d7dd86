//! Registration client.
//!
//! `RegistrationClient` is the caller-facing handle. It owns a driver task
//! that owns the [`RegistrationMachine`]; every input to the machine (caller
//! commands, transport completions, timer elapses) is funnelled through that
//! one task, so transitions are applied strictly one at a time in arrival
//! order.
//!
//! ```text
//!  register / end_session           transport + timer tasks
//!           │ mpsc (bounded)                 │ mpsc (completions)
//!           ▼                                ▼
//!  ┌──────────────────────────────────────────────────┐
//!  │ Driver: machine.handle(event) → execute actions   │
//!  └───────┬──────────────┬──────────────┬────────────┘
//!          │ spawn        │ broadcast    │ oneshot
//!          ▼              ▼              ▼
//!      Transport    StatusNotification  caller reply
//! ```

use std::{collections::HashMap, sync::Arc, time::Instant};

use provision_core::{
    CallId, CallOutcome, RegistrationAction, RegistrationConfig, RegistrationError,
    RegistrationEvent, RegistrationMachine, RegistrationOutcome, RegistrationState,
    env::Environment,
};
use provision_proto::{RegistrationBody, RegistrationRequest, RequestBody};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{error::ClientError, scheduler::PollScheduler, transport::Transport};

/// Client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Registration machine configuration.
    pub machine: RegistrationConfig,
    /// Capacity of the caller command queue.
    pub command_capacity: usize,
    /// Capacity of the status notification channel. Slow subscribers lag
    /// rather than block the driver.
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { machine: RegistrationConfig::default(), command_capacity: 16, notification_capacity: 64 }
    }
}

/// `operationStatus` notification.
///
/// Published for every `assigning` response and for the final `assigned`
/// response, always before the `register` call it belongs to resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusNotification {
    /// Response body that reported the status.
    pub body: RegistrationBody,
}

type RegisterReply = oneshot::Sender<Result<RegistrationOutcome, RegistrationError>>;
type EndSessionReply = oneshot::Sender<Result<(), RegistrationError>>;

enum Command {
    Register { request: RegistrationRequest, body: RequestBody, reply: RegisterReply },
    EndSession { reply: EndSessionReply },
}

/// Where a call's resolution goes.
enum Reply {
    Register(RegisterReply),
    EndSession(EndSessionReply),
    /// Internal end-session issued on shutdown; nobody is waiting.
    Detached,
}

/// Caller-facing registration client.
///
/// Must be created inside a tokio runtime. Dropping every reference to the
/// client ends any live session before the driver task exits.
pub struct RegistrationClient {
    commands: mpsc::Sender<Command>,
    notifications: broadcast::Sender<StatusNotification>,
    state: watch::Receiver<RegistrationState>,
    task: JoinHandle<()>,
}

impl RegistrationClient {
    /// Spawn the driver task and return its handle.
    pub fn spawn<T: Transport, E: Environment>(transport: T, env: E, config: ClientConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(RegistrationState::Disconnected);

        let driver = Driver {
            machine: RegistrationMachine::new(config.machine),
            transport: Arc::new(transport),
            scheduler: PollScheduler::new(env.clone()),
            env,
            commands: commands_rx,
            completions_tx,
            completions: completions_rx,
            replies: HashMap::new(),
            notifications: notifications.clone(),
            state: state_tx,
            next_call: 1,
            attempt_started: None,
            closing: false,
        };

        let task = tokio::spawn(driver.run());

        Self { commands: commands_tx, notifications, state: state_rx, task }
    }

    /// Register and wait for the terminal outcome of the full
    /// register/poll/complete cycle.
    ///
    /// Fails immediately with `InvalidOperation` if another attempt is in
    /// flight, and with `OperationCancelled` if `end_session` cancels this
    /// one.
    pub async fn register(
        &self,
        request: RegistrationRequest,
        body: RequestBody,
    ) -> Result<RegistrationOutcome, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Register { request, body, reply })
            .await
            .map_err(|_| ClientError::DriverStopped)?;

        let result = response.await.map_err(|_| ClientError::DriverStopped)?;
        Ok(result?)
    }

    /// End the session, cancelling any in-flight attempt first.
    ///
    /// Resolves once the transport's end-session call has completed, or
    /// immediately if already disconnected.
    pub async fn end_session(&self) -> Result<(), ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::EndSession { reply })
            .await
            .map_err(|_| ClientError::DriverStopped)?;

        let result = response.await.map_err(|_| ClientError::DriverStopped)?;
        Ok(result?)
    }

    /// Subscribe to `operationStatus` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusNotification> {
        self.notifications.subscribe()
    }

    /// Last state the machine settled in.
    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// Watch the machine's state.
    pub fn watch_state(&self) -> watch::Receiver<RegistrationState> {
        self.state.clone()
    }

    /// Close the command queue, let the driver end any live session, and
    /// wait for it to exit.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        let Self { commands, task, .. } = self;
        drop(commands);
        task.await.map_err(|_| ClientError::DriverStopped)
    }
}

/// Single-consumer owner of the registration machine.
struct Driver<T: Transport, E: Environment> {
    machine: RegistrationMachine,
    transport: Arc<T>,
    scheduler: PollScheduler<E>,
    env: E,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<RegistrationEvent>,
    completions: mpsc::UnboundedReceiver<RegistrationEvent>,
    replies: HashMap<CallId, Reply>,
    notifications: broadcast::Sender<StatusNotification>,
    state: watch::Sender<RegistrationState>,
    next_call: u64,
    attempt_started: Option<Instant>,
    closing: bool,
}

impl<T: Transport, E: Environment> Driver<T, E> {
    async fn run(mut self) {
        tracing::debug!("registration driver started");

        loop {
            if self.closing && self.machine.state() == RegistrationState::Disconnected {
                break;
            }

            tokio::select! {
                command = self.commands.recv(), if !self.closing => match command {
                    Some(command) => self.on_command(command),
                    None => self.begin_shutdown(),
                },
                Some(event) = self.completions.recv() => self.apply(event),
            }
        }

        tracing::debug!("registration driver stopped");
    }

    fn mint_call(&mut self) -> CallId {
        let call = CallId(self.next_call);
        self.next_call += 1;
        call
    }

    fn on_command(&mut self, command: Command) {
        let call = self.mint_call();

        match command {
            Command::Register { request, body, reply } => {
                tracing::debug!(%call, registration_id = %request.registration_id, "register");
                self.replies.insert(call, Reply::Register(reply));
                self.apply(RegistrationEvent::Register { call, request, body });
            },
            Command::EndSession { reply } => {
                tracing::debug!(%call, "end session");
                self.replies.insert(call, Reply::EndSession(reply));
                self.apply(RegistrationEvent::EndSession { call });
            },
        }
    }

    /// Every handle is gone: end the session through the normal path with
    /// nobody attached to the result.
    fn begin_shutdown(&mut self) {
        self.closing = true;

        if self.machine.state() != RegistrationState::Disconnected {
            tracing::debug!(state = %self.machine.state(), "client dropped, ending session");
            let call = self.mint_call();
            self.replies.insert(call, Reply::Detached);
            self.apply(RegistrationEvent::EndSession { call });
        }
    }

    fn apply(&mut self, event: RegistrationEvent) {
        if let RegistrationEvent::PollTimerElapsed { timer } = &event {
            self.scheduler.complete(*timer);
        }

        for action in self.machine.handle(event) {
            self.execute(action);
        }

        self.state.send_replace(self.machine.state());
    }

    fn execute(&mut self, action: RegistrationAction) {
        match action {
            RegistrationAction::SendRegistrationRequest { token, request, body } => {
                tracing::debug!(%token, host = ?request.provisioning_host, "sending registration request");
                self.attempt_started = Some(self.env.now());
                let transport = Arc::clone(&self.transport);
                let completions = self.completions_tx.clone();

                tokio::spawn(async move {
                    let envelope = transport.registration_request(request, body).await;
                    tracing::debug!(%token, failed = envelope.error.is_some(), "registration response");
                    let _ = completions
                        .send(RegistrationEvent::RegistrationResponse { token, envelope });
                });
            },

            RegistrationAction::QueryOperationStatus { token, request, operation_id } => {
                tracing::debug!(%token, %operation_id, "querying operation status");
                let transport = Arc::clone(&self.transport);
                let completions = self.completions_tx.clone();

                tokio::spawn(async move {
                    let envelope = transport.query_operation_status(request, operation_id).await;
                    tracing::debug!(%token, failed = envelope.error.is_some(), "status response");
                    let _ = completions
                        .send(RegistrationEvent::OperationStatusResponse { token, envelope });
                });
            },

            RegistrationAction::StartPollTimer { timer, delay } => {
                self.scheduler.start(timer, delay, self.completions_tx.clone());
            },

            RegistrationAction::CancelPollTimer { timer } => {
                self.scheduler.cancel(timer);
            },

            RegistrationAction::EndTransportSession => {
                let transport = Arc::clone(&self.transport);
                let completions = self.completions_tx.clone();

                tokio::spawn(async move {
                    let error = transport.end_session().await.err();
                    let _ = completions.send(RegistrationEvent::SessionEnded { error });
                });
            },

            RegistrationAction::NotifyStatus(body) => {
                if self.notifications.send(StatusNotification { body }).is_err() {
                    tracing::trace!("no status subscribers");
                }
            },

            RegistrationAction::Resolve { call, outcome } => self.resolve(call, outcome),
        }
    }

    fn resolve(&mut self, call: CallId, outcome: CallOutcome) {
        if let CallOutcome::Registered(registered) = &outcome {
            let elapsed = self.attempt_started.take().map(|t| self.env.elapsed_since(t));
            tracing::info!(
                %call,
                ?elapsed,
                assigned_hub = ?registered
                    .body
                    .registration_state
                    .as_ref()
                    .and_then(|s| s.assigned_hub.as_deref()),
                "registration complete"
            );
        }

        let Some(reply) = self.replies.remove(&call) else {
            tracing::warn!(%call, "resolution for unknown call");
            return;
        };

        // A dropped receiver means the caller stopped waiting; nothing to do.
        match (reply, outcome) {
            (Reply::Register(tx), CallOutcome::Registered(registered)) => {
                let _ = tx.send(Ok(registered));
            },
            (Reply::Register(tx), CallOutcome::Failed(err)) => {
                let _ = tx.send(Err(err));
            },
            (Reply::Register(tx), CallOutcome::Disconnected) => {
                let _ = tx.send(Err(RegistrationError::OperationCancelled));
            },
            (Reply::EndSession(tx), CallOutcome::Failed(err)) => {
                let _ = tx.send(Err(err));
            },
            (Reply::EndSession(tx), CallOutcome::Disconnected | CallOutcome::Registered(_)) => {
                let _ = tx.send(Ok(()));
            },
            (Reply::Detached, outcome) => {
                tracing::debug!(%call, ?outcome, "detached call resolved");
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use provision_proto::{ResponseEnvelope, TransportError};

    use super::*;
    use crate::SystemEnv;

    /// Answers every call from a fixed script.
    #[derive(Default)]
    struct FixedTransport {
        responses: Mutex<Vec<ResponseEnvelope>>,
    }

    impl FixedTransport {
        fn new(mut responses: Vec<ResponseEnvelope>) -> Self {
            responses.reverse();
            Self { responses: Mutex::new(responses) }
        }

        fn next(&self) -> ResponseEnvelope {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| ResponseEnvelope::failed(TransportError::network("script exhausted")))
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn registration_request(
            &self,
            _request: RegistrationRequest,
            _body: RequestBody,
        ) -> ResponseEnvelope {
            self.next()
        }

        async fn query_operation_status(
            &self,
            _request: RegistrationRequest,
            _operation_id: String,
        ) -> ResponseEnvelope {
            self.next()
        }

        async fn end_session(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn request() -> (RegistrationRequest, RequestBody) {
        (RegistrationRequest::new("device-1", "scope"), RequestBody::new("device-1"))
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.machine.default_polling_interval, Duration::from_secs(2));
        assert!(config.command_capacity > 0);
        assert!(config.notification_capacity > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn register_resolves_after_polling() {
        let transport = FixedTransport::new(vec![
            ResponseEnvelope::ok(RegistrationBody::with_status("assigning").operation_id("op1"))
                .with_polling_interval(Duration::from_millis(100)),
            ResponseEnvelope::ok(RegistrationBody::with_status("assigned").operation_id("op1")),
        ]);
        let client = RegistrationClient::spawn(transport, SystemEnv::new(), ClientConfig::default());
        let mut notifications = client.subscribe();

        let (req, body) = request();
        let outcome = client.register(req, body).await.unwrap();

        assert_eq!(outcome.body.status.as_deref(), Some("assigned"));
        assert_eq!(client.state(), RegistrationState::Idle);
        assert_eq!(notifications.try_recv().unwrap().body.status.as_deref(), Some("assigning"));
        assert_eq!(notifications.try_recv().unwrap().body.status.as_deref(), Some("assigned"));
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_when_disconnected_is_immediate() {
        let client =
            RegistrationClient::spawn(FixedTransport::default(), SystemEnv::new(), ClientConfig::default());

        client.end_session().await.unwrap();
        assert_eq!(client.state(), RegistrationState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_live_session() {
        let transport = FixedTransport::new(vec![ResponseEnvelope::ok(
            RegistrationBody::with_status("assigned"),
        )]);
        let client = RegistrationClient::spawn(transport, SystemEnv::new(), ClientConfig::default());

        let (req, body) = request();
        client.register(req, body).await.unwrap();
        let mut state = client.watch_state();

        client.shutdown().await.unwrap();
        assert_eq!(*state.borrow_and_update(), RegistrationState::Disconnected);
    }
}

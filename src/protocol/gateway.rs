//! Session gateway: accepts control connections and runs one session each.
//!
//! A session reads newline-delimited JSON-RPC messages, gates every request
//! behind the `initialize` handshake and hands commands to the
//! [`CommandDispatcher`]. Responses, notifications and prompts all leave
//! through a single writer task per connection.

use super::dispatcher::{ClientPrompter, CommandDispatcher, SessionContext};
use super::error::GatewayError;
use super::wire::{self, Incoming, RpcError, codes, methods};
use crate::capability::{
    CapabilityRegistry, CapabilitySet, NegotiatedCapabilities, ProtocolVersion,
};
use crate::lifecycle::{
    domain::{LifecycleEvent, ServerHandle, ServerId, ServerTypeRef},
    ports::ProcessLauncher,
};
use crate::server_type::domain::ServerTypeId;
use async_trait::async_trait;
use mockable::Clock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

/// Binds a TCP listener for control sessions.
///
/// # Errors
///
/// Returns [`GatewayError::Bind`] when the address cannot be bound.
pub async fn bind(address: impl ToSocketAddrs + ToString) -> Result<TcpListener, GatewayError> {
    let display = address.to_string();
    TcpListener::bind(address)
        .await
        .map_err(|source| GatewayError::Bind {
            address: display,
            source,
        })
}

/// Accepts control connections and serves them.
pub struct SessionGateway<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    dispatcher: CommandDispatcher<L, C>,
    capabilities: Arc<CapabilityRegistry>,
    accepting: CancellationToken,
    sessions_closing: CancellationToken,
    sessions: TaskTracker,
    next_session: Arc<AtomicU64>,
}

impl<L, C> Clone for SessionGateway<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            capabilities: Arc::clone(&self.capabilities),
            accepting: self.accepting.clone(),
            sessions_closing: self.sessions_closing.clone(),
            sessions: self.sessions.clone(),
            next_session: Arc::clone(&self.next_session),
        }
    }
}

impl<L, C> SessionGateway<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a gateway serving `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: CommandDispatcher<L, C>, capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            dispatcher,
            capabilities,
            accepting: CancellationToken::new(),
            sessions_closing: CancellationToken::new(),
            sessions: TaskTracker::new(),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Accepts connections on `listener` until [`Self::stop_accepting`].
    pub async fn serve(&self, listener: TcpListener) {
        if let Ok(local) = listener.local_addr() {
            info!(address = %local, "control endpoint listening");
        }
        loop {
            let accepted = tokio::select! {
                () = self.accepting.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => self.open_session(stream, peer),
                Err(err) => warn!(error = %err, "failed to accept control connection"),
            }
        }
        info!("control endpoint stopped accepting connections");
    }

    /// Stops accepting new connections. Open sessions keep running.
    pub fn stop_accepting(&self) {
        self.accepting.cancel();
    }

    /// Closes every open session and waits for them to finish.
    pub async fn close_sessions(&self) {
        self.sessions_closing.cancel();
        self.sessions.close();
        self.sessions.wait().await;
    }

    fn open_session(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        info!(session = id, peer = %peer, "control session opened");
        let session = Session::new(
            self.dispatcher.clone(),
            Arc::clone(&self.capabilities),
            self.sessions_closing.child_token(),
        );
        self.sessions.spawn(
            session
                .run(stream)
                .instrument(info_span!("session", id, peer = %peer)),
        );
    }
}

type PendingPrompts = Mutex<HashMap<u64, oneshot::Sender<Option<String>>>>;

/// Sends `promptString` requests to one caller and matches the answers.
struct SessionPrompter {
    outgoing: mpsc::UnboundedSender<String>,
    pending: PendingPrompts,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl SessionPrompter {
    fn new(outgoing: mpsc::UnboundedSender<String>, closed: CancellationToken) -> Self {
        Self {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed,
        }
    }

    fn forget(&self, id: u64) -> Option<oneshot::Sender<Option<String>>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    fn resolve(&self, id: &Value, outcome: Result<Value, RpcError>) {
        let Some(sender) = id.as_u64().and_then(|prompt| self.forget(prompt)) else {
            debug!(id = %id, "response does not match a pending prompt");
            return;
        };
        let answer = match outcome {
            Ok(Value::String(text)) => Some(text),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "caller rejected prompt");
                None
            }
        };
        if sender.send(answer).is_err() {
            debug!(id = %id, "prompt answered after it was abandoned");
        }
    }

    fn drain(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl ClientPrompter for SessionPrompter {
    async fn prompt_string(&self, message: &str, secret: bool) -> Option<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);

        let request = wire::request(
            id,
            methods::PROMPT_STRING,
            json!({"message": message, "secret": secret}),
        );
        if self.outgoing.send(request).is_err() {
            self.forget(id);
            return None;
        }
        tokio::select! {
            () = self.closed.cancelled() => {
                self.forget(id);
                None
            }
            answer = receiver => answer.ok().flatten(),
        }
    }
}

/// State of one control connection.
struct Session<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    dispatcher: CommandDispatcher<L, C>,
    capabilities: Arc<CapabilityRegistry>,
    closed: CancellationToken,
    negotiated: Option<Arc<NegotiatedCapabilities>>,
    events: Option<JoinHandle<()>>,
}

impl<L, C> Session<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    const fn new(
        dispatcher: CommandDispatcher<L, C>,
        capabilities: Arc<CapabilityRegistry>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            capabilities,
            closed,
            negotiated: None,
            events: None,
        }
    }

    async fn run(mut self, stream: TcpStream) {
        let (reader, writer) = stream.into_split();
        let (outgoing, lines_out) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_lines(writer, lines_out));
        let prompter = Arc::new(SessionPrompter::new(outgoing.clone(), self.closed.clone()));

        let mut lines = BufReader::new(reader).lines();
        loop {
            let next = tokio::select! {
                () = self.closed.cancelled() => break,
                next = lines.next_line() => next,
            };
            match next {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => self.on_line(&line, &outgoing, &prompter),
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "control connection read failed");
                    break;
                }
            }
        }

        self.closed.cancel();
        prompter.drain();
        if let Some(events) = self.events.take()
            && let Err(err) = events.await
        {
            debug!(error = %err, "event forwarder ended abnormally");
        }
        drop(prompter);
        drop(outgoing);
        if let Err(err) = writer_task.await {
            debug!(error = %err, "session writer ended abnormally");
        }
        info!("control session closed");
    }

    fn on_line(
        &mut self,
        line: &str,
        outgoing: &mpsc::UnboundedSender<String>,
        prompter: &Arc<SessionPrompter>,
    ) {
        match wire::parse_line(line) {
            Ok(Incoming::Request { id, method, params }) => {
                self.on_request(id, method, params, outgoing, prompter);
            }
            Ok(Incoming::Response { id, outcome }) => prompter.resolve(&id, outcome),
            Ok(Incoming::Notification { method, .. }) => {
                debug!(method, "ignoring caller notification");
            }
            Err(err) => {
                debug!(error = %err, "malformed control message");
                send(outgoing, wire::error_response(&Value::Null, &err));
            }
        }
    }

    fn on_request(
        &mut self,
        id: Value,
        method: String,
        params: Value,
        outgoing: &mpsc::UnboundedSender<String>,
        prompter: &Arc<SessionPrompter>,
    ) {
        if method == methods::INITIALIZE {
            let reply = match self.initialize(params, outgoing) {
                Ok(advertised) => wire::response(&id, json!(advertised)),
                Err(err) => wire::error_response(&id, &err),
            };
            send(outgoing, reply);
            return;
        }
        let Some(negotiated) = &self.negotiated else {
            debug!(method, "request before initialize");
            let error = RpcError::new(codes::SERVER_NOT_INITIALIZED, "Server not initialized");
            send(outgoing, wire::error_response(&id, &error));
            return;
        };

        let prompts: Arc<dyn ClientPrompter> = Arc::<SessionPrompter>::clone(prompter);
        let context = SessionContext::new(Arc::clone(negotiated), prompts);
        let responses = outgoing.clone();
        self.dispatcher
            .spawn(method, params, context, move |outcome| {
                let reply = match outcome {
                    Ok(result) => wire::response(&id, result),
                    Err(err) => wire::error_response(&id, &err),
                };
                send(&responses, reply);
            });
    }

    fn initialize(
        &mut self,
        params: Value,
        outgoing: &mpsc::UnboundedSender<String>,
    ) -> Result<CapabilitySet, RpcError> {
        if self.negotiated.is_some() {
            return Err(RpcError::new(
                codes::INVALID_REQUEST,
                "Session is already initialized",
            ));
        }
        let offered = capability_offer(params)?;
        let negotiated = self
            .capabilities
            .negotiate(offered)
            .map_err(|err| RpcError::new(codes::INVALID_PARAMS, err.to_string()))?;
        info!(
            client_version = %negotiated.client_version(),
            version = %negotiated.effective_version(),
            prompt_string = negotiated.supports_prompt_string(),
            "control session initialized"
        );

        let shared = Arc::new(negotiated);
        self.events = Some(self.forward_events(Arc::clone(&shared), outgoing.clone()));
        self.negotiated = Some(shared);
        Ok(self.capabilities.advertised())
    }

    fn forward_events(
        &self,
        negotiated: Arc<NegotiatedCapabilities>,
        outgoing: mpsc::UnboundedSender<String>,
    ) -> JoinHandle<()> {
        let mut events = self.dispatcher.controller().subscribe();
        let closed = self.closed.clone();
        tokio::spawn(
            async move {
                loop {
                    let received = tokio::select! {
                        () = closed.cancelled() => break,
                        received = events.recv() => received,
                    };
                    match received {
                        Ok(event) => {
                            if let Some(line) = event_notification(&event, &negotiated)
                                && outgoing.send(line).is_err()
                            {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "session fell behind lifecycle events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            .in_current_span(),
        )
    }
}

/// Reads the capability map offered with `initialize`.
///
/// Values that are not strings are kept in their JSON text form, so
/// `"prompt.string": true` reads as `"true"`.
fn capability_offer(params: Value) -> Result<CapabilitySet, RpcError> {
    let payload = match params {
        Value::Array(mut items) if items.len() == 1 => items.pop().unwrap_or(Value::Null),
        other => other,
    };
    match payload {
        Value::Null => Ok(CapabilitySet::new()),
        Value::Object(entries) => Ok(entries
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect()),
        _ => Err(RpcError::new(
            codes::INVALID_PARAMS,
            "initialize expects a capability map",
        )),
    }
}

fn event_notification(event: &LifecycleEvent, negotiated: &NegotiatedCapabilities) -> Option<String> {
    let (method, params) = match event {
        LifecycleEvent::ServerAdded {
            server_id,
            server_type,
        } => (methods::SERVER_ADDED, json!(handle(server_id, server_type))),
        LifecycleEvent::ServerRemoved {
            server_id,
            server_type,
        } => (methods::SERVER_REMOVED, json!(handle(server_id, server_type))),
        LifecycleEvent::StateChanged {
            server_id,
            server_type,
            state,
        } => (
            methods::SERVER_STATE_CHANGED,
            json!({"server": handle(server_id, server_type), "state": state}),
        ),
        LifecycleEvent::ProcessTerminated {
            server_id,
            server_type,
            exit_code,
        } => {
            if !negotiated.speaks(&ProtocolVersion::V0_10_0) {
                return None;
            }
            (
                methods::SERVER_PROCESS_TERMINATED,
                json!({"server": handle(server_id, server_type), "exitCode": exit_code}),
            )
        }
    };
    Some(wire::notification(method, params))
}

fn handle(server_id: &ServerId, server_type: &ServerTypeId) -> ServerHandle {
    ServerHandle {
        id: server_id.to_string(),
        server_type: Some(ServerTypeRef::Id(server_type.to_string())),
    }
}

fn send(outgoing: &mpsc::UnboundedSender<String>, line: String) {
    if outgoing.send(line).is_err() {
        debug!("control session writer already closed");
    }
}

async fn write_lines(mut writer: OwnedWriteHalf, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        if let Err(err) = writer.write_all(line.as_bytes()).await {
            debug!(error = %err, "control connection write failed");
            return;
        }
    }
    if let Err(err) = writer.shutdown().await {
        debug!(error = %err, "control connection shutdown failed");
    }
}

//! Control client for the Stagehand session protocol.
//!
//! Requests are matched to responses through a pending map keyed by request
//! id. Notifications are delivered on a channel the caller takes once, and
//! `promptString` requests from the service are answered by an optional
//! responder.

use super::error::{ClientError, ClientResult};
use super::wire::{self, Incoming, RpcError, codes, methods};
use crate::capability::CapabilitySet;
use crate::lifecycle::domain::{
    LaunchAttributesRequest, LaunchParameters, ServerAttributes, ServerHandle,
    ServerStartingAttributes, ServerStateReport, ServerTypeRef, StartServerResponse, Status,
    StopServerAttributes,
};
use crate::server_type::domain::{AttributeSchema, CommandLineDetails, LaunchMode, ServerTypeInfo};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Answers `promptString` requests: receives the message and the secret
/// flag, returns the answer or `None` to decline.
pub type PromptResponder = Arc<dyn Fn(&str, bool) -> Option<String> + Send + Sync>;

/// Waiting requests by id; `None` once the connection has closed.
type PendingRequests = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>>>;

/// Notification received from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification method.
    pub method: String,
    /// Notification parameters.
    pub params: Value,
}

/// Connection to a Stagehand control endpoint.
pub struct ControlClient {
    outgoing: mpsc::UnboundedSender<String>,
    pending: PendingRequests,
    next_id: AtomicU64,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ControlClient {
    /// Connects without a prompt responder. Prompts are declined.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] when the connection cannot be opened.
    pub async fn connect(address: impl ToSocketAddrs) -> ClientResult<Self> {
        Self::open(address, None).await
    }

    /// Connects and answers prompts with `responder`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] when the connection cannot be opened.
    pub async fn connect_with_responder(
        address: impl ToSocketAddrs,
        responder: PromptResponder,
    ) -> ClientResult<Self> {
        Self::open(address, Some(responder)).await
    }

    async fn open(
        address: impl ToSocketAddrs,
        responder: Option<PromptResponder>,
    ) -> ClientResult<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        let (outgoing, lines_out) = mpsc::unbounded_channel();
        let (notify, notifications) = mpsc::unbounded_channel();
        let pending: PendingRequests = Arc::new(Mutex::new(Some(HashMap::new())));

        let writer = tokio::spawn(write_lines(write_half, lines_out));
        let reader = tokio::spawn(read_messages(
            read_half,
            Arc::clone(&pending),
            notify,
            outgoing.clone(),
            responder,
        ));
        Ok(Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            notifications: Some(notifications),
            reader,
            writer,
        })
    }

    /// Takes the notification stream. Returns `None` after the first call.
    pub const fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notifications.take()
    }

    /// Performs the capability handshake and returns the service's map.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] when the service rejects the handshake.
    pub async fn initialize(&self, capabilities: &CapabilitySet) -> ClientResult<CapabilitySet> {
        self.call(methods::INITIALIZE, capabilities).await
    }

    /// Sends a raw request and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] for error responses and
    /// [`ClientError::Closed`] when the connection drops first.
    pub async fn request(&self, method: &str, params: Value) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .ok_or(ClientError::Closed)?
            .insert(id, sender);
        let mut guard = PendingRequestGuard::new(&self.pending, id);

        self.outgoing
            .send(wire::request(id, method, params))
            .map_err(|_| ClientError::Closed)?;
        let outcome = receiver.await.map_err(|_| ClientError::Closed)?;
        guard.disarm();
        outcome.map_err(ClientError::Rpc)
    }

    /// Sends a typed request and decodes its result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Json`] when the result has an unexpected
    /// shape, besides the errors of [`Self::request`].
    pub async fn call<P, R>(&self, method: &str, params: &P) -> ClientResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let result = self.request(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Lists the registered server types.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_server_types(&self) -> ClientResult<Vec<ServerTypeInfo>> {
        self.call(methods::GET_SERVER_TYPES, &Value::Null).await
    }

    /// Defines a server.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn create_server(&self, attributes: &ServerAttributes) -> ClientResult<Status> {
        self.call(methods::CREATE_SERVER, attributes).await
    }

    /// Deletes a server.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn delete_server(&self, id: &str) -> ClientResult<Status> {
        self.call(methods::DELETE_SERVER, &json!({"id": id})).await
    }

    /// Lists the defined servers.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_server_handles(&self) -> ClientResult<Vec<ServerHandle>> {
        self.call(methods::GET_SERVER_HANDLES, &Value::Null).await
    }

    /// Reports the state of a server, `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_server_state(&self, id: &str) -> ClientResult<Option<ServerStateReport>> {
        self.call(methods::GET_SERVER_STATE, &json!({"id": id})).await
    }

    /// Lists the launch modes of a server type.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_launch_modes(&self, server_type: &str) -> ClientResult<Option<Vec<LaunchMode>>> {
        self.call(
            methods::GET_LAUNCH_MODES,
            &ServerTypeRef::Id(server_type.to_owned()),
        )
        .await
    }

    /// Returns the required launch attributes of a server type and mode.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_required_launch_attributes(
        &self,
        request: &LaunchAttributesRequest,
    ) -> ClientResult<Option<AttributeSchema>> {
        self.call(methods::GET_REQUIRED_LAUNCH_ATTRIBUTES, request).await
    }

    /// Returns the optional launch attributes of a server type and mode.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_optional_launch_attributes(
        &self,
        request: &LaunchAttributesRequest,
    ) -> ClientResult<Option<AttributeSchema>> {
        self.call(methods::GET_OPTIONAL_LAUNCH_ATTRIBUTES, request).await
    }

    /// Returns the command line a launch would run.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn get_launch_command(
        &self,
        params: &LaunchParameters,
    ) -> ClientResult<Option<CommandLineDetails>> {
        self.call(methods::GET_LAUNCH_COMMAND, params).await
    }

    /// Records that the caller is starting a server.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn server_starting_by_client(
        &self,
        request: &ServerStartingAttributes,
    ) -> ClientResult<Status> {
        self.call(methods::SERVER_STARTING_BY_CLIENT, request).await
    }

    /// Records that the caller's launch has started.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn server_started_by_client(&self, params: &LaunchParameters) -> ClientResult<Status> {
        self.call(methods::SERVER_STARTED_BY_CLIENT, params).await
    }

    /// Launches a server.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn start_server_async(
        &self,
        params: &LaunchParameters,
    ) -> ClientResult<StartServerResponse> {
        self.call(methods::START_SERVER_ASYNC, params).await
    }

    /// Stops a server.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn stop_server_async(&self, request: &StopServerAttributes) -> ClientResult<Status> {
        self.call(methods::STOP_SERVER_ASYNC, request).await
    }
}

impl Drop for ControlClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Removes a pending entry when the waiting request is dropped early.
struct PendingRequestGuard<'a> {
    pending: &'a PendingRequests,
    id: u64,
    armed: bool,
}

impl<'a> PendingRequestGuard<'a> {
    const fn new(pending: &'a PendingRequests, id: u64) -> Self {
        Self {
            pending,
            id,
            armed: true,
        }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRequestGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Some(waiting) = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_mut()
        {
            waiting.remove(&self.id);
        }
    }
}

async fn read_messages(
    read_half: OwnedReadHalf,
    pending: PendingRequests,
    notify: mpsc::UnboundedSender<Notification>,
    outgoing: mpsc::UnboundedSender<String>,
    responder: Option<PromptResponder>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "control connection read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match wire::parse_line(&line) {
            Ok(Incoming::Response { id, outcome }) => {
                let waiting = id.as_u64().and_then(|request| {
                    pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .as_mut()
                        .and_then(|waiting| waiting.remove(&request))
                });
                match waiting {
                    Some(sender) => {
                        if sender.send(outcome).is_err() {
                            trace!(id = %id, "response arrived after the request was dropped");
                        }
                    }
                    None => debug!(id = %id, "response without a pending request"),
                }
            }
            Ok(Incoming::Notification { method, params }) => {
                if notify.send(Notification { method, params }).is_err() {
                    trace!("notification receiver dropped");
                }
            }
            Ok(Incoming::Request { id, method, params }) => {
                let reply = answer_request(&id, &method, &params, responder.as_ref());
                if outgoing.send(reply).is_err() {
                    break;
                }
            }
            Err(err) => warn!(error = %err, "ignoring malformed control message"),
        }
    }
    *pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

fn answer_request(
    id: &Value,
    method: &str,
    params: &Value,
    responder: Option<&PromptResponder>,
) -> String {
    if method != methods::PROMPT_STRING {
        let error = RpcError::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        );
        return wire::error_response(id, &error);
    }
    let message = params
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let secret = params
        .get("secret")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let answer = responder.and_then(|respond| respond(message, secret));
    wire::response(id, answer.map_or(Value::Null, Value::String))
}

async fn write_lines(mut write_half: OwnedWriteHalf, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        if let Err(err) = write_half.write_all(line.as_bytes()).await {
            debug!(error = %err, "control connection write failed");
            return;
        }
    }
}

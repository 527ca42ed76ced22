//! Command dispatcher.
//!
//! Decodes request parameters, runs every command on a bounded worker pool
//! away from the session's receive loop, and turns each outcome into the
//! wire result of its method. Imperative commands always resolve to a
//! [`Status`], lookups resolve to a value or `null`. A handler that panics
//! resolves like any other failure.

use super::wire::{RpcError, codes, methods};
use crate::capability::NegotiatedCapabilities;
use crate::lifecycle::{
    domain::{
        LaunchAttributesRequest, LaunchParameters, ServerAttributes, ServerHandle,
        ServerSnapshot, ServerStartingAttributes, ServerState, ServerStateReport,
        ServerTypeRef, StartServerResponse, Status, StopServerAttributes,
    },
    ports::ProcessLauncher,
    services::{LifecycleController, LifecycleError, LifecycleResult},
};
use crate::server_type::domain::{AttributeDescriptor, AttributeKind};
use async_trait::async_trait;
use mockable::Clock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info_span, warn};

/// Worker pool size used when none is configured.
pub const DEFAULT_MAX_CONCURRENT_COMMANDS: usize = 16;

/// Asks the caller of a session for free text.
#[async_trait]
pub trait ClientPrompter: Send + Sync {
    /// Shows `message` to the user and returns the answer, or `None` when
    /// the caller declined or went away.
    async fn prompt_string(&self, message: &str, secret: bool) -> Option<String>;
}

/// The session a command arrived on.
#[derive(Clone)]
pub struct SessionContext {
    capabilities: Arc<NegotiatedCapabilities>,
    prompter: Arc<dyn ClientPrompter>,
}

impl SessionContext {
    /// Creates a context for an initialized session.
    #[must_use]
    pub fn new(capabilities: Arc<NegotiatedCapabilities>, prompter: Arc<dyn ClientPrompter>) -> Self {
        Self {
            capabilities,
            prompter,
        }
    }

    /// Returns the capabilities negotiated for the session.
    #[must_use]
    pub fn capabilities(&self) -> &NegotiatedCapabilities {
        &self.capabilities
    }
}

/// Shape of the result a method resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultShape {
    Status,
    StartResponse,
    Lookup,
}

impl ResultShape {
    fn of(method: &str) -> Option<Self> {
        match method {
            methods::CREATE_SERVER
            | methods::DELETE_SERVER
            | methods::SERVER_STARTING_BY_CLIENT
            | methods::SERVER_STARTED_BY_CLIENT
            | methods::STOP_SERVER_ASYNC => Some(Self::Status),
            methods::START_SERVER_ASYNC => Some(Self::StartResponse),
            methods::GET_SERVER_TYPES
            | methods::GET_SERVER_HANDLES
            | methods::GET_SERVER_STATE
            | methods::GET_LAUNCH_MODES
            | methods::GET_REQUIRED_LAUNCH_ATTRIBUTES
            | methods::GET_OPTIONAL_LAUNCH_ATTRIBUTES
            | methods::GET_LAUNCH_COMMAND => Some(Self::Lookup),
            _ => None,
        }
    }

    /// Result reported when the command could not run to completion.
    fn failure(self, status: Status) -> Result<Value, RpcError> {
        match self {
            Self::Status => encode(&status),
            Self::StartResponse => encode(&StartServerResponse::from_status(status)),
            Self::Lookup => Ok(Value::Null),
        }
    }
}

/// Runs control commands against a [`LifecycleController`].
pub struct CommandDispatcher<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    controller: LifecycleController<L, C>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl<L, C> Clone for CommandDispatcher<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            permits: Arc::clone(&self.permits),
            tasks: self.tasks.clone(),
        }
    }
}

impl<L, C> CommandDispatcher<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a dispatcher running at most `max_concurrent_commands`
    /// commands at once.
    #[must_use]
    pub fn new(controller: LifecycleController<L, C>, max_concurrent_commands: usize) -> Self {
        Self {
            controller,
            permits: Arc::new(Semaphore::new(max_concurrent_commands.max(1))),
            tasks: TaskTracker::new(),
        }
    }

    /// Returns the controller commands run against.
    #[must_use]
    pub const fn controller(&self) -> &LifecycleController<L, C> {
        &self.controller
    }

    /// Runs `method` in the background and hands its outcome to `respond`.
    ///
    /// Returns immediately; `respond` is called exactly once.
    pub fn spawn<F>(&self, method: String, params: Value, session: SessionContext, respond: F)
    where
        F: FnOnce(Result<Value, RpcError>) + Send + 'static,
    {
        let dispatcher = self.clone();
        let span = info_span!("command", method = %method);
        self.tasks.spawn(
            async move {
                respond(dispatcher.execute(&method, params, session).await);
            }
            .instrument(span),
        );
    }

    /// Runs `method` on the worker pool and returns its wire result.
    ///
    /// # Errors
    ///
    /// Returns a JSON-RPC error for unknown methods. Command failures are
    /// reported inside the result, never as errors.
    pub async fn execute(
        &self,
        method: &str,
        params: Value,
        session: SessionContext,
    ) -> Result<Value, RpcError> {
        let Some(shape) = ResultShape::of(method) else {
            debug!(method, "unknown method");
            return Err(RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ));
        };
        let Ok(_permit) = self.permits.acquire().await else {
            return shape.failure(LifecycleError::ShuttingDown.to_status());
        };

        let dispatcher = self.clone();
        let owned_method = method.to_owned();
        let handler = tokio::spawn(async move {
            dispatcher.handle(&owned_method, params, &session).await
        });
        match handler.await {
            Ok(result) => result,
            Err(fault) => {
                let message = fault_message(fault);
                warn!(method, fault = %message, "command handler failed");
                shape.failure(Status::error(message))
            }
        }
    }

    /// Stops accepting new background commands once the running ones end.
    pub fn close(&self) {
        self.tasks.close();
    }

    /// Waits for every background command to resolve. Returns once
    /// [`Self::close`] was called and the pool is empty.
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }

    async fn handle(
        &self,
        method: &str,
        params: Value,
        session: &SessionContext,
    ) -> Result<Value, RpcError> {
        let controller = &self.controller;
        let catalog = controller.catalog();
        match method {
            methods::GET_SERVER_TYPES => encode(&catalog.list()),
            methods::GET_SERVER_HANDLES => {
                let handles: Vec<ServerHandle> =
                    controller.servers().iter().map(server_handle).collect();
                encode(&handles)
            }
            methods::GET_SERVER_STATE => encode(
                &decode::<ServerHandle>(params)
                    .and_then(|handle| controller.server_state(&handle.id))
                    .map(|snapshot| state_report(&snapshot)),
            ),
            methods::GET_LAUNCH_MODES => encode(
                &decode::<ServerTypeRef>(params)
                    .and_then(|server_type| catalog.launch_modes(server_type.id())),
            ),
            methods::GET_REQUIRED_LAUNCH_ATTRIBUTES => encode(
                &decode::<LaunchAttributesRequest>(params).and_then(|request| {
                    catalog.required_launch_attributes(&request.server_type_id, &request.mode)
                }),
            ),
            methods::GET_OPTIONAL_LAUNCH_ATTRIBUTES => encode(
                &decode::<LaunchAttributesRequest>(params).and_then(|request| {
                    catalog.optional_launch_attributes(&request.server_type_id, &request.mode)
                }),
            ),
            methods::GET_LAUNCH_COMMAND => encode(
                &decode::<LaunchParameters>(params)
                    .and_then(|launch| controller.launch_command(&launch)),
            ),
            methods::CREATE_SERVER => status(
                decode::<ServerAttributes>(params)
                    .ok_or(LifecycleError::InvalidParameter)
                    .and_then(|request| controller.create_server(request).map(drop)),
            ),
            methods::DELETE_SERVER => status(
                decode::<ServerHandle>(params)
                    .ok_or(LifecycleError::InvalidParameter)
                    .and_then(|handle| controller.delete_server(&handle.id).map(drop)),
            ),
            methods::SERVER_STARTING_BY_CLIENT => {
                let Some(request) = decode::<ServerStartingAttributes>(params) else {
                    return status(Err(LifecycleError::InvalidParameter));
                };
                status(controller.server_starting_by_client(&request).await)
            }
            methods::SERVER_STARTED_BY_CLIENT => status(
                decode::<LaunchParameters>(params)
                    .ok_or(LifecycleError::InvalidParameter)
                    .and_then(|launch| controller.server_started_by_client(&launch)),
            ),
            methods::START_SERVER_ASYNC => {
                let Some(mut launch) = decode::<LaunchParameters>(params) else {
                    return encode(&StartServerResponse::from_status(
                        LifecycleError::InvalidParameter.to_status(),
                    ));
                };
                self.request_missing_attributes(&mut launch, session).await;
                let response = match controller.start_server(&launch).await {
                    Ok(details) => StartServerResponse::launched(details),
                    Err(err) => StartServerResponse::from_status(err.to_status()),
                };
                encode(&response)
            }
            methods::STOP_SERVER_ASYNC => {
                let Some(request) = decode::<StopServerAttributes>(params) else {
                    return status(Err(LifecycleError::InvalidParameter));
                };
                status(controller.stop_server(&request).await)
            }
            _ => Err(RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            )),
        }
    }

    /// Prompts the caller for required launch attributes it left out.
    ///
    /// Stops at the first declined or unusable answer; the launch then
    /// fails with the missing attribute error.
    async fn request_missing_attributes(
        &self,
        launch: &mut LaunchParameters,
        session: &SessionContext,
    ) {
        if !session.capabilities.supports_prompt_string() {
            return;
        }
        let Some(snapshot) = self.controller.server_state(launch.server_id()) else {
            return;
        };
        if snapshot.state != ServerState::Stopped || snapshot.operation.is_some() {
            return;
        }
        let Some(schema) = self
            .controller
            .catalog()
            .required_launch_attributes(snapshot.server_type.as_str(), &launch.mode)
        else {
            return;
        };

        let mut supplied = snapshot.attributes;
        supplied.extend(
            launch
                .params
                .attributes
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        for key in schema.missing_from(&supplied) {
            let Some(descriptor) = schema.get(&key) else {
                continue;
            };
            let prompt = prompt_text(&key, descriptor);
            let asked = tokio::select! {
                () = self.controller.shutting_down() => None,
                answer = session.prompter.prompt_string(&prompt, descriptor.is_secret()) => answer,
            };
            let Some(answer) = asked else {
                debug!(server_id = launch.server_id(), attribute = %key, "prompt declined");
                return;
            };
            let Some(value) = coerce(descriptor.kind(), &answer) else {
                warn!(
                    server_id = launch.server_id(),
                    attribute = %key,
                    kind = descriptor.kind().as_str(),
                    "prompt answer does not match the attribute type"
                );
                return;
            };
            launch.params.attributes.insert(key, value);
        }
    }
}

/// Decodes command parameters.
///
/// A single-element array is unwrapped. `null`, an empty array and payloads
/// of the wrong shape all yield `None`.
fn decode<T: DeserializeOwned>(params: Value) -> Option<T> {
    let payload = match params {
        Value::Array(mut items) if items.len() == 1 => items.pop()?,
        other => other,
    };
    if payload.is_null() {
        return None;
    }
    serde_json::from_value(payload)
        .inspect_err(|err| debug!(error = %err, "rejected command parameters"))
        .ok()
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| {
        RpcError::new(
            codes::INTERNAL_ERROR,
            format!("failed to encode result: {err}"),
        )
    })
}

fn status(result: LifecycleResult<()>) -> Result<Value, RpcError> {
    encode(&result.map_or_else(|err| err.to_status(), |()| Status::ok()))
}

fn server_handle(snapshot: &ServerSnapshot) -> ServerHandle {
    ServerHandle {
        id: snapshot.id.to_string(),
        server_type: Some(ServerTypeRef::Id(snapshot.server_type.to_string())),
    }
}

fn state_report(snapshot: &ServerSnapshot) -> ServerStateReport {
    ServerStateReport {
        server: server_handle(snapshot),
        state: snapshot.state,
        mode: snapshot.launch_mode.clone(),
        operation: snapshot.operation,
    }
}

fn prompt_text(key: &str, descriptor: &AttributeDescriptor) -> String {
    if descriptor.description().is_empty() {
        format!("Enter a value for {key}")
    } else {
        format!("Enter a value for {key} ({})", descriptor.description())
    }
}

fn coerce(kind: AttributeKind, answer: &str) -> Option<Value> {
    match kind {
        AttributeKind::String => Some(Value::String(answer.to_owned())),
        AttributeKind::Integer => answer.trim().parse::<i64>().ok().map(Value::from),
        AttributeKind::Boolean => answer.trim().parse::<bool>().ok().map(Value::Bool),
        AttributeKind::List | AttributeKind::Map => serde_json::from_str::<Value>(answer)
            .ok()
            .filter(|value| kind.accepts(value)),
    }
}

fn fault_message(fault: JoinError) -> String {
    if !fault.is_panic() {
        return fault.to_string();
    }
    let payload = fault.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "command handler panicked".to_owned())
}

//! JSON-RPC 2.0 message shapes carried one per line.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Protocol version tag of every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error codes used by the control protocol.
pub mod codes {
    /// The line is not valid JSON.
    pub const PARSE_ERROR: i64 = -32_700;
    /// The message is not a valid request, or `initialize` was repeated.
    pub const INVALID_REQUEST: i64 = -32_600;
    /// The method is unknown.
    pub const METHOD_NOT_FOUND: i64 = -32_601;
    /// The parameters cannot be interpreted.
    pub const INVALID_PARAMS: i64 = -32_602;
    /// The request failed unexpectedly.
    pub const INTERNAL_ERROR: i64 = -32_603;
    /// A request arrived before `initialize`.
    pub const SERVER_NOT_INITIALIZED: i64 = -32_002;
}

/// Method and notification names of the control protocol.
pub mod methods {
    /// Capability handshake.
    pub const INITIALIZE: &str = "initialize";
    /// Lists registered server types.
    pub const GET_SERVER_TYPES: &str = "getServerTypes";
    /// Defines a server.
    pub const CREATE_SERVER: &str = "createServer";
    /// Deletes a server.
    pub const DELETE_SERVER: &str = "deleteServer";
    /// Lists defined servers.
    pub const GET_SERVER_HANDLES: &str = "getServerHandles";
    /// Reports the state of one server.
    pub const GET_SERVER_STATE: &str = "getServerState";
    /// Lists the launch modes of a server type.
    pub const GET_LAUNCH_MODES: &str = "getLaunchModes";
    /// Returns the required launch attributes of a server type and mode.
    pub const GET_REQUIRED_LAUNCH_ATTRIBUTES: &str = "getRequiredLaunchAttributes";
    /// Returns the optional launch attributes of a server type and mode.
    pub const GET_OPTIONAL_LAUNCH_ATTRIBUTES: &str = "getOptionalLaunchAttributes";
    /// Returns the command line of a launch without running it.
    pub const GET_LAUNCH_COMMAND: &str = "getLaunchCommand";
    /// Records that the caller is starting a server.
    pub const SERVER_STARTING_BY_CLIENT: &str = "serverStartingByClient";
    /// Records that the caller's launch has started.
    pub const SERVER_STARTED_BY_CLIENT: &str = "serverStartedByClient";
    /// Launches a server.
    pub const START_SERVER_ASYNC: &str = "startServerAsync";
    /// Stops a server.
    pub const STOP_SERVER_ASYNC: &str = "stopServerAsync";

    /// Notification: a server was defined.
    pub const SERVER_ADDED: &str = "serverAdded";
    /// Notification: a server was deleted.
    pub const SERVER_REMOVED: &str = "serverRemoved";
    /// Notification: a server changed state.
    pub const SERVER_STATE_CHANGED: &str = "serverStateChanged";
    /// Notification: a server process exited on its own.
    pub const SERVER_PROCESS_TERMINATED: &str = "serverProcessTerminated";
    /// Request to the caller: ask the user for a string.
    pub const PROMPT_STRING: &str = "promptString";
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "json-rpc error {}: {}", self.code, self.message)
    }
}

/// Message received from the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A call expecting a response.
    Request {
        /// Request id, echoed in the response.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// A call without a response.
    Notification {
        /// Method name.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// A response to a request this side sent.
    Response {
        /// Id of the answered request.
        id: Value,
        /// Result or error.
        outcome: Result<Value, RpcError>,
    },
}

/// Parses one line into a message.
///
/// # Errors
///
/// Returns [`codes::PARSE_ERROR`] for malformed JSON and
/// [`codes::INVALID_REQUEST`] for JSON that is not a message.
pub fn parse_line(line: &str) -> Result<Incoming, RpcError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| RpcError::new(codes::PARSE_ERROR, format!("Parse error: {err}")))?;
    let Value::Object(mut message) = value else {
        return Err(RpcError::new(codes::INVALID_REQUEST, "Invalid Request"));
    };

    let id = message.remove("id");
    let params = message.remove("params").unwrap_or(Value::Null);
    if let Some(Value::String(method)) = message.remove("method") {
        let Some(request_id) = id else {
            return Ok(Incoming::Notification { method, params });
        };
        return Ok(Incoming::Request {
            id: request_id,
            method,
            params,
        });
    }

    let Some(response_id) = id else {
        return Err(RpcError::new(codes::INVALID_REQUEST, "Invalid Request"));
    };
    let outcome = match (message.remove("result"), message.remove("error")) {
        (_, Some(error)) => Err(serde_json::from_value(error).map_err(|err| {
            RpcError::new(codes::INVALID_REQUEST, format!("Invalid error object: {err}"))
        })?),
        (Some(result), None) => Ok(result),
        (None, None) => return Err(RpcError::new(codes::INVALID_REQUEST, "Invalid Request")),
    };
    Ok(Incoming::Response {
        id: response_id,
        outcome,
    })
}

/// Encodes a successful response.
#[must_use]
pub fn response(id: &Value, result: Value) -> String {
    encode(json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result}))
}

/// Encodes an error response.
#[must_use]
pub fn error_response(id: &Value, error: &RpcError) -> String {
    encode(json!({"jsonrpc": JSONRPC_VERSION, "id": id, "error": error}))
}

/// Encodes a request.
#[must_use]
pub fn request(id: u64, method: &str, params: Value) -> String {
    encode(json!({"jsonrpc": JSONRPC_VERSION, "id": id, "method": method, "params": params}))
}

/// Encodes a notification.
#[must_use]
pub fn notification(method: &str, params: Value) -> String {
    let mut message = Map::new();
    message.insert("jsonrpc".to_owned(), Value::from(JSONRPC_VERSION));
    message.insert("method".to_owned(), Value::from(method));
    message.insert("params".to_owned(), params);
    encode(Value::Object(message))
}

fn encode(message: Value) -> String {
    let mut line = message.to_string();
    line.push('\n');
    line
}

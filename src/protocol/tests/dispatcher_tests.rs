//! Dispatcher tests against the in-memory launcher.

use crate::capability::{CapabilityRegistry, CapabilitySet, PROMPT_STRING, PROTOCOL_VERSION};
use crate::lifecycle::{
    adapters::InMemoryProcessLauncher,
    domain::{ServerState, Severity, StartServerResponse, Status},
    services::LifecycleController,
    tests::fixtures::{SERVER_TYPE, define, echo_server_type, home_attributes},
};
use crate::protocol::{
    ClientPrompter, CommandDispatcher, SessionContext,
    wire::{codes, methods},
};
use crate::server_type::{
    domain::{
        AttributeSchema, CommandLineDetails, LaunchMode, ServerTypeError, ServerTypeId,
        ServerTypeInfo,
    },
    ports::{CommandRequest, ServerTypeDescriptor},
    services::ServerTypeCatalog,
};
use async_trait::async_trait;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type TestDispatcher = CommandDispatcher<InMemoryProcessLauncher, DefaultClock>;

/// Server type whose command generation panics.
struct ExplodingServerType {
    info: ServerTypeInfo,
}

impl ExplodingServerType {
    fn new() -> Self {
        Self {
            info: ServerTypeInfo::new(
                ServerTypeId::new("exploding").expect("valid server type id"),
                "Exploding",
                "Panics when asked for a command line",
            ),
        }
    }
}

impl ServerTypeDescriptor for ExplodingServerType {
    fn info(&self) -> &ServerTypeInfo {
        &self.info
    }

    fn launch_modes(&self) -> Vec<LaunchMode> {
        vec![LaunchMode::run()]
    }

    fn server_attributes(&self) -> AttributeSchema {
        AttributeSchema::new()
    }

    fn required_launch_attributes(&self, _mode: &str) -> Option<AttributeSchema> {
        Some(AttributeSchema::new())
    }

    fn optional_launch_attributes(&self, _mode: &str) -> Option<AttributeSchema> {
        Some(AttributeSchema::new())
    }

    fn build_command(
        &self,
        _request: &CommandRequest<'_>,
    ) -> Result<CommandLineDetails, ServerTypeError> {
        panic!("template exploded");
    }
}

/// Prompter that replays canned answers and records every question.
#[derive(Default)]
struct ScriptedPrompter {
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<(String, bool)>>,
}

impl ScriptedPrompter {
    fn answering(answers: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(
                answers
                    .iter()
                    .map(|answer| answer.map(str::to_owned))
                    .collect(),
            ),
            asked: Mutex::default(),
        })
    }

    fn asked(&self) -> Vec<(String, bool)> {
        self.asked.lock().expect("asked lock").clone()
    }
}

#[async_trait]
impl ClientPrompter for ScriptedPrompter {
    async fn prompt_string(&self, message: &str, secret: bool) -> Option<String> {
        self.asked
            .lock()
            .expect("asked lock")
            .push((message.to_owned(), secret));
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .flatten()
    }
}

fn session(prompts: bool, prompter: Arc<ScriptedPrompter>) -> SessionContext {
    let offer = CapabilitySet::from([
        (PROTOCOL_VERSION.to_owned(), "0.10.0".to_owned()),
        (PROMPT_STRING.to_owned(), prompts.to_string()),
    ]);
    let negotiated = CapabilityRegistry::standard()
        .negotiate(offer)
        .expect("negotiation should succeed");
    SessionContext::new(Arc::new(negotiated), prompter)
}

#[fixture]
fn dispatcher() -> (TestDispatcher, InMemoryProcessLauncher) {
    let launcher = InMemoryProcessLauncher::new();
    let catalog = ServerTypeCatalog::builder()
        .register(echo_server_type())
        .and_then(|builder| builder.register(ExplodingServerType::new()))
        .expect("register server types")
        .build();
    let controller = LifecycleController::new(
        Arc::new(catalog),
        Arc::new(launcher.clone()),
        Arc::new(DefaultClock),
    );
    define(&controller, "s1");
    (CommandDispatcher::new(controller, 4), launcher)
}

async fn run(dispatcher: &TestDispatcher, method: &str, params: Value) -> Value {
    dispatcher
        .execute(method, params, session(false, ScriptedPrompter::answering(&[])))
        .await
        .expect("method should be known")
}

fn status(value: Value) -> Status {
    serde_json::from_value(value).expect("status result")
}

fn start_response(value: Value) -> StartServerResponse {
    serde_json::from_value(value).expect("start response")
}

fn launch(id: &str, mode: &str) -> Value {
    json!({"params": {"serverType": SERVER_TYPE, "id": id, "attributes": {}}, "mode": mode})
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_methods_are_json_rpc_errors(dispatcher: (TestDispatcher, InMemoryProcessLauncher)) {
    let (dispatcher, _) = dispatcher;

    let result = dispatcher
        .execute("restartServer", Value::Null, session(false, ScriptedPrompter::answering(&[])))
        .await;

    assert_eq!(result.map_err(|err| err.code), Err(codes::METHOD_NOT_FOUND));
}

#[rstest]
#[case(methods::STOP_SERVER_ASYNC)]
#[case(methods::CREATE_SERVER)]
#[case(methods::DELETE_SERVER)]
#[case(methods::SERVER_STARTED_BY_CLIENT)]
#[case(methods::SERVER_STARTING_BY_CLIENT)]
#[tokio::test(flavor = "multi_thread")]
async fn null_requests_are_invalid_parameters(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
    #[case] method: &str,
) {
    let (dispatcher, _) = dispatcher;

    let result = status(run(&dispatcher, method, Value::Null).await);

    assert_eq!(result.severity(), Severity::Error);
    assert_eq!(result.message(), "Invalid Parameter");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn null_start_request_reports_invalid_parameter(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
) {
    let (dispatcher, launcher) = dispatcher;

    let response = start_response(run(&dispatcher, methods::START_SERVER_ASYNC, Value::Null).await);

    assert_eq!(response.status.message(), "Invalid Parameter");
    assert_eq!(response.details, None);
    assert_eq!(launcher.spawn_count().expect("count"), 0);
}

#[rstest]
#[case(methods::GET_SERVER_STATE, Value::Null)]
#[case(methods::GET_SERVER_STATE, json!({"id": "ghost"}))]
#[case(methods::GET_LAUNCH_MODES, Value::Null)]
#[case(methods::GET_LAUNCH_MODES, json!("tomcat"))]
#[case(methods::GET_REQUIRED_LAUNCH_ATTRIBUTES, Value::Null)]
#[case(methods::GET_REQUIRED_LAUNCH_ATTRIBUTES, json!({"serverTypeId": "echo", "mode": "profile"}))]
#[case(methods::GET_OPTIONAL_LAUNCH_ATTRIBUTES, json!({"serverTypeId": "tomcat", "mode": "run"}))]
#[case(methods::GET_LAUNCH_COMMAND, Value::Null)]
#[case(methods::GET_LAUNCH_COMMAND, launch("ghost", "run"))]
#[tokio::test(flavor = "multi_thread")]
async fn lookups_return_null_for_unknown_input(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
    #[case] method: &str,
    #[case] params: Value,
) {
    let (dispatcher, _) = dispatcher;

    assert_eq!(run(&dispatcher, method, params).await, Value::Null);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lookups_describe_known_servers(dispatcher: (TestDispatcher, InMemoryProcessLauncher)) {
    let (dispatcher, _) = dispatcher;

    let modes = run(&dispatcher, methods::GET_LAUNCH_MODES, json!({"id": "echo"})).await;
    let handles = run(&dispatcher, methods::GET_SERVER_HANDLES, Value::Null).await;
    let state = run(&dispatcher, methods::GET_SERVER_STATE, json!({"id": "s1"})).await;
    let required = run(
        &dispatcher,
        methods::GET_REQUIRED_LAUNCH_ATTRIBUTES,
        json!([{"serverTypeId": "echo", "mode": "debug"}]),
    )
    .await;

    let mode_tags: Vec<&str> = modes
        .as_array()
        .expect("mode list")
        .iter()
        .filter_map(|mode| mode.get("mode").and_then(Value::as_str))
        .collect();
    assert_eq!(mode_tags, vec!["debug", "run"]);
    assert_eq!(handles, json!([{"id": "s1", "type": "echo"}]));
    assert_eq!(
        state,
        json!({"server": {"id": "s1", "type": "echo"}, "state": "stopped", "mode": null})
    );
    assert!(required.pointer("/attributes/debug.port").is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_start_is_cancelled_after_one_spawn(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
) {
    let (dispatcher, launcher) = dispatcher;

    let first = start_response(
        run(&dispatcher, methods::START_SERVER_ASYNC, launch("s1", "run")).await,
    );
    let second =
        start_response(run(&dispatcher, methods::START_SERVER_ASYNC, launch("s1", "run")).await);

    assert!(first.status.is_ok());
    assert_eq!(
        first.details.map(|details| details.cmd_line().to_vec()),
        Some(vec!["/bin/echo".to_owned(), "s1".to_owned(), "run".to_owned()])
    );
    assert_eq!(second.status.severity(), Severity::Cancel);
    assert_eq!(second.details, None);
    assert_eq!(launcher.spawn_count().expect("count"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_and_delete_round_trip(dispatcher: (TestDispatcher, InMemoryProcessLauncher)) {
    let (dispatcher, _) = dispatcher;

    let created = status(
        run(
            &dispatcher,
            methods::CREATE_SERVER,
            json!({"serverType": "echo", "id": "s2", "attributes": home_attributes()}),
        )
        .await,
    );
    let duplicate = status(
        run(
            &dispatcher,
            methods::CREATE_SERVER,
            json!({"serverType": "echo", "id": "s2", "attributes": home_attributes()}),
        )
        .await,
    );
    let deleted = status(run(&dispatcher, methods::DELETE_SERVER, json!({"id": "s2"})).await);
    let missing = status(run(&dispatcher, methods::DELETE_SERVER, json!({"id": "s2"})).await);

    assert!(created.is_ok());
    assert_eq!(duplicate.message(), "A server with id s2 already exists");
    assert!(deleted.is_ok());
    assert_eq!(missing.message(), "Server s2 does not exist");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn panicking_handler_resolves_with_error_and_rolls_back(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
) {
    let (dispatcher, launcher) = dispatcher;
    run(
        &dispatcher,
        methods::CREATE_SERVER,
        json!({"serverType": "exploding", "id": "boom"}),
    )
    .await;

    let params = json!({"params": {"id": "boom"}, "mode": "run"});
    let response = start_response(run(&dispatcher, methods::START_SERVER_ASYNC, params).await);

    assert_eq!(response.status.severity(), Severity::Error);
    assert_eq!(response.status.message(), "template exploded");
    let snapshot = dispatcher
        .controller()
        .server_state("boom")
        .expect("server should exist");
    assert_eq!(snapshot.state, ServerState::Stopped);
    assert_eq!(snapshot.operation, None);
    assert_eq!(launcher.spawn_count().expect("count"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_launch_attributes_are_prompted_for(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
) {
    let (dispatcher, _) = dispatcher;
    let prompter = ScriptedPrompter::answering(&[Some("8787")]);

    let response = dispatcher
        .execute(
            methods::START_SERVER_ASYNC,
            launch("s1", "debug"),
            session(true, Arc::clone(&prompter)),
        )
        .await
        .map(start_response)
        .expect("start should resolve");

    assert!(response.status.is_ok(), "{}", response.status);
    let cmd_line = response.details.expect("command details");
    assert!(cmd_line.cmd_line().contains(&"--port=8787".to_owned()));
    let asked = prompter.asked();
    assert_eq!(asked.len(), 1);
    assert!(asked.iter().all(|(message, secret)| message.contains("debug.port") && !secret));
}

#[rstest]
#[case(true, &[None])]
#[case(true, &[Some("not a port")])]
#[case(false, &[Some("8787")])]
#[tokio::test(flavor = "multi_thread")]
async fn start_fails_when_attributes_stay_missing(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
    #[case] prompts: bool,
    #[case] answers: &[Option<&str>],
) {
    let (dispatcher, launcher) = dispatcher;
    let prompter = ScriptedPrompter::answering(answers);

    let response = dispatcher
        .execute(
            methods::START_SERVER_ASYNC,
            launch("s1", "debug"),
            session(prompts, Arc::clone(&prompter)),
        )
        .await
        .map(start_response)
        .expect("start should resolve");

    assert_eq!(response.status.severity(), Severity::Error);
    assert_eq!(launcher.spawn_count().expect("count"), 0);
    assert_eq!(prompter.asked().is_empty(), !prompts);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn started_server_is_not_prompted_for_attributes(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
) {
    let (dispatcher, launcher) = dispatcher;
    let first = start_response(
        run(&dispatcher, methods::START_SERVER_ASYNC, launch("s1", "run")).await,
    );
    let prompter = ScriptedPrompter::answering(&[Some("8787")]);

    let second = dispatcher
        .execute(
            methods::START_SERVER_ASYNC,
            launch("s1", "debug"),
            session(true, Arc::clone(&prompter)),
        )
        .await
        .map(start_response)
        .expect("start should resolve");

    assert!(first.status.is_ok(), "{}", first.status);
    assert_eq!(second.status.severity(), Severity::Cancel);
    assert!(prompter.asked().is_empty());
    assert_eq!(launcher.spawn_count().expect("count"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawned_commands_respond_exactly_once(
    dispatcher: (TestDispatcher, InMemoryProcessLauncher),
) {
    let (dispatcher, _) = dispatcher;
    let (sender, receiver) = oneshot::channel();

    dispatcher.spawn(
        methods::STOP_SERVER_ASYNC.to_owned(),
        json!({"id": "s1", "force": true}),
        session(false, ScriptedPrompter::answering(&[])),
        move |outcome| {
            sender.send(outcome).expect("receiver alive");
        },
    );
    dispatcher.close();
    dispatcher.wait().await;

    let outcome = receiver.await.expect("response delivered");
    assert_eq!(outcome.map(status), Ok(Status::ok()));
}

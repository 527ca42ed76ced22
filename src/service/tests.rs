//! Tests for service assembly and shutdown.

use super::*;
use crate::capability::CapabilitySet;
use crate::config::parse_config_str;
use crate::lifecycle::adapters::InMemoryProcessLauncher;
use crate::lifecycle::domain::{LaunchParameters, ServerAttributes, ServerState};
use crate::lifecycle::services::LifecycleError;
use crate::protocol::{ClientError, ControlClient, bind};
use crate::server_type::domain::ServerAttributeMap;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::time::Duration;

const CONFIG: &str = r#"
[[server_types]]
id = "echo"
program = "/bin/echo"
working_dir = "{{ attrs['home'] }}"
args = ["{{ server_id }}"]
server_attributes = { home = { type = "string" } }
modes = [{ mode = "run" }]

[[servers]]
id = "s1"
type = "echo"
attributes = { home = "/srv/echo" }

[[servers]]
id = "s2"
type = "echo"
attributes = { home = "/srv/echo" }
"#;

struct Harness {
    service: Stagehand<InMemoryProcessLauncher, DefaultClock>,
    launcher: Arc<InMemoryProcessLauncher>,
}

#[fixture]
fn harness() -> Harness {
    let config = parse_config_str(CONFIG).expect("config should parse");
    let launcher = Arc::new(InMemoryProcessLauncher::new());
    let service = Stagehand::from_config(&config, Arc::clone(&launcher), Arc::new(DefaultClock))
        .expect("service should assemble");
    Harness { service, launcher }
}

fn run(id: &str) -> LaunchParameters {
    LaunchParameters::new(
        ServerAttributes::new("echo", id, ServerAttributeMap::new()),
        "run",
    )
}

fn state(service: &Stagehand<InMemoryProcessLauncher, DefaultClock>, id: &str) -> ServerState {
    service
        .controller()
        .server_state(id)
        .expect("server should exist")
        .state
}

#[rstest]
fn configured_servers_are_defined_stopped(harness: Harness) {
    let servers = harness.service.controller().servers();

    assert_eq!(servers.len(), 2);
    assert!(servers.iter().all(|server| server.state == ServerState::Stopped));
}

#[rstest]
fn server_rejected_by_the_controller_fails_assembly() {
    let config = parse_config_str(
        r#"
[[server_types]]
id = "echo"
program = "/bin/echo"
working_dir = "{{ attrs['home'] }}"
server_attributes = { home = { type = "string" } }
modes = [{ mode = "run" }]

[[servers]]
id = "s1"
type = "echo"
"#,
    )
    .expect("config should parse");

    let result = Stagehand::from_config(
        &config,
        Arc::new(InMemoryProcessLauncher::new()),
        Arc::new(DefaultClock),
    );

    assert!(matches!(
        result,
        Err(ServiceError::DefineServer {
            ref server_id,
            source: LifecycleError::MissingServerAttributes { .. },
        }) if server_id == "s1"
    ));
}

#[rstest]
fn unusable_artifact_cache_root_fails_assembly() {
    let dir = tempfile::tempdir().expect("temp dir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");
    let root = blocker.join("cache");
    let config = parse_config_str(&format!(
        "[artifact_cache]\nroot = \"{}\"\n",
        root.display()
    ))
    .expect("config should parse");

    let result = Stagehand::from_config(
        &config,
        Arc::new(InMemoryProcessLauncher::new()),
        Arc::new(DefaultClock),
    );

    assert!(matches!(result, Err(ServiceError::Provisioning(_))));
}

#[rstest]
#[case(true, ServerState::Stopped, 1)]
#[case(false, ServerState::Started, 0)]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_honours_stop_servers(
    harness: Harness,
    #[case] stop_servers: bool,
    #[case] expected: ServerState,
    #[case] terminations: usize,
) {
    harness
        .service
        .controller()
        .start_server(&run("s1"))
        .await
        .expect("start should succeed");

    harness.service.shutdown(stop_servers).await;

    assert_eq!(state(&harness.service, "s1"), expected);
    assert_eq!(state(&harness.service, "s2"), ServerState::Stopped);
    assert_eq!(
        harness.launcher.terminations().expect("terminations").len(),
        terminations
    );
    assert!(harness.service.controller().is_shutting_down());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_open_sessions(harness: Harness) {
    let listener = bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");
    let serving = {
        let service = harness.service.clone();
        tokio::spawn(async move { service.serve(listener).await })
    };

    let client = ControlClient::connect(address).await.expect("connect");
    client
        .initialize(&CapabilitySet::new())
        .await
        .expect("handshake should succeed");

    harness.service.shutdown(true).await;
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("gateway should stop in time")
        .expect("serve task should not panic");

    let after = tokio::time::timeout(Duration::from_secs(5), client.get_server_handles())
        .await
        .expect("request should resolve once the session is closed");
    assert!(matches!(after, Err(ClientError::Closed)));
}

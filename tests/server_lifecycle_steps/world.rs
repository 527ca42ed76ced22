//! Shared world state for server lifecycle BDD scenarios.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use stagehand::config::parse_config_str;
use stagehand::lifecycle::{adapters::InMemoryProcessLauncher, domain::Status};
use stagehand::protocol::{ControlClient, bind};
use stagehand::service::Stagehand;
use tokio::task::JoinHandle;

const CONFIG: &str = r#"
[[server_types]]
id = "echo"
program = "/bin/echo"
working_dir = "{{ attrs['home'] }}"
args = ["{{ server_id }}", "{{ mode }}"]
server_attributes = { home = { type = "string" } }
modes = [{ mode = "run" }]
"#;

/// Service type used by the BDD world.
pub type TestService = Stagehand<InMemoryProcessLauncher, DefaultClock>;

/// A service listening on loopback with one initialised client.
pub struct ConnectedSession {
    /// The service under test.
    pub service: TestService,
    /// Client connected to the service.
    pub client: ControlClient,
    serving: JoinHandle<()>,
}

impl Drop for ConnectedSession {
    fn drop(&mut self) {
        self.serving.abort();
    }
}

/// Scenario world for server lifecycle behaviour tests.
#[derive(Default)]
pub struct LifecycleWorld {
    /// Session opened by the background step.
    pub session: Option<ConnectedSession>,
    /// Status returned by the last command.
    pub last_status: Option<Status>,
}

impl LifecycleWorld {
    /// Returns the connected session.
    pub fn session(&self) -> Result<&ConnectedSession, eyre::Report> {
        self.session
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no control session in scenario world"))
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> LifecycleWorld {
    LifecycleWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Starts a service with the echo server type and connects a client.
pub async fn connect() -> Result<ConnectedSession, eyre::Report> {
    let config = parse_config_str(CONFIG)?;
    let service = Stagehand::from_config(
        &config,
        Arc::new(InMemoryProcessLauncher::new()),
        Arc::new(DefaultClock),
    )?;
    let listener = bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let serving = {
        let server = service.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    let client = ControlClient::connect(address).await?;
    client
        .initialize(&stagehand::capability::CapabilitySet::new())
        .await?;
    Ok(ConnectedSession {
        service,
        client,
        serving,
    })
}

//! Given steps for server lifecycle BDD scenarios.

use super::world::{LifecycleWorld, connect, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use serde_json::json;
use stagehand::lifecycle::domain::ServerAttributes;
use stagehand::server_type::domain::ServerAttributeMap;

#[given("a connected control session")]
fn a_connected_session(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    world.session = Some(run_async(connect()).wrap_err("start service and connect")?);
    Ok(())
}

#[given(r#"a server "{id}" of type "{server_type}""#)]
fn a_defined_server(
    world: &mut LifecycleWorld,
    id: String,
    server_type: String,
) -> Result<(), eyre::Report> {
    let attributes = ServerAttributeMap::from([("home".to_owned(), json!("/srv/echo"))]);
    let request = ServerAttributes::new(server_type, id, attributes);
    let status = run_async(world.session()?.client.create_server(&request))
        .wrap_err("create server for scenario")?;
    if !status.is_ok() {
        return Err(eyre::eyre!("server creation failed: {}", status.message()));
    }
    Ok(())
}

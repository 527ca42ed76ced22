//! When steps for server lifecycle BDD scenarios.

use super::world::{LifecycleWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use serde_json::Value;
use stagehand::lifecycle::domain::{
    LaunchParameters, ServerAttributes, Status, StopServerAttributes,
};
use stagehand::protocol::wire::methods;
use stagehand::server_type::domain::ServerAttributeMap;

#[when(r#"the caller starts "{id}" in "{mode}" mode"#)]
fn start_server(world: &mut LifecycleWorld, id: String, mode: String) -> Result<(), eyre::Report> {
    let params = LaunchParameters::new(ServerAttributes::new("", id, ServerAttributeMap::new()), mode);
    let response = run_async(world.session()?.client.start_server_async(&params))
        .wrap_err("startServerAsync")?;
    world.last_status = Some(response.status);
    Ok(())
}

#[when("the caller stops \"{id}\"")]
fn stop_server(world: &mut LifecycleWorld, id: String) -> Result<(), eyre::Report> {
    stop(world, id, false)
}

#[when("the caller force-stops \"{id}\"")]
fn force_stop_server(world: &mut LifecycleWorld, id: String) -> Result<(), eyre::Report> {
    stop(world, id, true)
}

#[when("the caller starts a server without parameters")]
fn start_without_parameters(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    let result = run_async(
        world
            .session()?
            .client
            .request(methods::START_SERVER_ASYNC, Value::Null),
    )
    .wrap_err("startServerAsync(null)")?;
    let status = result
        .get("status")
        .cloned()
        .ok_or_else(|| eyre::eyre!("start response carries no status: {result}"))?;
    world.last_status = Some(serde_json::from_value(status)?);
    Ok(())
}

#[when("the caller stops a server without parameters")]
fn stop_without_parameters(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    let result = run_async(
        world
            .session()?
            .client
            .request(methods::STOP_SERVER_ASYNC, Value::Null),
    )
    .wrap_err("stopServerAsync(null)")?;
    world.last_status = Some(serde_json::from_value::<Status>(result)?);
    Ok(())
}

fn stop(world: &mut LifecycleWorld, id: String, force: bool) -> Result<(), eyre::Report> {
    let request = StopServerAttributes { id, force };
    let status = run_async(world.session()?.client.stop_server_async(&request))
        .wrap_err("stopServerAsync")?;
    world.last_status = Some(status);
    Ok(())
}

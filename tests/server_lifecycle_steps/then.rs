//! Then steps for server lifecycle BDD scenarios.

use super::world::{LifecycleWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use stagehand::lifecycle::domain::{Severity, Status};

fn last_status(world: &LifecycleWorld) -> Result<&Status, eyre::Report> {
    world
        .last_status
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no command has been issued"))
}

#[then("the command succeeds")]
fn command_succeeds(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    let status = last_status(world)?;
    if status.severity() != Severity::Ok || status.message() != Status::OK_MESSAGE {
        return Err(eyre::eyre!("expected ok, got {status:?}"));
    }
    Ok(())
}

#[then(r#"the command fails with "{message}""#)]
fn command_fails_with(world: &LifecycleWorld, message: String) -> Result<(), eyre::Report> {
    let status = last_status(world)?;
    if status.severity() != Severity::Error {
        return Err(eyre::eyre!("expected an error status, got {status:?}"));
    }
    if status.message() != message {
        return Err(eyre::eyre!(
            "expected message '{message}', got '{}'",
            status.message()
        ));
    }
    Ok(())
}

#[then(r#"server "{id}" is "{state}""#)]
fn server_is_in_state(world: &LifecycleWorld, id: String, state: String) -> Result<(), eyre::Report> {
    let report = run_async(world.session()?.client.get_server_state(&id))
        .wrap_err("getServerState")?
        .ok_or_else(|| eyre::eyre!("server {id} is unknown"))?;
    if report.state.as_str() != state {
        return Err(eyre::eyre!("expected {id} to be {state}, found {}", report.state));
    }
    Ok(())
}

//! `stop`: signal a running `start` through its control files

use anyhow::Context;

use super::AppContext;
use crate::control::StopRequest;

pub fn run(ctx: &AppContext) -> anyhow::Result<StopRequest> {
    let outcome = ctx
        .control
        .request_stop()
        .with_context(|| format!("Failed to write stop request in {}", ctx.control.dir().display()))?;

    match outcome {
        StopRequest::Requested => println!("Stop requested."),
        StopRequest::NotRunning => println!("Enforcement is not running."),
    }
    Ok(outcome)
}

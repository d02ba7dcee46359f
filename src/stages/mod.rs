//! Stage bodies: the actual post-processing work, from directory setup
//! on eee to the final archive pass. Every external tool call goes
//! through the runner and is echoed to the experiment logbook.

pub mod antab;
pub mod archive;
pub mod finalize;
pub mod lisfiles;
pub mod ms;
pub mod msops;
pub mod pipeline;
pub mod plots;
pub mod setup;
pub mod tconvert;

use anyhow::Result;

use crate::logbook::Logbook;
use crate::remote::{CommandOutput, RemoteRunner};

/// Runs a command on the processing host and records it verbatim, so
/// the logbook doubles as a redo-by-hand script.
pub(crate) async fn local_cmd(
    runner: &dyn RemoteRunner,
    logbook: &Logbook,
    cmd: &str,
) -> Result<CommandOutput> {
    logbook.command("eee", cmd)?;
    Ok(runner.local(cmd).await?)
}

pub(crate) async fn remote_cmd(
    runner: &dyn RemoteRunner,
    logbook: &Logbook,
    host: &str,
    cmd: &str,
) -> Result<CommandOutput> {
    logbook.command(host, cmd)?;
    Ok(runner.execute(host, cmd).await?)
}

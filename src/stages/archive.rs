//! `archive`: credentials, auxiliary files and FITS-IDI into the EVN
//! archive.

use anyhow::Result;

use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

fn archive_tag(ctx: &Context) -> String {
    format!("{}_{}", ctx.exp.expname(), ctx.exp.obsdate)
}

/// Protects the experiment in the archive and uploads the letter and
/// the lis/antab auxiliary files.
pub async fn archive_auxiliary(ctx: &mut Context) -> Result<ActionOutcome> {
    let tag = archive_tag(ctx);

    if let Some(creds) = ctx.exp.credentials.clone() {
        let cmd = format!(
            "cd {} && archive.pl -auth -e {} -n {} -p {}",
            ctx.exp.cwd.display(),
            tag,
            creds.username(),
            creds.password()
        );
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }

    let cmd = format!(
        "cd {} && archive.pl -stnd -e {} {}.piletter *.antab",
        ctx.exp.cwd.display(),
        tag,
        ctx.exp.expname_lower()
    );
    local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

pub async fn archive_fits(ctx: &mut Context) -> Result<ActionOutcome> {
    let cmd = format!(
        "cd {} && archive.pl -fits -e {} *IDI*",
        ctx.exp.cwd.display(),
        archive_tag(ctx)
    );
    local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::Credentials;
    use crate::steps::testing::context;
    use tempfile::TempDir;

    #[tokio::test]
    async fn auth_only_runs_with_credentials() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        archive_auxiliary(&mut ctx).await.unwrap();
        assert!(!runner.ran("-auth"));
        assert!(runner.ran("archive.pl -stnd -e EC089A_240312 ec089a.piletter"));
    }

    #[tokio::test]
    async fn auth_uses_the_issued_credentials() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        ctx.exp.credentials = Some(Credentials::new("ec089a", "pw12345678ab"));
        archive_auxiliary(&mut ctx).await.unwrap();
        assert!(runner.ran("archive.pl -auth -e EC089A_240312 -n ec089a -p pw12345678ab"));
    }

    #[tokio::test]
    async fn fits_archive_uses_the_experiment_tag() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        archive_fits(&mut ctx).await.unwrap();
        assert!(runner.ran("archive.pl -fits -e EC089A_240312 *IDI*"));
    }
}

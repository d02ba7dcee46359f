//! `pipeinputs`, `pipeline` and `postpipe`: everything that happens on
//! (or around) the EVN pipeline host.

use anyhow::{Context as _, Result};
use std::path::PathBuf;

use crate::stages::{local_cmd, remote_cmd};
use crate::steps::{ActionOutcome, Context};

fn pipe_exp_dir(ctx: &Context) -> PathBuf {
    ctx.config.paths.pipe_in_dir.join(ctx.exp.expname_lower())
}

fn pipe_out_dir(ctx: &Context) -> PathBuf {
    let root = ctx
        .config
        .paths
        .pipe_in_dir
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/"));
    root.join("out").join(ctx.exp.expname_lower())
}

pub async fn prepare_inputs(ctx: &mut Context) -> Result<ActionOutcome> {
    let pipe = ctx.config.hosts.pipe.clone();
    let cmd = format!("mkdir -p {}", pipe_exp_dir(ctx).display());
    remote_cmd(ctx.runner.as_ref(), &ctx.logbook, &pipe, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

/// Builds the uvflg flag file from the station logs and ships it, with
/// the combined antab, to the pipeline host.
pub async fn create_uvflg(ctx: &mut Context) -> Result<ActionOutcome> {
    let exp_lower = ctx.exp.expname_lower();
    let uvflg = ctx.exp.cwd.join(format!("{}.uvflg", exp_lower));
    if !uvflg.exists() {
        let cmd = format!("cd {} && uvflgall.csh {}", ctx.exp.cwd.display(), exp_lower);
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }

    let dest = format!("{}:{}/", ctx.config.hosts.pipe, pipe_exp_dir(ctx).display());
    for ext in ["uvflg", "antab"] {
        let source = ctx.exp.cwd.join(format!("{}.{}", exp_lower, ext));
        ctx.logbook.command("eee", &format!("scp {} {}", source.display(), dest))?;
        ctx.runner.transfer(&source.to_string_lossy(), &dest).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// Writes one pipeline input file per pipelined pass and ships them.
pub async fn create_input_files(ctx: &mut Context) -> Result<ActionOutcome> {
    if ctx.exp.pipelined_passes().is_empty() {
        return Ok(ActionOutcome::failed("no pipelined pass; run the lisfile step first"));
    }
    let refant = ctx.exp.refant.join(", ");
    let bpass: Vec<String> = ctx
        .exp
        .sources
        .iter()
        .filter(|s| matches!(s.kind, crate::experiment::SourceType::Fringefinder))
        .map(|s| s.name.clone())
        .collect();
    let targets: Vec<String> = ctx
        .exp
        .sources
        .iter()
        .filter(|s| matches!(s.kind, crate::experiment::SourceType::Target))
        .map(|s| s.name.clone())
        .collect();

    let mut written = Vec::new();
    for pass in ctx.exp.pipelined_passes() {
        let version = pass.msfile.strip_suffix(".ms").unwrap_or(&pass.msfile);
        let content = format!(
            "experiment = {version}\n\
             fits = {fits}\n\
             refant = {refant}\n\
             bpass = {bpass}\n\
             target = {targets}\n",
            version = version,
            fits = pipe_exp_dir(ctx).join(&pass.fitsidifile).display(),
            refant = refant,
            bpass = bpass.join(", "),
            targets = targets.join(", "),
        );
        let path = ctx.exp.cwd.join(format!("{}.inp.txt", version));
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    let dest = format!("{}:{}/", ctx.config.hosts.pipe, pipe_exp_dir(ctx).display());
    for path in &written {
        ctx.logbook.command("eee", &format!("scp {} {}", path.display(), dest))?;
        ctx.runner.transfer(&path.to_string_lossy(), &dest).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// Launches the EVN pipeline. The results always need a human eye, so
/// the run suspends right after.
pub async fn run_pipeline(ctx: &mut Context) -> Result<ActionOutcome> {
    let pipe = ctx.config.hosts.pipe.clone();
    let dir = pipe_exp_dir(ctx);
    let inputs: Vec<String> = ctx
        .exp
        .pipelined_passes()
        .iter()
        .map(|p| {
            let version = p.msfile.strip_suffix(".ms").unwrap_or(&p.msfile);
            format!("{}.inp.txt", version)
        })
        .collect();
    if inputs.is_empty() {
        return Ok(ActionOutcome::failed("no pipelined pass; run the lisfile step first"));
    }
    for input in inputs {
        let cmd = format!("cd {} && EVN.py {}", dir.display(), input);
        remote_cmd(ctx.runner.as_ref(), &ctx.logbook, &pipe, &cmd).await?;
    }
    Ok(ActionOutcome::suspended(
        "review the pipeline output; when satisfied, continue with --steps postpipe",
    ))
}

pub async fn run_ampcal(ctx: &mut Context) -> Result<ActionOutcome> {
    let pipe = ctx.config.hosts.pipe.clone();
    let cmd = format!("cd {} && ampcal.sh", pipe_out_dir(ctx).display());
    remote_cmd(ctx.runner.as_ref(), &ctx.logbook, &pipe, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

/// Comment file and standard feedback for the EVN archive pages.
pub async fn create_feedback(ctx: &mut Context) -> Result<ActionOutcome> {
    let pipe = ctx.config.hosts.pipe.clone();
    let exp_lower = ctx.exp.expname_lower();
    let out_dir = pipe_out_dir(ctx);
    let cmds = [
        format!("cd {} && comment_tasav_file.py {}", out_dir.display(), exp_lower),
        format!(
            "cd {} && feedback.pl -exp '{}' -jss '{}'",
            out_dir.display(),
            exp_lower,
            ctx.exp.supsci
        ),
    ];
    for cmd in cmds {
        remote_cmd(ctx.runner.as_ref(), &ctx.logbook, &pipe, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

pub async fn archive_results(ctx: &mut Context) -> Result<ActionOutcome> {
    let cmd = format!(
        "cd {} && archive.pl -pipe -e {}_{}",
        ctx.exp.cwd.display(),
        ctx.exp.expname(),
        ctx.exp.obsdate
    );
    local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

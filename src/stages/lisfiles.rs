//! `lisfile` and `checklis`: lis files born on the correlator host,
//! brought to eee, and turned into the experiment's correlator passes.

use anyhow::{Context as _, Result};

use crate::experiment::CorrelatorPass;
use crate::stages::{local_cmd, remote_cmd};
use crate::steps::{ActionOutcome, Context};

/// Creates the lis files on ccs with make_lis, unless they exist.
pub async fn create_lis_files(ctx: &mut Context) -> Result<ActionOutcome> {
    let corr = ctx.exp.correlator_name().to_string();
    let ccs_dir = ctx.config.ccs_dir(&corr);
    let ccs = ctx.config.hosts.ccs.clone();

    let glob = format!("{}/{}*.lis", ccs_dir.display(), corr.to_lowercase());
    if ctx.runner.file_exists(&ccs, &glob).await? {
        ctx.logbook.note("lis files already present on ccs")?;
        return Ok(ActionOutcome::Completed);
    }

    let cmd = format!("cd {};/ccs/bin/make_lis -e {}", ccs_dir.display(), corr);
    remote_cmd(ctx.runner.as_ref(), &ctx.logbook, &ccs, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

/// Copies the lis files from ccs and, for e-EVN runs, renames the
/// umbrella experiment name to this experiment both inside the files
/// and in their names.
pub async fn fetch_lis_files(ctx: &mut Context) -> Result<ActionOutcome> {
    let corr_lower = ctx.exp.correlator_name().to_lowercase();
    let exp_lower = ctx.exp.expname_lower();

    if local_lis_files(ctx, &exp_lower)?.is_empty() && local_lis_files(ctx, &corr_lower)?.is_empty()
    {
        let ccs_dir = ctx.config.ccs_dir(ctx.exp.correlator_name());
        let source = format!(
            "{}:{}/{}*.lis",
            ctx.config.hosts.ccs,
            ccs_dir.display(),
            corr_lower
        );
        ctx.logbook.command("eee", &format!("scp {} {}", source, ctx.exp.cwd.display()))?;
        ctx.runner.transfer(&source, &ctx.exp.cwd.to_string_lossy()).await?;
    }

    if ctx.exp.is_eevn() {
        let corr_upper = ctx.exp.correlator_name().to_string();
        let exp_upper = ctx.exp.expname().to_string();
        for filename in local_lis_files(ctx, &corr_lower)? {
            let path = ctx.exp.cwd.join(&filename);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let updated = text.replace(&corr_upper, &exp_upper).replace(&corr_lower, &exp_lower);
            std::fs::write(&path, updated)
                .with_context(|| format!("Failed to rewrite {}", path.display()))?;

            let renamed = ctx.exp.cwd.join(filename.replace(&corr_lower, &exp_lower));
            std::fs::rename(&path, &renamed).with_context(|| {
                format!("Failed to rename {} to {}", path.display(), renamed.display())
            })?;
            ctx.logbook.note(&format!(
                "renamed {} to {} (e-EVN run correlated as {})",
                filename,
                renamed.display(),
                corr_upper
            ))?;
        }
    }

    Ok(ActionOutcome::Completed)
}

/// Reads the local lis files into the pass list.
pub async fn parse_lis_files(ctx: &mut Context) -> Result<ActionOutcome> {
    let exp_lower = ctx.exp.expname_lower();
    let files = local_lis_files(ctx, &exp_lower)?;
    if files.is_empty() {
        return Ok(ActionOutcome::failed(format!(
            "no {}*.lis files found in {}",
            exp_lower,
            ctx.exp.cwd.display()
        )));
    }

    let mut passes = Vec::new();
    for (index, filename) in files.iter().enumerate() {
        let path = ctx.exp.cwd.join(filename);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match parse_lis(filename, &content, index, &exp_lower) {
            Some(pass) => passes.push(pass),
            None => {
                return Ok(ActionOutcome::failed(format!(
                    "{} does not name a measurement set",
                    filename
                )))
            }
        }
    }

    ctx.logbook.note(&format!(
        "correlator passes: {}",
        passes.iter().map(|p| p.msfile.as_str()).collect::<Vec<_>>().join(", ")
    ))?;
    ctx.exp.passes = passes;
    Ok(ActionOutcome::Completed)
}

/// One pass per lis file. The msfile comes from the lis header; the
/// FITS-IDI series is numbered by pass. Only the first pass (or the
/// continuum pass of a line/continuum split) goes through the pipeline.
fn parse_lis(filename: &str, content: &str, index: usize, exp_lower: &str) -> Option<CorrelatorPass> {
    let msfile = content
        .split_whitespace()
        .find(|token| token.ends_with(".ms"))?
        .to_string();
    let fitsidifile = format!("{}_{}_1.IDI", exp_lower, index + 1);
    let pipeline = filename.contains("_cont") || (index == 0 && !filename.contains("_line"));
    Some(CorrelatorPass::new(filename, &msfile, &fitsidifile, pipeline))
}

/// Runs checklis on every pass; any output beyond the two expected
/// summary lines flags an irregularity the operator must look at.
pub async fn check_lis_files(ctx: &mut Context) -> Result<ActionOutcome> {
    let lisfiles: Vec<String> = ctx.exp.passes.iter().map(|p| p.lisfile.clone()).collect();
    if lisfiles.is_empty() {
        return Ok(ActionOutcome::failed("no correlator passes known; run the lisfile step first"));
    }

    for lisfile in &lisfiles {
        let cmd = format!("cd {} && checklis.py {}", ctx.exp.cwd.display(), lisfile);
        let output = local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
        let lines: Vec<&str> =
            output.stdout.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() > 2 {
            return Ok(ActionOutcome::suspended(format!(
                "checklis reported irregularities in {}:\n{}\nEdit the lis file and re-run.",
                lisfile,
                lines.join("\n")
            )));
        }
    }

    if ctx.exp.is_eevn() {
        let reviewed = ctx
            .dialog
            .confirm("e-EVN run: have the renamed lis files been reviewed by eye?")?;
        if !reviewed {
            return Ok(ActionOutcome::suspended(
                "review the lis files (e-EVN rename) and re-run this step",
            ));
        }
    }

    Ok(ActionOutcome::Completed)
}

fn local_lis_files(ctx: &Context, prefix: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(&ctx.exp.cwd)
        .with_context(|| format!("Failed to list {}", ctx.exp.cwd.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", ctx.exp.cwd.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(prefix) && name.ends_with(".lis") {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

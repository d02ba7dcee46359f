//! `tconvert` and `post_polconvert`: measurement sets to FITS-IDI, and
//! the manual PolConvert detour when linear-polarization stations took
//! part.

use anyhow::Result;

use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

pub async fn run_tconvert(ctx: &mut Context) -> Result<ActionOutcome> {
    if ctx.exp.passes.is_empty() {
        return Ok(ActionOutcome::failed("no correlator passes known; run the lisfile step first"));
    }
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .map(|p| format!("cd {} && tConvert {} {}", ctx.exp.cwd.display(), p.msfile, p.fitsidifile))
        .collect();
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// PolConvert is run by hand. When any station needs it, the run stops
/// here and continues from `post_polconvert` once done.
pub async fn check_polconvert(ctx: &mut Context) -> Result<ActionOutcome> {
    let stations = ctx.exp.antennas.polconverted();
    if stations.is_empty() {
        return Ok(ActionOutcome::Completed);
    }
    Ok(ActionOutcome::suspended(format!(
        "PolConvert required for: {}. Run it on the FITS-IDI files, \
         then continue with --steps post_polconvert",
        stations.join(", ")
    )))
}

/// Picks up the FITS-IDI files PolConvert left behind: a
/// `<fits>.polconverted` file replaces the original series member.
pub async fn recover_polconverted_fits(ctx: &mut Context) -> Result<ActionOutcome> {
    let cwd = ctx.exp.cwd.clone();
    let mut recovered = 0;
    for pass in ctx.exp.passes.iter() {
        let converted = cwd.join(format!("{}.polconverted", pass.fitsidifile));
        if converted.exists() {
            std::fs::rename(&converted, cwd.join(&pass.fitsidifile)).map_err(|e| {
                anyhow::anyhow!("could not move {} into place: {}", converted.display(), e)
            })?;
            recovered += 1;
        }
    }
    if recovered == 0 && !ctx.exp.antennas.polconverted().is_empty() {
        return Ok(ActionOutcome::failed(
            "no .polconverted FITS-IDI files found; did PolConvert finish?",
        ));
    }
    ctx.logbook.note(&format!("{} polconverted FITS-IDI files recovered", recovered))?;
    Ok(ActionOutcome::Completed)
}

//! `ms`: from correlated data to measurement sets, plus the metadata
//! read back from them into the aggregate.

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::experiment::{Antenna, Antennas, FreqSetup, Source, SourceType};
use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

/// Fetches the correlated data for every pass.
pub async fn get_data(ctx: &mut Context) -> Result<ActionOutcome> {
    let corr = ctx.exp.correlator_name().to_string();
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .map(|p| {
            format!(
                "cd {} && getdata.pl -proj {} -lis {}",
                ctx.exp.cwd.display(),
                corr,
                p.lisfile
            )
        })
        .collect();
    if cmds.is_empty() {
        return Ok(ActionOutcome::failed("no correlator passes known; run the lisfile step first"));
    }
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// Builds the measurement set of every pass that does not have one yet.
pub async fn run_j2ms2(ctx: &mut Context) -> Result<ActionOutcome> {
    let extra = ctx
        .exp
        .special_params
        .get("j2ms2")
        .map(|v| format!(" {}", v.join(" ")))
        .unwrap_or_default();
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .filter(|p| !ctx.exp.cwd.join(&p.msfile).exists())
        .map(|p| format!("cd {} && j2ms2 -v {}{}", ctx.exp.cwd.display(), p.lisfile, extra))
        .collect();
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// e-EVN runs carry the umbrella name inside the MS; fix it up.
pub async fn update_ms_expname(ctx: &mut Context) -> Result<ActionOutcome> {
    if !ctx.exp.is_eevn() {
        return Ok(ActionOutcome::Completed);
    }
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .map(|p| {
            format!("cd {} && expname.py {} {}", ctx.exp.cwd.display(), p.msfile, ctx.exp.expname())
        })
        .collect();
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// What msinfo.py prints for a measurement set.
#[derive(Debug, Deserialize)]
struct MsSummary {
    sources: Vec<String>,
    antennas: Vec<AntennaEntry>,
    freqsetup: FreqSetup,
}

#[derive(Debug, Deserialize)]
struct AntennaEntry {
    name: String,
    /// Subbands in which the antenna has non-zero data.
    #[serde(default)]
    subbands: Vec<usize>,
}

/// Reads sources, antennas and the frequency setup of every pass back
/// into the aggregate. An antenna counts as observed in a pass when it
/// has data in at least one subband of that pass; source names unknown
/// to the schedule are kept with an untyped entry.
pub async fn read_ms_metadata(ctx: &mut Context) -> Result<ActionOutcome> {
    let cwd = ctx.exp.cwd.clone();
    for pass in ctx.exp.passes.iter_mut() {
        let cmd = format!("cd {} && msinfo.py --json {}", cwd.display(), pass.msfile);
        let output = local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
        let summary: MsSummary = serde_json::from_str(&output.stdout)
            .with_context(|| format!("msinfo.py output for {} is not valid JSON", pass.msfile))?;

        let mut antennas = Antennas::new();
        for entry in &summary.antennas {
            let mut antenna = Antenna::new(&entry.name);
            antenna.subbands = entry.subbands.clone();
            antenna.observed = !entry.subbands.is_empty();
            antennas.add(antenna)?;
            if !ctx.exp.antennas.contains(&entry.name) {
                ctx.exp.antennas.add(Antenna::new(&entry.name))?;
            }
        }
        pass.antennas = antennas;
        pass.sources = summary.sources.clone();
        for name in summary.sources {
            if !ctx.exp.sources.iter().any(|s| s.name == name) {
                ctx.exp.sources.push(Source::new(&name, SourceType::Other, false));
            }
        }
        pass.freqsetup = Some(summary.freqsetup);
    }
    Ok(ActionOutcome::Completed)
}

//! `plots`: standardplots on the pipelined pass, scraping the antennas
//! that actually produced data, and opening everything for review.

use anyhow::{Context as _, Result};
use regex::Regex;

use crate::experiment::antennas;
use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

const PLOT_LOG: &str = "standardplots.log";

/// Runs standardplots against the reference antenna and the calibrator
/// sources. The full output is kept next to the plots so the next
/// action (and the operator) can read it back.
pub async fn run_standardplots(ctx: &mut Context) -> Result<ActionOutcome> {
    let Some(pass) = ctx.exp.passes.iter().find(|p| p.pipeline).or_else(|| ctx.exp.passes.first())
    else {
        return Ok(ActionOutcome::failed("no correlator passes known; run the lisfile step first"));
    };
    let Some(refant) = ctx.exp.refant.first() else {
        return Ok(ActionOutcome::failed(
            "no reference antenna set; provide one with --refant or --edit refant=...",
        ));
    };
    let plot_sources = ctx.exp.plot_sources();
    if plot_sources.is_empty() {
        return Ok(ActionOutcome::failed(
            "no sources to plot; set them with --calsources or re-run the ms step",
        ));
    }

    let cmd = format!(
        "cd {} && standardplots -weight {} {} {}",
        ctx.exp.cwd.display(),
        pass.msfile,
        refant,
        plot_sources.join(",")
    );
    let output = local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;

    let log_path = ctx.exp.cwd.join(PLOT_LOG);
    std::fs::write(&log_path, &output.stdout)
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
    Ok(ActionOutcome::Completed)
}

/// Marks as observed, in the plotted pass, every antenna standardplots
/// listed as present in the data.
pub async fn read_observed_antennas(ctx: &mut Context) -> Result<ActionOutcome> {
    let log_path = ctx.exp.cwd.join(PLOT_LOG);
    let log = std::fs::read_to_string(&log_path)
        .with_context(|| format!("Failed to read {}", log_path.display()))?;

    let names = match scrape_antennas(&log) {
        Some(names) => names,
        None => {
            ctx.logbook.note("standardplots output listed no antennas; nothing marked observed")?;
            return Ok(ActionOutcome::Completed);
        }
    };

    let plot_index = ctx
        .exp
        .passes
        .iter()
        .position(|p| p.pipeline)
        .unwrap_or(0);
    let Some(pass) = ctx.exp.passes.get_mut(plot_index) else {
        return Ok(ActionOutcome::failed("no correlator passes known; run the lisfile step first"));
    };
    for name in &names {
        if let Some(antenna) = pass.antennas.get_mut(name) {
            antenna.observed = true;
        }
    }
    ctx.logbook.note(&format!("antennas with data: {}", names.join(", ")))?;
    Ok(ActionOutcome::Completed)
}

/// First line of the form `Antennas in the data: Ef Mc ...`.
fn scrape_antennas(log: &str) -> Option<Vec<String>> {
    let re = Regex::new(r"(?im)^antennas in the data:\s*(.+)$").ok()?;
    let captures = re.captures(log)?;
    let listed = captures.get(1)?.as_str();
    let names = antennas::parse_list(listed);
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// Opens every postscript plot for the operator to eyeball.
pub async fn open_plots(ctx: &mut Context) -> Result<ActionOutcome> {
    let cmd = format!("cd {} && for f in *.ps; do gv \"$f\" & done", ctx.exp.cwd.display());
    local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Antenna, CorrelatorPass, Source, SourceType};
    use crate::steps::testing::context;
    use tempfile::TempDir;

    fn ready(ctx: &mut Context) {
        ctx.exp.set_refant("Ef");
        ctx.exp.sources.push(Source::new("3C84", SourceType::Fringefinder, false));
        let mut pass = CorrelatorPass::new("ec089a.lis", "ec089a.ms", "ec089a_1_1.IDI", true);
        for name in ["Ef", "Mc", "Jb"] {
            pass.antennas.add(Antenna::new(name)).unwrap();
        }
        ctx.exp.passes.push(pass);
    }

    #[tokio::test]
    async fn standardplots_needs_a_refant() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        ctx.exp.passes.push(CorrelatorPass::new("a.lis", "a.ms", "a.IDI", true));
        match run_standardplots(&mut ctx).await.unwrap() {
            ActionOutcome::Failed { reason } => assert!(reason.contains("--refant")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn standardplots_runs_and_keeps_its_output() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        ready(&mut ctx);
        runner.respond("standardplots", "plotting...\nAntennas in the data: Ef Mc\n");

        run_standardplots(&mut ctx).await.unwrap();
        assert!(runner.ran("standardplots -weight ec089a.ms Ef 3C84"));
        let log = std::fs::read_to_string(dir.path().join(PLOT_LOG)).unwrap();
        assert!(log.contains("Antennas in the data"));
    }

    #[tokio::test]
    async fn observed_antennas_are_scraped_into_the_pass() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        ready(&mut ctx);
        std::fs::write(
            dir.path().join(PLOT_LOG),
            "standardplots v2\nAntennas in the data: Ef, Mc\nwrote ec089a-ampphase.ps\n",
        )
        .unwrap();

        read_observed_antennas(&mut ctx).await.unwrap();
        let pass = &ctx.exp.passes[0];
        assert_eq!(pass.antennas.observed(), vec!["Ef", "Mc"]);
        assert!(!pass.antennas.get("Jb").unwrap().observed);
        // The experiment-wide view derives from the pass.
        assert!(ctx.exp.antenna_observed("Ef"));
        assert!(!ctx.exp.antenna_observed("Jb"));
    }

    #[test]
    fn scraping_tolerates_missing_listing() {
        assert!(scrape_antennas("no such line").is_none());
        assert_eq!(
            scrape_antennas("ANTENNAS IN THE DATA: ef jb\n").unwrap(),
            vec!["Ef", "Jb"]
        );
    }
}

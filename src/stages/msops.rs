//! `msops`: operator-provided parameters applied to the measurement
//! sets, and the PI letter updated with the outcome.

use anyhow::{Context as _, Result};
use regex::Regex;

use crate::experiment::FlagWeight;
use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

/// Asks the operator for the flagging threshold and the antennas that
/// need special treatment, and records all of it in the aggregate.
/// Skipped when every pass already carries its flagging parameters, so
/// a resumed run does not re-ask.
pub async fn collect_ms_inputs(ctx: &mut Context) -> Result<ActionOutcome> {
    // One-bit stations named on the command line, before the antennas
    // were even discovered.
    let seeded = ctx.exp.special_params.get("onebit").cloned().unwrap_or_default();
    for name in &seeded {
        if let Some(ant) = ctx.exp.antennas.get_mut(name) {
            ant.onebit = true;
        }
    }

    if !ctx.exp.passes.is_empty()
        && ctx.exp.passes.iter().all(|p| p.flagged_weights.is_some())
    {
        return Ok(ActionOutcome::Completed);
    }
    if ctx.exp.passes.is_empty() {
        return Ok(ActionOutcome::failed("no correlator passes known; run the lisfile step first"));
    }

    let inputs = ctx.dialog.ask_ms_operations(&ctx.exp)?;
    for pass in ctx.exp.passes.iter_mut() {
        pass.flagged_weights = Some(FlagWeight::new(inputs.threshold));
    }
    for name in &inputs.polswap {
        if let Some(ant) = ctx.exp.antennas.get_mut(name) {
            ant.polswap = true;
        }
    }
    for name in &inputs.onebit {
        if let Some(ant) = ctx.exp.antennas.get_mut(name) {
            ant.onebit = true;
        }
    }
    for name in &inputs.polconvert {
        if let Some(ant) = ctx.exp.antennas.get_mut(name) {
            ant.polconvert = true;
        }
    }
    ctx.logbook.note(&format!(
        "ms operations: threshold {}, polswap [{}], onebit [{}], polconvert [{}]",
        inputs.threshold,
        inputs.polswap.join(", "),
        inputs.onebit.join(", "),
        inputs.polconvert.join(", ")
    ))?;
    Ok(ActionOutcome::Completed)
}

/// Fixes the Yebes focus offsets. The script no-ops when Ys is absent,
/// so it simply runs on every pass.
pub async fn run_ysfocus(ctx: &mut Context) -> Result<ActionOutcome> {
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .map(|p| format!("cd {} && ysfocus.py {}", ctx.exp.cwd.display(), p.msfile))
        .collect();
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

pub async fn run_polswap(ctx: &mut Context) -> Result<ActionOutcome> {
    let swapped = ctx.exp.antennas.polswapped();
    if swapped.is_empty() {
        return Ok(ActionOutcome::Completed);
    }
    let mut cmds = Vec::new();
    for pass in &ctx.exp.passes {
        for ant in &swapped {
            cmds.push(format!("cd {} && polswap.py {} {}", ctx.exp.cwd.display(), pass.msfile, ant));
        }
    }
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// Flags low-weight visibilities in every pass and stores the reported
/// percentage of affected data.
pub async fn run_flag_weights(ctx: &mut Context) -> Result<ActionOutcome> {
    let cwd = ctx.exp.cwd.clone();
    for pass in ctx.exp.passes.iter_mut() {
        let Some(fw) = pass.flagged_weights.as_mut() else {
            continue;
        };
        let cmd = format!("cd {} && flag_weights.py {} {}", cwd.display(), pass.msfile, fw.threshold);
        let output = local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
        match parse_flagged_percentage(&output.stdout) {
            Some(percentage) => {
                fw.percentage = Some(percentage);
                ctx.logbook.note(&format!(
                    "{}: {}% of the data flagged at threshold {}",
                    pass.msfile, percentage, fw.threshold
                ))?;
            }
            None => {
                ctx.logbook.note(&format!(
                    "{}: flag_weights reported no percentage; letter will omit it",
                    pass.msfile
                ))?;
            }
        }
    }
    Ok(ActionOutcome::Completed)
}

/// flag_weights.py reports e.g.
/// `... (after the execution).4.32% data with non-zero weights ...`
fn parse_flagged_percentage(output: &str) -> Option<f64> {
    let re = Regex::new(r"execution\)\.\s*([0-9]+(?:\.[0-9]+)?)%\s*data with non-zero").ok()?;
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

pub async fn run_onebit(ctx: &mut Context) -> Result<ActionOutcome> {
    let onebit = ctx.exp.antennas.onebit();
    if onebit.is_empty() {
        ctx.logbook.note("no one-bit stations; conversion skipped")?;
        return Ok(ActionOutcome::Completed);
    }
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .map(|p| {
            format!("cd {} && onebit.py {} {}", ctx.exp.cwd.display(), p.msfile, onebit.join(","))
        })
        .collect();
    for cmd in cmds {
        local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    }
    Ok(ActionOutcome::Completed)
}

/// Fills the credentials and flagging placeholders of the PI letter.
pub async fn update_pi_letter(ctx: &mut Context) -> Result<ActionOutcome> {
    let path = ctx.exp.cwd.join(format!("{}.piletter", ctx.exp.expname_lower()));
    let letter = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let credentials = match &ctx.exp.credentials {
        Some(c) => format!(
            "The data are protected in the EVN archive.\n\
             Username: {}\nPassword: {}\n",
            c.username(),
            c.password()
        ),
        None => String::new(),
    };

    let mut flagging = String::new();
    for pass in &ctx.exp.passes {
        if let Some(fw) = &pass.flagged_weights {
            match fw.percentage {
                Some(p) => flagging.push_str(&format!(
                    "In {}, {}% of the data were flagged (weights below {}).\n",
                    pass.msfile, p, fw.threshold
                )),
                None => flagging.push_str(&format!(
                    "In {}, visibilities with weights below {} were flagged.\n",
                    pass.msfile, fw.threshold
                )),
            }
        }
    }

    let updated = letter
        .replace("{{credentials}}", &credentials)
        .replace("{{flagging}}", &flagging);
    std::fs::write(&path, updated)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(ActionOutcome::Completed)
}

//! `antab`: the combined calibration table. Assembling it is an
//! interactive job (antab_editor.py), so the run suspends until the
//! combined file exists.

use anyhow::Result;

use crate::steps::{ActionOutcome, Context};

pub async fn combine_antab(ctx: &mut Context) -> Result<ActionOutcome> {
    let combined = ctx.exp.cwd.join(format!("{}.antab", ctx.exp.expname_lower()));
    if combined.exists() {
        ctx.logbook.note(&format!("combined antab present: {}", combined.display()))?;
        return Ok(ActionOutcome::Completed);
    }

    let missing: Vec<String> = ctx
        .exp
        .antennas
        .iter()
        .filter(|a| a.scheduled && !a.antabfsfile)
        .map(|a| a.name.clone())
        .collect();

    let mut guidance = format!(
        "combine the antab pieces into {} with antab_editor.py, then re-run",
        combined.display()
    );
    if !missing.is_empty() {
        guidance.push_str(&format!(
            " (no antab retrieved from vlbeer for: {})",
            missing.join(", ")
        ));
    }
    Ok(ActionOutcome::suspended(guidance))
}

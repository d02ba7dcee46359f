//! `last`: calibration appended to the FITS-IDI files, the PI letter
//! sent, and the final archive pass.

use anyhow::Result;

use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

pub async fn append_antab(ctx: &mut Context) -> Result<ActionOutcome> {
    let exp_lower = ctx.exp.expname_lower();
    let cmds: Vec<String> = ctx
        .exp
        .passes
        .iter()
        .map(|p| {
            format!(
                "cd {} && append_tsys.py {}.antab {}",
                ctx.exp.cwd.display(),
                exp_lower,
                p.fitsidifile
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

/// Mails the finished letter to the PI, unless the operator prefers to
/// send it by hand.
pub async fn send_pi_letter(ctx: &mut Context) -> Result<ActionOutcome> {
    if ctx.exp.email.is_empty() {
        ctx.logbook.note("no PI email on record; send the letter by hand")?;
        return Ok(ActionOutcome::Completed);
    }
    let send = ctx.dialog.confirm("Send the PI letter now?")?;
    if !send {
        ctx.logbook.note("PI letter not sent (operator will send it by hand)")?;
        return Ok(ActionOutcome::Completed);
    }

    let cmd = format!(
        "cd {} && mutt -s 'EVN experiment {} correlated' {} < {}.piletter",
        ctx.exp.cwd.display(),
        ctx.exp.expname(),
        ctx.exp.email.join(","),
        ctx.exp.expname_lower()
    );
    local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    Ok(ActionOutcome::Completed)
}

/// Re-uploads the final letter so the archive carries the polished one.
pub async fn final_archive(ctx: &mut Context) -> Result<ActionOutcome> {
    let cmd = format!(
        "cd {} && archive.pl -stnd -e {}_{} {}.piletter",
        ctx.exp.cwd.display(),
        ctx.exp.expname(),
        ctx.exp.obsdate,
        ctx.exp.expname_lower()
    );
    local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
    ctx.logbook.note("post-processing finished")?;
    Ok(ActionOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::testing::ScriptedDialog;
    use crate::dialog::MsOperationInputs;
    use crate::experiment::CorrelatorPass;
    use crate::remote::testing::ScriptedRunner;
    use crate::steps::testing::{context, context_with};
    use tempfile::TempDir;

    #[tokio::test]
    async fn antab_is_appended_to_every_fits_series() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        ctx.exp.passes.push(CorrelatorPass::new("a.lis", "a.ms", "ec089a_1_1.IDI", true));
        ctx.exp.passes.push(CorrelatorPass::new("b.lis", "b.ms", "ec089a_2_1.IDI", false));

        append_antab(&mut ctx).await.unwrap();
        assert!(runner.ran("append_tsys.py ec089a.antab ec089a_1_1.IDI"));
        assert!(runner.ran("append_tsys.py ec089a.antab ec089a_2_1.IDI"));
    }

    #[tokio::test]
    async fn letter_only_goes_out_after_confirmation() {
        let dir = TempDir::new().unwrap();
        let no_inputs = MsOperationInputs {
            threshold: 0.9,
            polswap: vec![],
            onebit: vec![],
            polconvert: vec![],
        };
        let dialog = ScriptedDialog::new(vec![false], no_inputs);
        let (mut ctx, runner) = context_with(dir.path(), ScriptedRunner::new(), dialog);
        ctx.exp.email = vec!["pi@example.org".to_string()];

        send_pi_letter(&mut ctx).await.unwrap();
        assert!(!runner.ran("mutt"));
    }

    #[tokio::test]
    async fn letter_is_mailed_to_all_recipients() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        ctx.exp.email = vec!["pi@example.org".to_string(), "copi@example.org".to_string()];

        send_pi_letter(&mut ctx).await.unwrap();
        assert!(runner.ran("mutt -s 'EVN experiment EC089A correlated' pi@example.org,copi@example.org"));
    }
}

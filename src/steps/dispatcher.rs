//! Runs the actions of one stage, persisting the aggregate after every
//! single action. At most one action's worth of work can be lost to a
//! crash, and a failed or suspended run resumes from a snapshot that
//! already contains everything the failed stage discovered.

use crate::errors::StepError;
use crate::steps::registry::Stage;
use crate::steps::{ActionOutcome, Context};

pub async fn run_stage(stage: &Stage, ctx: &mut Context) -> Result<(), StepError> {
    tracing::info!(step = stage.name, exp = ctx.exp.expname(), "starting step");
    log(ctx, &format!("step {} started", stage.name))?;

    for action in &stage.actions {
        tracing::debug!(step = stage.name, action = action.name(), "running action");
        let outcome = action.run(ctx).await;

        // Whatever just happened, the facts gathered so far are saved.
        ctx.exp.touch();
        persist(ctx)?;

        match outcome {
            Ok(ActionOutcome::Completed) => {}
            Ok(ActionOutcome::Failed { reason }) => {
                tracing::warn!(step = stage.name, action = action.name(), %reason, "action failed");
                log(ctx, &format!("step {} failed at {}: {}", stage.name, action.name(), reason))?;
                return Err(StepError::StepFailed {
                    step: stage.name.to_string(),
                    expname: ctx.exp.expname().to_string(),
                    reason,
                });
            }
            Ok(ActionOutcome::Suspended { guidance }) => {
                tracing::info!(step = stage.name, action = action.name(), "suspended");
                log(ctx, &format!(
                    "step {} suspended at {}: {}",
                    stage.name,
                    action.name(),
                    guidance
                ))?;
                return Err(StepError::AwaitingOperator {
                    step: stage.name.to_string(),
                    guidance,
                });
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(step = stage.name, action = action.name(), %reason, "action errored");
                log(ctx, &format!("step {} failed at {}: {}", stage.name, action.name(), reason))?;
                return Err(StepError::StepFailed {
                    step: stage.name.to_string(),
                    expname: ctx.exp.expname().to_string(),
                    reason,
                });
            }
        }
    }

    // Only a fully completed stage moves the checkpoint marker.
    ctx.exp.last_step = Some(stage.name.to_string());
    ctx.exp.touch();
    persist(ctx)?;
    log(ctx, &format!("step {} completed", stage.name))?;
    Ok(())
}

fn persist(ctx: &Context) -> Result<(), StepError> {
    ctx.store
        .store(&ctx.exp)
        .map_err(|e| StepError::Persistence { message: format!("{:#}", e) })
}

fn log(ctx: &Context, message: &str) -> Result<(), StepError> {
    ctx.logbook
        .note(message)
        .map_err(|e| StepError::Persistence { message: format!("{:#}", e) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::context;
    use crate::steps::Action;
    use anyhow::Result;
    use futures::future::BoxFuture;
    use tempfile::TempDir;

    fn mark(ctx: &mut Context) -> BoxFuture<'_, Result<ActionOutcome>> {
        Box::pin(async move {
            ctx.exp.piname.push("mark".to_string());
            Ok(ActionOutcome::Completed)
        })
    }

    fn boom(_ctx: &mut Context) -> BoxFuture<'_, Result<ActionOutcome>> {
        Box::pin(async move { Ok(ActionOutcome::failed("boom")) })
    }

    fn wait(_ctx: &mut Context) -> BoxFuture<'_, Result<ActionOutcome>> {
        Box::pin(async move { Ok(ActionOutcome::suspended("edit the lis file")) })
    }

    fn explode(_ctx: &mut Context) -> BoxFuture<'_, Result<ActionOutcome>> {
        Box::pin(async move { anyhow::bail!("ssh fell over") })
    }

    #[tokio::test]
    async fn completed_stage_advances_last_step() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _runner) = context(dir.path());
        let stage = Stage { name: "plots", actions: vec![Action::new("mark", mark)] };

        run_stage(&stage, &mut ctx).await.unwrap();
        assert_eq!(ctx.exp.last_step.as_deref(), Some("plots"));
        let stored = ctx.store.load("EC089A").unwrap();
        assert_eq!(stored.last_step.as_deref(), Some("plots"));

        // The run is reconstructable from the logbook alone.
        let log = std::fs::read_to_string(dir.path().join("processing.log")).unwrap();
        assert!(log.contains("step plots started"));
        assert!(log.contains("step plots completed"));
    }

    #[tokio::test]
    async fn failure_keeps_last_step_but_persists_progress() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _runner) = context(dir.path());
        let stage = Stage {
            name: "ms",
            actions: vec![
                Action::new("mark", mark),
                Action::new("boom", boom),
                Action::new("mark_again", mark),
            ],
        };

        let err = run_stage(&stage, &mut ctx).await.unwrap_err();
        match err {
            StepError::StepFailed { step, expname, reason } => {
                assert_eq!(step, "ms");
                assert_eq!(expname, "EC089A");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Work of the first action survived; the marker did not move and
        // the third action never ran.
        let stored = ctx.store.load("EC089A").unwrap();
        assert_eq!(stored.piname, vec!["mark"]);
        assert!(stored.last_step.is_none());

        let log = std::fs::read_to_string(dir.path().join("processing.log")).unwrap();
        assert!(log.contains("step ms failed at boom: boom"));
    }

    #[tokio::test]
    async fn suspension_is_not_a_failure_and_keeps_the_marker() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _runner) = context(dir.path());
        ctx.exp.last_step = Some("lisfile".to_string());
        let stage = Stage { name: "checklis", actions: vec![Action::new("wait", wait)] };

        let err = run_stage(&stage, &mut ctx).await.unwrap_err();
        match err {
            StepError::AwaitingOperator { step, guidance } => {
                assert_eq!(step, "checklis");
                assert_eq!(guidance, "edit the lis file");
            }
            other => panic!("unexpected error: {other}"),
        }
        let stored = ctx.store.load("EC089A").unwrap();
        assert_eq!(stored.last_step.as_deref(), Some("lisfile"));
    }

    #[tokio::test]
    async fn transport_errors_are_tagged_like_failures() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _runner) = context(dir.path());
        let stage = Stage { name: "tconvert", actions: vec![Action::new("explode", explode)] };

        let err = run_stage(&stage, &mut ctx).await.unwrap_err();
        match err {
            StepError::StepFailed { step, reason, .. } => {
                assert_eq!(step, "tconvert");
                assert!(reason.contains("ssh fell over"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

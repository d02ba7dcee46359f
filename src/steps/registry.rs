//! Ordered registry of post-processing steps.
//!
//! Step names are the vocabulary the operator uses to resume or replay
//! parts of a run; every requested name is validated before anything
//! executes.

use crate::errors::StepError;
use crate::stages;
use crate::steps::dispatcher::run_stage;
use crate::steps::{Action, Context};

pub struct Stage {
    pub name: &'static str,
    pub actions: Vec<Action>,
}

pub struct StepRegistry {
    stages: Vec<Stage>,
}

impl StepRegistry {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// The full EVN post-processing sequence.
    pub fn standard() -> Self {
        Self::new(vec![
            Stage {
                name: "setting_up",
                actions: vec![
                    Action::new("create_folders", |ctx| {
                        Box::pin(stages::setup::create_folders(ctx))
                    }),
                    Action::new("parse_expsum", |ctx| {
                        Box::pin(stages::setup::parse_expsum(ctx))
                    }),
                    Action::new("issue_credentials", |ctx| {
                        Box::pin(stages::setup::issue_credentials(ctx))
                    }),
                    Action::new("fetch_vlbeer_files", |ctx| {
                        Box::pin(stages::setup::fetch_vlbeer_files(ctx))
                    }),
                    Action::new("prepare_pi_letter", |ctx| {
                        Box::pin(stages::setup::prepare_pi_letter(ctx))
                    }),
                ],
            },
            Stage {
                name: "lisfile",
                actions: vec![
                    Action::new("create_lis_files", |ctx| {
                        Box::pin(stages::lisfiles::create_lis_files(ctx))
                    }),
                    Action::new("fetch_lis_files", |ctx| {
                        Box::pin(stages::lisfiles::fetch_lis_files(ctx))
                    }),
                    Action::new("parse_lis_files", |ctx| {
                        Box::pin(stages::lisfiles::parse_lis_files(ctx))
                    }),
                ],
            },
            Stage {
                name: "checklis",
                actions: vec![Action::new("check_lis_files", |ctx| {
                    Box::pin(stages::lisfiles::check_lis_files(ctx))
                })],
            },
            Stage {
                name: "ms",
                actions: vec![
                    Action::new("get_data", |ctx| Box::pin(stages::ms::get_data(ctx))),
                    Action::new("run_j2ms2", |ctx| Box::pin(stages::ms::run_j2ms2(ctx))),
                    Action::new("update_ms_expname", |ctx| {
                        Box::pin(stages::ms::update_ms_expname(ctx))
                    }),
                    Action::new("read_ms_metadata", |ctx| {
                        Box::pin(stages::ms::read_ms_metadata(ctx))
                    }),
                ],
            },
            Stage {
                name: "plots",
                actions: vec![
                    Action::new("run_standardplots", |ctx| {
                        Box::pin(stages::plots::run_standardplots(ctx))
                    }),
                    Action::new("read_observed_antennas", |ctx| {
                        Box::pin(stages::plots::read_observed_antennas(ctx))
                    }),
                    Action::new("open_plots", |ctx| Box::pin(stages::plots::open_plots(ctx))),
                ],
            },
            Stage {
                name: "msops",
                actions: vec![
                    Action::new("collect_ms_inputs", |ctx| {
                        Box::pin(stages::msops::collect_ms_inputs(ctx))
                    }),
                    Action::new("run_ysfocus", |ctx| Box::pin(stages::msops::run_ysfocus(ctx))),
                    Action::new("run_polswap", |ctx| Box::pin(stages::msops::run_polswap(ctx))),
                    Action::new("run_flag_weights", |ctx| {
                        Box::pin(stages::msops::run_flag_weights(ctx))
                    }),
                    Action::new("run_onebit", |ctx| Box::pin(stages::msops::run_onebit(ctx))),
                    Action::new("update_pi_letter", |ctx| {
                        Box::pin(stages::msops::update_pi_letter(ctx))
                    }),
                ],
            },
            Stage {
                name: "tconvert",
                actions: vec![
                    Action::new("run_tconvert", |ctx| {
                        Box::pin(stages::tconvert::run_tconvert(ctx))
                    }),
                    Action::new("check_polconvert", |ctx| {
                        Box::pin(stages::tconvert::check_polconvert(ctx))
                    }),
                ],
            },
            Stage {
                name: "post_polconvert",
                actions: vec![Action::new("recover_polconverted_fits", |ctx| {
                    Box::pin(stages::tconvert::recover_polconverted_fits(ctx))
                })],
            },
            Stage {
                name: "archive",
                actions: vec![
                    Action::new("archive_auxiliary", |ctx| {
                        Box::pin(stages::archive::archive_auxiliary(ctx))
                    }),
                    Action::new("archive_fits", |ctx| {
                        Box::pin(stages::archive::archive_fits(ctx))
                    }),
                ],
            },
            Stage {
                name: "antab",
                actions: vec![Action::new("combine_antab", |ctx| {
                    Box::pin(stages::antab::combine_antab(ctx))
                })],
            },
            Stage {
                name: "pipeinputs",
                actions: vec![
                    Action::new("prepare_pipeline_inputs", |ctx| {
                        Box::pin(stages::pipeline::prepare_inputs(ctx))
                    }),
                    Action::new("create_uvflg", |ctx| {
                        Box::pin(stages::pipeline::create_uvflg(ctx))
                    }),
                    Action::new("create_input_files", |ctx| {
                        Box::pin(stages::pipeline::create_input_files(ctx))
                    }),
                ],
            },
            Stage {
                name: "pipeline",
                actions: vec![Action::new("run_pipeline", |ctx| {
                    Box::pin(stages::pipeline::run_pipeline(ctx))
                })],
            },
            Stage {
                name: "postpipe",
                actions: vec![
                    Action::new("run_ampcal", |ctx| {
                        Box::pin(stages::pipeline::run_ampcal(ctx))
                    }),
                    Action::new("create_feedback", |ctx| {
                        Box::pin(stages::pipeline::create_feedback(ctx))
                    }),
                    Action::new("archive_pipeline_results", |ctx| {
                        Box::pin(stages::pipeline::archive_results(ctx))
                    }),
                ],
            },
            Stage {
                name: "last",
                actions: vec![
                    Action::new("append_antab", |ctx| {
                        Box::pin(stages::finalize::append_antab(ctx))
                    }),
                    Action::new("send_pi_letter", |ctx| {
                        Box::pin(stages::finalize::send_pi_letter(ctx))
                    }),
                    Action::new("final_archive", |ctx| {
                        Box::pin(stages::finalize::final_archive(ctx))
                    }),
                ],
            },
        ])
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name.to_string()).collect()
    }

    fn index_of(&self, name: &str) -> Result<usize, StepError> {
        self.stages
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| StepError::UnknownStep { name: name.to_string(), known: self.names() })
    }

    pub async fn run_all(&self, ctx: &mut Context) -> Result<(), StepError> {
        self.run_slice(0, self.stages.len(), ctx).await
    }

    /// Continues from the step after the checkpoint marker. A fresh
    /// experiment starts from the beginning; a finished one is a no-op.
    pub async fn resume(&self, ctx: &mut Context) -> Result<(), StepError> {
        let start = match ctx.exp.last_step.clone() {
            None => 0,
            Some(name) => self.index_of(&name)? + 1,
        };
        if start >= self.stages.len() {
            tracing::info!(exp = ctx.exp.expname(), "all steps already completed");
            return Ok(());
        }
        self.run_slice(start, self.stages.len(), ctx).await
    }

    pub async fn run_from(&self, name: &str, ctx: &mut Context) -> Result<(), StepError> {
        let start = self.index_of(name)?;
        self.run_slice(start, self.stages.len(), ctx).await
    }

    /// Runs `[from, to)`: `from` inclusive, `to` exclusive. Both names
    /// (and their order) are validated before any step executes.
    pub async fn run_range(&self, from: &str, to: &str, ctx: &mut Context) -> Result<(), StepError> {
        let start = self.index_of(from)?;
        let end = self.index_of(to)?;
        if end <= start {
            return Err(StepError::InvalidRange {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.run_slice(start, end, ctx).await
    }

    async fn run_slice(&self, start: usize, end: usize, ctx: &mut Context) -> Result<(), StepError> {
        for stage in self.stages.iter().take(end).skip(start) {
            run_stage(stage, ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::context;
    use crate::steps::ActionOutcome;
    use tempfile::TempDir;

    // Each run appends the marker as it stood, so tests can see which
    // stages executed and in what state.
    fn record(name: &'static str) -> Action {
        Action::new(name, |ctx| {
            Box::pin(async move {
                ctx.exp.piname.push(ctx.exp.last_step.clone().unwrap_or_default());
                Ok(ActionOutcome::Completed)
            })
        })
    }

    fn three_stage_registry() -> StepRegistry {
        StepRegistry::new(vec![
            Stage { name: "first", actions: vec![record("a")] },
            Stage { name: "second", actions: vec![record("a")] },
            Stage { name: "third", actions: vec![record("a")] },
        ])
    }

    #[tokio::test]
    async fn run_all_visits_every_stage_in_order() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        three_stage_registry().run_all(&mut ctx).await.unwrap();
        // Each action records the marker as it stood when it ran.
        assert_eq!(ctx.exp.piname, vec!["", "first", "second"]);
        assert_eq!(ctx.exp.last_step.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn resume_starts_after_the_marker() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        ctx.exp.last_step = Some("first".to_string());
        three_stage_registry().resume(&mut ctx).await.unwrap();
        assert_eq!(ctx.exp.piname, vec!["first", "second"]);
        assert_eq!(ctx.exp.last_step.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn resume_after_final_stage_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        ctx.exp.last_step = Some("third".to_string());
        three_stage_registry().resume(&mut ctx).await.unwrap();
        assert!(ctx.exp.piname.is_empty());
        assert_eq!(ctx.exp.last_step.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn unknown_names_are_rejected_before_anything_runs() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        let registry = three_stage_registry();

        let err = registry.run_from("secnod", &mut ctx).await.unwrap_err();
        match err {
            StepError::UnknownStep { name, known } => {
                assert_eq!(name, "secnod");
                assert_eq!(known, vec!["first", "second", "third"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ctx.exp.piname.is_empty(), "no step may have executed");

        let err = registry.run_range("first", "nope", &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::UnknownStep { .. }));
        assert!(ctx.exp.piname.is_empty());
    }

    #[tokio::test]
    async fn run_range_is_inclusive_exclusive() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        three_stage_registry().run_range("first", "third", &mut ctx).await.unwrap();
        // first and second ran; third did not.
        assert_eq!(ctx.exp.piname.len(), 2);
        assert_eq!(ctx.exp.last_step.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn run_range_rejects_reversed_or_empty_ranges() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        let registry = three_stage_registry();

        let err = registry.run_range("second", "second", &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidRange { .. }));
        let err = registry.run_range("third", "first", &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidRange { .. }));
        assert!(ctx.exp.piname.is_empty());
    }

    #[test]
    fn standard_registry_has_the_expected_sequence() {
        let names = StepRegistry::standard().names();
        assert_eq!(
            names,
            vec![
                "setting_up",
                "lisfile",
                "checklis",
                "ms",
                "plots",
                "msops",
                "tconvert",
                "post_polconvert",
                "archive",
                "antab",
                "pipeinputs",
                "pipeline",
                "postpipe",
                "last",
            ]
        );
    }
}

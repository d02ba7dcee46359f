//! The step machinery: actions, the dispatcher that persists after
//! every one of them, and the ordered registry the operator addresses
//! steps in.

pub mod dispatcher;
pub mod registry;

use anyhow::Result;
use futures::future::BoxFuture;

use crate::config::Config;
use crate::dialog::Dialog;
use crate::experiment::Experiment;
use crate::logbook::Logbook;
use crate::remote::RemoteRunner;
use crate::store::SnapshotStore;

/// What one action reports back. `Failed` means the run cannot
/// continue; `Suspended` means a human must act before re-running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Failed { reason: String },
    Suspended { guidance: String },
}

impl ActionOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    pub fn suspended(guidance: impl Into<String>) -> Self {
        Self::Suspended { guidance: guidance.into() }
    }
}

/// Everything an action may touch. Explicit bundle, no globals: the
/// aggregate, configuration, the command seam, the operator dialog, the
/// snapshot store and the logbook.
pub struct Context {
    pub exp: Experiment,
    pub config: Config,
    pub runner: Box<dyn RemoteRunner>,
    pub dialog: Box<dyn Dialog>,
    pub store: SnapshotStore,
    pub logbook: Logbook,
}

pub type ActionFn = for<'a> fn(&'a mut Context) -> BoxFuture<'a, Result<ActionOutcome>>;

/// A named unit of work inside a stage. Transport errors may bubble out
/// as `Err`; the dispatcher treats those exactly like `Failed`.
pub struct Action {
    name: &'static str,
    func: ActionFn,
}

impl Action {
    pub const fn new(name: &'static str, func: ActionFn) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn run(&self, ctx: &mut Context) -> Result<ActionOutcome> {
        (self.func)(ctx).await
    }
}

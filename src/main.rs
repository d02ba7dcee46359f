mod catalog;
mod cli;
mod config;
mod dialog;
mod errors;
mod experiment;
mod logbook;
mod remote;
mod stages;
mod steps;
mod store;

use anyhow::{Context as _, Result};
use clap::Parser;

use crate::cli::Cli;
use crate::config::Config;
use crate::dialog::TerminalDialog;
use crate::errors::StepError;
use crate::experiment::{antennas, Experiment};
use crate::logbook::Logbook;
use crate::remote::SshRunner;
use crate::steps::registry::StepRegistry;
use crate::steps::Context;
use crate::store::SnapshotStore;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let cwd = config.experiment_dir(&cli.supsci, &cli.expname);
    let store = SnapshotStore::new(&cwd);

    if cli.last_step {
        let exp = store.load(&cli.expname)?;
        println!("{}", exp.last_step.as_deref().unwrap_or("none"));
        return Ok(());
    }
    if cli.info {
        let exp = store.load(&cli.expname)?;
        print_summary(&exp);
        return Ok(());
    }
    if let Some(edit) = &cli.edit {
        let mut exp = store.load(&cli.expname)?;
        let key = apply_edit(&mut exp, edit)?;
        exp.touch();
        store.store(&exp)?;
        println!("{}: {} updated.", exp.expname(), key);
        return Ok(());
    }

    let runner = SshRunner::new(&config.timeouts);
    let fresh = !store.exists(&cli.expname);
    let mut exp = if fresh {
        let obs = catalog::resolve_obs_info(&runner, &config, &cli.expname).await?;
        Experiment::new(&cli.expname, &cli.supsci, obs, cwd.clone())
    } else {
        store.load(&cli.expname)?
    };
    seed_parameters(&mut exp, &cli);

    let logbook = Logbook::open(&cwd)?;
    let mut ctx = Context {
        exp,
        config,
        runner: Box::new(runner),
        dialog: Box::new(TerminalDialog),
        store,
        logbook,
    };
    // The seeds survive even if the very first action dies.
    ctx.store.store(&ctx.exp)?;

    let registry = StepRegistry::standard();
    let result = match &cli.steps {
        None => {
            if fresh {
                registry.run_all(&mut ctx).await
            } else {
                registry.resume(&mut ctx).await
            }
        }
        Some(spec) => match spec.split_once(',') {
            Some((from, to)) => registry.run_range(from.trim(), to.trim(), &mut ctx).await,
            None => registry.run_from(spec.trim(), &mut ctx).await,
        },
    };

    match result {
        Ok(()) => {
            println!(
                "{}: done (last completed step: {}).",
                ctx.exp.expname(),
                ctx.exp.last_step.as_deref().unwrap_or("none")
            );
            Ok(())
        }
        Err(StepError::AwaitingOperator { step, guidance }) => {
            println!("{}: paused at step '{}'.", ctx.exp.expname(), step);
            println!("{}", guidance);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Applies first-run parameters given on the command line.
fn seed_parameters(exp: &mut Experiment, cli: &Cli) {
    if let Some(refant) = &cli.refant {
        exp.set_refant(refant);
    }
    if let Some(calsources) = &cli.calsources {
        exp.sources_stdplot = Some(split_names(calsources));
    }
    if let Some(onebit) = &cli.onebit {
        exp.special_params.insert("onebit".to_string(), antennas::parse_list(onebit));
    }
    if let Some(par) = &cli.j2ms2par {
        exp.special_params
            .insert("j2ms2".to_string(), par.split_whitespace().map(str::to_string).collect());
    }
}

/// `--edit KEY=VALUE`. Returns the edited key.
fn apply_edit(exp: &mut Experiment, edit: &str) -> Result<String> {
    let (key, value) = edit
        .split_once('=')
        .context("expected KEY=VALUE, e.g. refant=Ef,Mc")?;
    match key.trim() {
        "refant" => exp.set_refant(value),
        "calsources" => exp.sources_stdplot = Some(split_names(value)),
        "onebit" => {
            for name in antennas::parse_list(value) {
                match exp.antennas.get_mut(&name) {
                    Some(ant) => ant.onebit = true,
                    None => anyhow::bail!(
                        "antenna {} is not part of {} ({})",
                        name,
                        exp.expname(),
                        exp.antennas.names().join(", ")
                    ),
                }
            }
        }
        other => anyhow::bail!("'{}' is not editable (try refant, calsources or onebit)", other),
    }
    Ok(key.trim().to_string())
}

fn split_names(input: &str) -> Vec<String> {
    input.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn print_summary(exp: &Experiment) {
    println!("Experiment {} observed on {}", exp.expname(), exp.obsdate);
    if let Some(eevn) = &exp.eevn_name {
        println!("  part of e-EVN run {}", eevn);
    }
    println!("  support scientist: {}", exp.supsci);
    if !exp.piname.is_empty() {
        println!("  PI: {} <{}>", exp.piname.join(", "), exp.email.join(", "));
    }
    println!("  reference antennas: {}", exp.refant.join(", "));
    if exp.antennas.is_empty() {
        println!("  antennas: not yet known");
    } else {
        println!("  antennas: {}", exp.antennas.scheduled().join(", "));
        println!("  with data: {}", exp.observed_antennas().join(", "));
    }
    if let Some(creds) = &exp.credentials {
        println!("  archive credentials: {} / {}", creds.username(), creds.password());
    }
    for pass in &exp.passes {
        println!(
            "  pass {}: ms {}, fits {}{}",
            pass.lisfile,
            pass.msfile,
            pass.fitsidifile,
            if pass.pipeline { ", pipelined" } else { "" }
        );
        if !pass.antennas.observed().is_empty() {
            println!("    with data: {}", pass.antennas.observed().join(", "));
        }
        if let Some(setup) = &pass.freqsetup {
            for antenna in pass.reduced_bandwidth_antennas() {
                println!(
                    "    {} observed a reduced band: {}/{} subbands {:?}",
                    antenna.name,
                    antenna.subbands.len(),
                    setup.n_subbands,
                    antenna.subbands
                );
            }
        }
        if let Some(fw) = &pass.flagged_weights {
            match fw.percentage {
                Some(p) => println!("    flagged {}% at threshold {}", p, fw.threshold),
                None => println!("    flagging threshold {}", fw.threshold),
            }
        }
    }
    println!("  last completed step: {}", exp.last_step.as_deref().unwrap_or("none"));
}

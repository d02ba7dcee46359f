//! Observation lookup in the EVN master project list on the correlator
//! host. This is the single place the observing date and the e-EVN
//! umbrella name are resolved; the result is stored in the snapshot and
//! never re-queried.

use anyhow::Result;

use crate::config::Config;
use crate::experiment::ObsInfo;
use crate::remote::RemoteRunner;

const MASTER_PROJECTS: &str = "/ccs/var/log2vex/MASTER_PROJECTS.LIS";

pub async fn resolve_obs_info(
    runner: &dyn RemoteRunner,
    config: &Config,
    expname: &str,
) -> Result<ObsInfo> {
    let expname = expname.to_uppercase();
    // -w so that e.g. EB123 does not also match EB123A and EB123B.
    let cmd = format!("grep -w {} {}", expname, MASTER_PROJECTS);
    let output = runner.execute(&config.hosts.ccs, &cmd).await.map_err(|e| {
        anyhow::anyhow!("{} is probably not in the EVN database ({})", expname, e)
    })?;
    parse_master_projects(&expname, &output.stdout)
}

/// The master list has one line per correlated project:
/// `EXPNAME YYYYMMDD`. e-EVN runs show up as two lines, the umbrella
/// one listing its member experiments (`EEXP YYYYMMDD EXP1 EXP2 ...`),
/// or as a single such line when the experiment named the whole run.
fn parse_master_projects(expname: &str, output: &str) -> Result<ObsInfo> {
    // Keep only lines that carry the experiment as a whole token; a
    // substring match on a sibling name must not leak in.
    let lines: Vec<Vec<&str>> = output
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<&str>>())
        .filter(|tokens| tokens.iter().any(|t| *t == expname))
        .collect();

    let (obsdate_full, eevn_name) = match lines.len() {
        1 => {
            let tokens = &lines[0];
            anyhow::ensure!(tokens.len() >= 2, "malformed master project line: {:?}", tokens);
            let eevn = if tokens.len() > 2 { tokens.first().copied() } else { None };
            (tokens.get(1).copied(), eevn)
        }
        2 => {
            let own = lines
                .iter()
                .find(|t| t.first() == Some(&expname))
                .ok_or_else(|| anyhow::anyhow!("{} not listed in its own lookup", expname))?;
            let umbrella = lines
                .iter()
                .find(|t| t.first() != Some(&expname))
                .and_then(|t| t.first().copied());
            (own.get(1).copied(), umbrella)
        }
        _ => anyhow::bail!("{} not found in the master project list", expname),
    };

    let obsdate_full =
        obsdate_full.ok_or_else(|| anyhow::anyhow!("no observing date for {}", expname))?;
    // YYYYMMDD in the list, YYMMDD everywhere downstream.
    let obsdate: String = obsdate_full.chars().skip(2).collect();
    anyhow::ensure!(
        obsdate.len() == 6 && obsdate.chars().all(|c| c.is_ascii_digit()),
        "unexpected observing date '{}' for {}",
        obsdate_full,
        expname
    );

    Ok(ObsInfo { obsdate, eevn_name: eevn_name.map(str::to_string) })
}

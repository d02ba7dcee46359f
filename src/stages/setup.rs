//! `setting_up`: experiment directory, archive credentials, station
//! files from vlbeer, and the PI letter skeleton.

use std::path::Path;

use anyhow::{Context as _, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::experiment::{antennas, Antenna, Credentials, Experiment, Source, SourceType};
use crate::stages::local_cmd;
use crate::steps::{ActionOutcome, Context};

const PASSWORD_LEN: usize = 12;

const PI_LETTER_TEMPLATE: &str = "Dear PI,\n\n\
The correlated data of your EVN experiment {{expname}} (observed on \
{{obsdate}}) are now available.\n\n\
{{credentials}}\n\
{{flagging}}\n\
Best regards,\n\
the EVN support scientists\n";

pub async fn create_folders(ctx: &mut Context) -> Result<ActionOutcome> {
    std::fs::create_dir_all(&ctx.exp.cwd)
        .with_context(|| format!("Failed to create {}", ctx.exp.cwd.display()))?;
    ctx.logbook.note(&format!("processing directory: {}", ctx.exp.cwd.display()))?;
    Ok(ActionOutcome::Completed)
}

/// Reads the experiment summary (`{exp}.expsum`) into the aggregate:
/// PI contacts, the scheduled antennas, and the sources with their
/// type and proprietary status. The file is fetched from the archive
/// host when it is not in the experiment directory yet.
pub async fn parse_expsum(ctx: &mut Context) -> Result<ActionOutcome> {
    let path = ctx.exp.cwd.join(format!("{}.expsum", ctx.exp.expname_lower()));
    if !path.exists() {
        let source = format!(
            "{}:piletters/{}.expsum",
            ctx.config.hosts.archive,
            ctx.exp.expname_lower()
        );
        ctx.logbook.command("eee", &format!("scp {} {}", source, ctx.exp.cwd.display()))?;
        if ctx.runner.transfer(&source, &ctx.exp.cwd.to_string_lossy()).await.is_err() {
            ctx.logbook.note("expsum not retrieved from the archive host")?;
        }
    }
    if !path.exists() {
        return Ok(ActionOutcome::failed(format!(
            "{} not found and not on the archive host either",
            path.display()
        )));
    }

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    apply_expsum(&mut ctx.exp, &text)?;
    ctx.logbook.note(&format!(
        "expsum parsed: {} PI contact(s), {} scheduled antennas, {} sources",
        ctx.exp.piname.len(),
        ctx.exp.antennas.len(),
        ctx.exp.sources.len()
    ))?;
    Ok(ActionOutcome::Completed)
}

fn apply_expsum(exp: &mut Experiment, text: &str) -> Result<()> {
    for line in text.lines() {
        if line.contains("Principal Investigator:") || line.contains("co-I information") {
            if let Some((name, email)) = parse_contact(line) {
                if !exp.piname.contains(&name) {
                    exp.piname.push(name);
                    exp.email.push(email);
                }
            }
        } else if let Some((_, rest)) = line.split_once("scheduled telescopes:") {
            for name in antennas::parse_list(rest) {
                if let Some(antenna) = exp.antennas.get_mut(&name) {
                    antenna.scheduled = true;
                } else {
                    exp.antennas.add(Antenna::new(&name))?;
                }
            }
        } else if line.contains("src = ") {
            if let Some(source) = parse_source(line) {
                if !exp.sources.iter().any(|s| s.name == source.name) {
                    exp.sources.push(source);
                }
            }
        }
    }

    // One-bit stations named on the command line, now that the
    // scheduled antennas are known.
    let seeded = exp.special_params.get("onebit").cloned().unwrap_or_default();
    for name in &seeded {
        if let Some(antenna) = exp.antennas.get_mut(name) {
            antenna.onebit = true;
        }
    }
    Ok(())
}

/// `Principal Investigator: SURNAME (EMAIL)`, or the same shape with a
/// `co-I information` prefix (with or without the colon).
fn parse_contact(line: &str) -> Option<(String, String)> {
    let rest = line.split_once(':').map_or(line, |(_, r)| r);
    let rest = rest.replace("co-I information", "");
    let (name, rest) = rest.split_once('(')?;
    let (email, _) = rest.split_once(')')?;
    let name = name.trim().to_string();
    let email = email.trim().to_string();
    if name.is_empty() || email.is_empty() {
        return None;
    }
    Some((name, email))
}

/// `src = NAME, type = TYPE (note), use = YES/NO (note)`. `use = NO`
/// means the source data stay proprietary.
fn parse_source(line: &str) -> Option<Source> {
    let mut name = None;
    let mut kind = SourceType::Other;
    let mut protected = false;
    for field in line.split(',') {
        let (key, value) = field.split_once('=')?;
        let value = value.split_once('(').map_or(value, |(v, _)| v).trim();
        match key.trim() {
            "src" => name = Some(value.to_string()),
            "type" => {
                kind = match value {
                    "target" => SourceType::Target,
                    "reference" => SourceType::PhaseCal,
                    "fringefinder" | "calibrator" => SourceType::Fringefinder,
                    _ => SourceType::Other,
                }
            }
            "use" => protected = value == "NO",
            _ => {}
        }
    }
    Some(Source::new(&name?, kind, protected))
}

/// Issues (or recovers) the archive credentials for the experiment.
///
/// The credential marker is a `username_password.auth` file in the
/// experiment directory: exactly one means a previous run already
/// issued credentials and they must be reused; more than one is
/// unrecoverable without the operator cleaning up; none means this is
/// the first run and a fresh password gets generated.
pub async fn issue_credentials(ctx: &mut Context) -> Result<ActionOutcome> {
    if ctx.exp.is_test_experiment() {
        ctx.logbook.note("test experiment: no archive credentials needed")?;
        return Ok(ActionOutcome::Completed);
    }
    if ctx.exp.credentials.is_some() {
        return Ok(ActionOutcome::Completed);
    }

    let markers = find_auth_markers(ctx)?;
    match markers.len() {
        0 => {
            let username = ctx.exp.expname_lower();
            let password = generate_password();
            let marker = ctx.exp.cwd.join(format!("{}_{}.auth", username, password));
            std::fs::write(&marker, "")
                .with_context(|| format!("Failed to create {}", marker.display()))?;
            let cmd = format!("pipelet.py {} {}", username, ctx.exp.supsci);
            local_cmd(ctx.runner.as_ref(), &ctx.logbook, &cmd).await?;
            ctx.logbook.note(&format!("issued archive credentials for user {}", username))?;
            ctx.exp.credentials = Some(Credentials::new(&username, &password));
            Ok(ActionOutcome::Completed)
        }
        1 => match parse_auth_marker(&markers[0]) {
            Some((username, password)) => {
                ctx.logbook.note(&format!("reusing archive credentials for user {}", username))?;
                ctx.exp.credentials = Some(Credentials::new(&username, &password));
                Ok(ActionOutcome::Completed)
            }
            None => Ok(ActionOutcome::failed(format!(
                "auth marker '{}' is not in username_password.auth form",
                markers[0]
            ))),
        },
        n => Ok(ActionOutcome::failed(format!(
            "{} auth marker files found in {} (expected at most one): {}",
            n,
            ctx.exp.cwd.display(),
            markers.join(", ")
        ))),
    }
}

fn find_auth_markers(ctx: &Context) -> Result<Vec<String>> {
    let mut markers = Vec::new();
    let entries = std::fs::read_dir(&ctx.exp.cwd)
        .with_context(|| format!("Failed to list {}", ctx.exp.cwd.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", ctx.exp.cwd.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".auth") && name.contains('_') {
            markers.push(name);
        }
    }
    markers.sort();
    Ok(markers)
}

/// `username_password.auth` -> (username, password).
fn parse_auth_marker(filename: &str) -> Option<(String, String)> {
    let stem = filename.strip_suffix(".auth")?;
    let (username, password) = stem.split_once('_')?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Pulls the station log and antab files from vlbeer with one wildcard
/// transfer per kind, then derives the per-antenna flags from the file
/// names that actually arrived.
pub async fn fetch_vlbeer_files(ctx: &mut Context) -> Result<ActionOutcome> {
    let date = ctx.exp.obsdatetime()?;
    // vlbeer archives by observing month, e.g. vlbi_arch/mar24.
    let month_dir = date.format("%b%y").to_string().to_lowercase();
    let exp_lower = ctx.exp.expname_lower();
    let cwd = ctx.exp.cwd.clone();

    for ext in ["log", "antabfs"] {
        let remote = format!(
            "{}:vlbi_arch/{}/{}*.{}",
            ctx.config.hosts.vlbeer, month_dir, exp_lower, ext
        );
        ctx.logbook.command("eee", &format!("scp {} {}", remote, cwd.display()))?;
        if ctx.runner.transfer(&remote, &cwd.to_string_lossy()).await.is_err() {
            ctx.logbook.note(&format!("no .{} files for {} on vlbeer yet", ext, exp_lower))?;
            continue;
        }
        for station in stations_with_files(&cwd, &exp_lower, ext)? {
            let Some(antenna) = ctx.exp.antennas.get_mut(&station) else {
                ctx.logbook.note(&format!(
                    ".{} file arrived for {}, which is not in the schedule",
                    ext, station
                ))?;
                continue;
            };
            match ext {
                "log" => antenna.logfsfile = true,
                _ => antenna.antabfsfile = true,
            }
        }
    }

    let with_antab = ctx.exp.antennas.iter().filter(|a| a.antabfsfile).count();
    ctx.logbook.note(&format!(
        "vlbeer files retrieved: {}/{} antennas have an antab",
        with_antab,
        ctx.exp.antennas.len()
    ))?;
    Ok(ActionOutcome::Completed)
}

/// Local `{exp}{station}.{ext}` files, as normalized antenna names.
fn stations_with_files(cwd: &Path, exp_lower: &str, ext: &str) -> Result<Vec<String>> {
    let suffix = format!(".{}", ext);
    let mut stations = Vec::new();
    let entries = std::fs::read_dir(cwd)
        .with_context(|| format!("Failed to list {}", cwd.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", cwd.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(stem) = name.strip_suffix(&suffix) else { continue };
        let Some(station) = stem.strip_prefix(exp_lower) else { continue };
        if !station.is_empty() && station.chars().all(|c| c.is_ascii_alphanumeric()) {
            stations.push(antennas::normalize_name(station));
        }
    }
    stations.sort();
    Ok(stations)
}

pub async fn prepare_pi_letter(ctx: &mut Context) -> Result<ActionOutcome> {
    let path = ctx.exp.cwd.join(format!("{}.piletter", ctx.exp.expname_lower()));
    if path.exists() {
        return Ok(ActionOutcome::Completed);
    }
    let letter = PI_LETTER_TEMPLATE
        .replace("{{expname}}", ctx.exp.expname())
        .replace("{{obsdate}}", &ctx.exp.obsdate);
    std::fs::write(&path, letter)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    ctx.logbook.note(&format!("PI letter template at {}", path.display()))?;
    Ok(ActionOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::context;
    use tempfile::TempDir;

    #[tokio::test]
    async fn first_run_generates_and_marks_credentials() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());

        let outcome = issue_credentials(&mut ctx).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Completed);

        let creds = ctx.exp.credentials.clone().unwrap();
        assert_eq!(creds.username(), "ec089a");
        assert_eq!(creds.password().len(), PASSWORD_LEN);
        assert!(creds.password().chars().all(|c| c.is_ascii_alphanumeric()));

        let marker = dir.path().join(format!("ec089a_{}.auth", creds.password()));
        assert!(marker.exists());
        assert!(runner.ran("pipelet.py ec089a marcote"));
    }

    #[tokio::test]
    async fn single_marker_is_reused_without_generating() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        std::fs::write(dir.path().join("ec089a_s3cr3tWord1.auth"), "").unwrap();

        issue_credentials(&mut ctx).await.unwrap();
        let creds = ctx.exp.credentials.clone().unwrap();
        assert_eq!(creds.username(), "ec089a");
        assert_eq!(creds.password(), "s3cr3tWord1");
        assert!(!runner.ran("pipelet.py"), "must not re-issue");
    }

    #[tokio::test]
    async fn multiple_markers_fail_the_step() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        std::fs::write(dir.path().join("ec089a_aaa.auth"), "").unwrap();
        std::fs::write(dir.path().join("ec089a_bbb.auth"), "").unwrap();

        match issue_credentials(&mut ctx).await.unwrap() {
            ActionOutcome::Failed { reason } => {
                assert!(reason.contains("2 auth marker files"));
                assert!(reason.contains("ec089a_aaa.auth"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(ctx.exp.credentials.is_none());
    }

    #[tokio::test]
    async fn test_experiments_get_no_credentials() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        let obs = crate::experiment::ObsInfo { obsdate: "240312".to_string(), eevn_name: None };
        ctx.exp = crate::experiment::Experiment::new("N24C1", "m", obs, dir.path().to_path_buf());

        let outcome = issue_credentials(&mut ctx).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Completed);
        assert!(ctx.exp.credentials.is_none());
        assert!(!runner.ran("pipelet.py"));
    }

    #[tokio::test]
    async fn rerun_with_stored_credentials_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        ctx.exp.credentials = Some(Credentials::new("ec089a", "alreadythere"));
        issue_credentials(&mut ctx).await.unwrap();
        assert_eq!(ctx.exp.credentials.clone().unwrap().password(), "alreadythere");
        assert!(!runner.ran("pipelet.py"));
    }

    #[test]
    fn auth_marker_parsing() {
        assert_eq!(
            parse_auth_marker("ec089a_pass123.auth"),
            Some(("ec089a".to_string(), "pass123".to_string()))
        );
        // Password may itself contain underscores; only the first splits.
        assert_eq!(
            parse_auth_marker("user_pa_ss.auth"),
            Some(("user".to_string(), "pa_ss".to_string()))
        );
        assert_eq!(parse_auth_marker("_nopass.auth"), None);
        assert_eq!(parse_auth_marker("plain.auth"), None);
    }

    const EXPSUM: &str = "\
Principal Investigator: Surname (pi@example.org)\n\
co-I information Other Name (copi@example.org)\n\
12 scheduled telescopes: Ef Mc O8\n\
2 correlator passes\n\
src = 3C84, type = fringefinder (arbitrary note), use = YES (public)\n\
src = J1159+2914, type = reference (phase cal), use = YES\n\
src = MYSRC, type = target (the science), use = NO (proprietary)\n";

    #[tokio::test]
    async fn expsum_populates_contacts_antennas_and_sources() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        std::fs::write(dir.path().join("ec089a.expsum"), EXPSUM).unwrap();

        let outcome = parse_expsum(&mut ctx).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Completed);

        assert_eq!(ctx.exp.piname, vec!["Surname", "Other Name"]);
        assert_eq!(ctx.exp.email, vec!["pi@example.org", "copi@example.org"]);
        assert_eq!(ctx.exp.antennas.scheduled(), vec!["Ef", "Mc", "O8"]);

        let target = ctx.exp.sources.iter().find(|s| s.name == "MYSRC").unwrap();
        assert_eq!(target.kind, SourceType::Target);
        assert!(target.protected);
        let ff = ctx.exp.sources.iter().find(|s| s.name == "3C84").unwrap();
        assert_eq!(ff.kind, SourceType::Fringefinder);
        assert!(!ff.protected);
        let cal = ctx.exp.sources.iter().find(|s| s.name == "J1159+2914").unwrap();
        assert_eq!(cal.kind, SourceType::PhaseCal);
    }

    #[tokio::test]
    async fn expsum_applies_onebit_seeds_to_fresh_antennas() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        ctx.exp.special_params.insert("onebit".to_string(), vec!["O8".to_string()]);
        std::fs::write(dir.path().join("ec089a.expsum"), EXPSUM).unwrap();

        parse_expsum(&mut ctx).await.unwrap();
        assert_eq!(ctx.exp.antennas.onebit(), vec!["O8"]);
    }

    #[tokio::test]
    async fn missing_expsum_is_requested_from_the_archive_host() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());

        // The scripted transfer delivers nothing, so the action fails
        // after trying the archive host.
        match parse_expsum(&mut ctx).await.unwrap() {
            ActionOutcome::Failed { reason } => assert!(reason.contains("ec089a.expsum")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(runner.ran("piletters/ec089a.expsum"));
    }

    #[tokio::test]
    async fn vlbeer_fetch_flags_antennas_from_the_arrived_files() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, runner) = context(dir.path());
        for name in ["Ef", "Mc"] {
            ctx.exp.antennas.add(Antenna::new(name)).unwrap();
        }
        // What the wildcard scp would have dropped into the directory.
        std::fs::write(dir.path().join("ec089aef.log"), "").unwrap();
        std::fs::write(dir.path().join("ec089aef.antabfs"), "").unwrap();
        std::fs::write(dir.path().join("ec089amc.log"), "").unwrap();

        let outcome = fetch_vlbeer_files(&mut ctx).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Completed);

        // One transfer per kind, by wildcard, not per antenna.
        assert!(runner.ran("vlbi_arch/mar24/ec089a*.log"));
        assert!(runner.ran("vlbi_arch/mar24/ec089a*.antabfs"));

        let ef = ctx.exp.antennas.get("Ef").unwrap();
        assert!(ef.logfsfile && ef.antabfsfile);
        let mc = ctx.exp.antennas.get("Mc").unwrap();
        assert!(mc.logfsfile);
        assert!(!mc.antabfsfile);
    }

    #[tokio::test]
    async fn pi_letter_is_created_once() {
        let dir = TempDir::new().unwrap();
        let (mut ctx, _) = context(dir.path());
        prepare_pi_letter(&mut ctx).await.unwrap();

        let path = dir.path().join("ec089a.piletter");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("EC089A"));
        assert!(text.contains("240312"));

        std::fs::write(&path, "edited by hand").unwrap();
        prepare_pi_letter(&mut ctx).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited by hand");
    }
}

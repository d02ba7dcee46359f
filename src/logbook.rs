//! Append-only per-experiment logbook.
//!
//! `processing.log` in the experiment directory records, with
//! timestamps, every command the tool ran and every notable event, so
//! the operator can reconstruct (or redo by hand) the whole session.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

pub struct Logbook {
    path: PathBuf,
    file: Mutex<File>,
}

impl std::fmt::Debug for Logbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logbook").field("path", &self.path).finish()
    }
}

impl Logbook {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
        let path = dir.join("processing.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open logbook {}", path.display()))?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Timestamped free-form note.
    pub fn note(&self, message: &str) -> Result<()> {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.write_line(&format!("[{}] {}", ts, message))
    }

    /// Records a command exactly as it was run, with the host it ran on.
    pub fn command(&self, host: &str, command: &str) -> Result<()> {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.write_line(&format!("[{}] {} > {}", ts, host, command))
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("logbook lock poisoned"))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn notes_and_commands_append_in_order() {
        let dir = TempDir::new().unwrap();
        let log = Logbook::open(dir.path()).unwrap();
        log.note("starting lisfile step").unwrap();
        log.command("jops@ccs", "make_lis -e E24C1").unwrap();

        let text = std::fs::read_to_string(dir.path().join("processing.log")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("starting lisfile step"));
        assert!(lines[1].contains("jops@ccs > make_lis -e E24C1"));
    }

    #[test]
    fn reopening_appends_rather_than_truncates() {
        let dir = TempDir::new().unwrap();
        {
            let log = Logbook::open(dir.path()).unwrap();
            log.note("first run").unwrap();
        }
        let log = Logbook::open(dir.path()).unwrap();
        log.note("second run").unwrap();
        let text = std::fs::read_to_string(dir.path().join("processing.log")).unwrap();
        assert!(text.contains("first run"));
        assert!(text.contains("second run"));
    }
}

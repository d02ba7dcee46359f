//! Operator interaction seam.
//!
//! Stages that need a human decision go through [`Dialog`]; the
//! terminal implementation re-prompts until the input is valid, and
//! tests use a scripted implementation.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::experiment::{antennas, Experiment};

/// Parameters the operator provides before the measurement sets are
/// flagged and converted.
#[derive(Debug, Clone)]
pub struct MsOperationInputs {
    /// Weight threshold in (0, 1): visibilities below it get flagged.
    pub threshold: f64,
    pub polswap: Vec<String>,
    pub onebit: Vec<String>,
    pub polconvert: Vec<String>,
}

pub trait Dialog: Send + Sync {
    fn confirm(&self, question: &str) -> Result<bool>;
    fn ask_ms_operations(&self, exp: &Experiment) -> Result<MsOperationInputs>;
}

/// Interactive terminal dialog (stdin/stdout).
#[derive(Debug, Default)]
pub struct TerminalDialog;

impl TerminalDialog {
    fn read_line(prompt: &str) -> Result<String> {
        print!("{} ", prompt);
        std::io::stdout().flush().context("Failed to flush stdout")?;
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        Ok(line.trim().to_string())
    }

    fn ask_threshold() -> Result<f64> {
        loop {
            let line = Self::read_line("Threshold for flagging weights in the MS (0-1):")?;
            match line.parse::<f64>() {
                Ok(v) if v > 0.0 && v < 1.0 => return Ok(v),
                Ok(v) => println!("The threshold must lie within (0.0, 1.0), got {v}."),
                Err(_) => println!("Could not parse '{line}' as a number."),
            }
        }
    }

    /// Asks for a (possibly empty) antenna list and validates every name
    /// against the experiment.
    fn ask_antennas(exp: &Experiment, prompt: &str) -> Result<Vec<String>> {
        loop {
            let line = Self::read_line(prompt)?;
            let names = antennas::parse_list(&line);
            match names.iter().find(|n| !exp.antennas.contains(n)) {
                None => return Ok(names),
                Some(unknown) => println!(
                    "Antenna {} not recognized (experiment has: {}).",
                    unknown,
                    exp.antennas.names().join(", ")
                ),
            }
        }
    }
}

impl Dialog for TerminalDialog {
    fn confirm(&self, question: &str) -> Result<bool> {
        loop {
            let line = Self::read_line(&format!("{} (y/n):", question))?;
            match line.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => println!("Please answer y or n."),
            }
        }
    }

    fn ask_ms_operations(&self, exp: &Experiment) -> Result<MsOperationInputs> {
        Ok(MsOperationInputs {
            threshold: Self::ask_threshold()?,
            polswap: Self::ask_antennas(exp, "Antennas requiring a polswap (comma separated):")?,
            onebit: Self::ask_antennas(exp, "Antennas that recorded one-bit data:")?,
            polconvert: Self::ask_antennas(exp, "Antennas requiring PolConvert:")?,
        })
    }
}

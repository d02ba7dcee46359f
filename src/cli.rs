use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postprocess")]
#[command(about = "EVN post-processing of correlated experiments")]
#[command(version)]
pub struct Cli {
    /// Experiment code (e.g. EB123A)
    pub expname: String,

    /// Supporting scientist id
    pub supsci: String,

    /// Reference antenna(s), comma or space separated
    #[arg(long)]
    pub refant: Option<String>,

    /// Sources to use for the standard plots, comma separated
    #[arg(long)]
    pub calsources: Option<String>,

    /// Antennas that recorded one-bit data
    #[arg(long)]
    pub onebit: Option<String>,

    /// Extra parameters to append to every j2ms2 run
    #[arg(long)]
    pub j2ms2par: Option<String>,

    /// Steps to run: FROM (to the end) or FROM,TO (TO excluded).
    /// Without it, the run resumes after the last completed step.
    #[arg(long)]
    pub steps: Option<String>,

    /// Edit a stored parameter (refant=..., calsources=..., onebit=...)
    /// without running anything
    #[arg(long)]
    pub edit: Option<String>,

    /// Print the stored experiment summary and exit
    #[arg(long)]
    pub info: bool,

    /// Print the last completed step and exit
    #[arg(long)]
    pub last_step: bool,

    /// Alternative configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positionals_and_steps_parse() {
        let cli = Cli::parse_from(["postprocess", "ec089a", "marcote", "--steps", "ms,tconvert"]);
        assert_eq!(cli.expname, "ec089a");
        assert_eq!(cli.supsci, "marcote");
        assert_eq!(cli.steps.as_deref(), Some("ms,tconvert"));
        assert!(!cli.info);
    }

    #[test]
    fn edit_takes_a_key_value_pair() {
        let cli = Cli::parse_from(["postprocess", "ec089a", "marcote", "--edit", "refant=Ef,Mc"]);
        assert_eq!(cli.edit.as_deref(), Some("refant=Ef,Mc"));
    }
}

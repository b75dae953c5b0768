use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use offer_capture::config::PipelineConfig;

#[derive(Debug, Parser)]
#[command(
    name = "offer-capture",
    about = "Replay screenshots through the ride offer pipeline and record accepted offers",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Directory of PNG or JPEG screenshots, replayed in name order
    #[arg(value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Time between consecutive screenshots, in milliseconds
    #[arg(
        long = "spacing-ms",
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub spacing_ms: u64,

    /// Keep the configured vote counts instead of accepting a single reading
    #[arg(long = "keep-votes")]
    pub keep_votes: bool,
}

impl CliArgs {
    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }

    /// Screenshots are usually further apart than the stability window, so
    /// one reading has to be enough unless asked otherwise.
    pub fn apply_replay_votes(&self, config: &mut PipelineConfig) {
        if self.keep_votes {
            return;
        }
        config.stability.votes_complete = 1;
        config.stability.votes_partial = 1;
        log::info!("Replay accepts an offer after a single reading");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = CliArgs::try_parse_from(["offer-capture", "shots"]).unwrap();
        assert_eq!(args.input_dir, PathBuf::from("shots"));
        assert!(args.config.is_none());
        assert!(!args.verbose);
        assert_eq!(args.spacing(), Duration::from_secs(2));
        assert!(!args.keep_votes);
    }

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::try_parse_from([
            "offer-capture",
            "shots",
            "--config",
            "custom.json",
            "-v",
            "--spacing-ms",
            "500",
            "--keep-votes",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("custom.json")));
        assert!(args.verbose);
        assert_eq!(args.spacing_ms, 500);
        assert!(args.keep_votes);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(CliArgs::try_parse_from(["offer-capture"]).is_err());
        assert!(CliArgs::try_parse_from(["offer-capture", "shots", "--spacing-ms", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["offer-capture", "a", "b"]).is_err());
    }

    #[test]
    fn test_replay_votes() {
        let mut config = PipelineConfig::default();
        let args = CliArgs::try_parse_from(["offer-capture", "shots"]).unwrap();
        args.apply_replay_votes(&mut config);
        assert_eq!(config.stability.votes_complete, 1);
        assert_eq!(config.stability.votes_partial, 1);

        let mut config = PipelineConfig::default();
        let args = CliArgs::try_parse_from(["offer-capture", "shots", "--keep-votes"]).unwrap();
        args.apply_replay_votes(&mut config);
        assert_eq!(config.stability, PipelineConfig::default().stability);
    }
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "persona-chat")]
#[command(
    about = "Chat with an AI stand-in that answers as you, from your biography and resume",
    long_about = "Chat with an AI stand-in that answers as you, from your biography and resume\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default probe path when --config is not provided:\n    1. $XDG_CONFIG_HOME/persona-chat/config.toml\n    2. ~/.config/persona-chat/config.toml\n\nEnvironment variables (and .env) override file values."
)]
pub struct CliArgs {
    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug diagnostics and redacted HTTP exchanges to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip the evaluator pass and return first-draft replies.
    #[arg(long)]
    pub no_evaluate: bool,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn parse_defaults() {
        let args = CliArgs::try_parse_from(["persona-chat"]).expect("should parse");
        assert_eq!(args.config, None);
        assert!(!args.verbose);
        assert!(!args.no_evaluate);
    }

    #[test]
    fn parse_all_flags() {
        let args = CliArgs::try_parse_from([
            "persona-chat",
            "--config",
            "/tmp/custom.toml",
            "-v",
            "--no-evaluate",
        ])
        .expect("parse");
        assert_eq!(
            args.config.as_deref(),
            Some(std::path::Path::new("/tmp/custom.toml"))
        );
        assert!(args.verbose);
        assert!(args.no_evaluate);
    }

    #[test]
    fn reject_unknown_flag() {
        assert!(CliArgs::try_parse_from(["persona-chat", "--theme", "dark"]).is_err());
    }
}

use std::num::NonZeroUsize;
use std::str::FromStr;

use thiserror::Error;

/// Slash commands understood by the chat loop. Anything else is a message
/// for the persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    History(Option<NonZeroUsize>),
    Reset,
    Trace,
    Steps(Option<bool>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CommandError {
    #[error("commands start with '/'")]
    NotACommand,
    #[error("empty command. Try /help")]
    Empty,
    #[error("unknown command '/{0}'. Try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

const COMMANDS: [(&str, &str); 5] = [
    ("/help", "Show this command list"),
    ("/history [n]", "Show the conversation so far, or its last n messages"),
    ("/reset", "Forget the conversation and start over"),
    ("/trace", "Show where this session's trace file is"),
    ("/steps [on|off]", "Show or hide tool calls and evaluator verdicts"),
];

const EXIT_WORDS: [&str; 2] = ["quit", "exit"];

pub(crate) fn help_text() -> String {
    let mut text = String::from("Available commands:");
    for (usage, summary) in COMMANDS {
        text.push_str(&format!("\n  {usage:<16} {summary}"));
    }
    text.push_str(&format!("\n  {:<16} Leave the chat", EXIT_WORDS.join(" | ")));
    text
}

pub(crate) fn is_exit_line(line: &str) -> bool {
    EXIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let body = line
            .trim()
            .strip_prefix('/')
            .ok_or(CommandError::NotACommand)?;
        let (name, arg) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(name, arg)| (name, arg.trim()));
        if name.is_empty() {
            return Err(CommandError::Empty);
        }

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("help", "") => Ok(Self::Help),
            ("reset", "") => Ok(Self::Reset),
            ("trace", "") => Ok(Self::Trace),
            ("history", "") => Ok(Self::History(None)),
            ("history", count) => count
                .parse()
                .map(|count| Self::History(Some(count)))
                .map_err(|_| CommandError::Usage("/history [n] with n >= 1")),
            ("steps", "") => Ok(Self::Steps(None)),
            ("steps", "on") => Ok(Self::Steps(Some(true))),
            ("steps", "off") => Ok(Self::Steps(Some(false))),
            ("steps", _) => Err(CommandError::Usage("/steps [on|off]")),
            ("help" | "reset" | "trace", _) => Err(CommandError::Usage("this command takes no argument")),
            _ => Err(CommandError::Unknown(name.to_string())),
        }
    }
}

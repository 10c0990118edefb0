use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::commands::{Command, help_text, is_exit_line};
use crate::agent::{ChatEvent, Chatbot};
use crate::llm::provider::{ChatMessage, LlmProvider};
use crate::trace::{SessionTrace, TraceRecord};

pub const PROMPT: &str = "you> ";

/// Everything one chat session owns. The history only ever holds completed
/// visitor/reply pairs.
pub struct AppState<P> {
    pub session_id: String,
    pub chatbot: Chatbot<P>,
    pub history: Vec<ChatMessage>,
    pub show_steps: bool,
    pub trace: SessionTrace,
}

impl<P: LlmProvider> AppState<P> {
    pub fn new(session_id: String, chatbot: Chatbot<P>, trace: SessionTrace) -> Self {
        Self {
            session_id,
            chatbot,
            history: Vec::new(),
            show_steps: false,
            trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Continue,
    Exit,
}

pub async fn run_repl<P: LlmProvider>(state: &mut AppState<P>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    run_repl_with(state, stdin, &mut stdout).await
}

pub(crate) async fn run_repl_with<P, R, W>(
    state: &mut AppState<P>,
    reader: R,
    out: &mut W,
) -> Result<()>
where
    P: LlmProvider,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(
        out,
        "Chatting with {}. Type /help for commands, quit to leave.",
        state.chatbot.identity().name()
    )?;
    tracing::info!(session = %state.session_id, "chat session started");

    let mut lines = reader.lines();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        if handle_line(state, line.trim(), out).await? == LineOutcome::Exit {
            break;
        }
    }

    writeln!(out, "Goodbye!")?;
    Ok(())
}

pub(crate) async fn handle_line<P: LlmProvider, W: Write>(
    state: &mut AppState<P>,
    line: &str,
    out: &mut W,
) -> Result<LineOutcome> {
    if line.is_empty() {
        return Ok(LineOutcome::Continue);
    }
    if is_exit_line(line) {
        return Ok(LineOutcome::Exit);
    }
    if line.starts_with('/') {
        match line.parse::<Command>() {
            Ok(command) => run_command(state, command, out)?,
            Err(err) => writeln!(out, "{err}")?,
        }
        return Ok(LineOutcome::Continue);
    }

    run_turn(state, line, out).await?;
    Ok(LineOutcome::Continue)
}

fn run_command<P: LlmProvider, W: Write>(
    state: &mut AppState<P>,
    command: Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Help => writeln!(out, "{}", help_text())?,
        Command::History(limit) => {
            if state.history.is_empty() {
                writeln!(out, "No messages yet.")?;
                return Ok(());
            }
            let skip = limit.map_or(0, |n| state.history.len().saturating_sub(n.get()));
            for message in &state.history[skip..] {
                writeln!(
                    out,
                    "[{}] {}",
                    message.role(),
                    message.text().unwrap_or_default()
                )?;
            }
        }
        Command::Reset => {
            state.history.clear();
            state.trace.record(TraceRecord::HistoryReset);
            writeln!(out, "Conversation cleared.")?;
        }
        Command::Trace => writeln!(out, "Trace file: {}", state.trace.file_path().display())?,
        Command::Steps(None) => writeln!(
            out,
            "Steps are {}.",
            if state.show_steps { "on" } else { "off" }
        )?,
        Command::Steps(Some(enabled)) => {
            state.show_steps = enabled;
            writeln!(out, "Steps {}.", if enabled { "on" } else { "off" })?;
        }
    }
    Ok(())
}

async fn run_turn<P: LlmProvider, W: Write>(
    state: &mut AppState<P>,
    message: &str,
    out: &mut W,
) -> Result<()> {
    state.trace.record(TraceRecord::VisitorTurn { text: message });

    let mut events = Vec::new();
    let result = state
        .chatbot
        .chat_with_events(message, &state.history, &mut |event| events.push(event))
        .await;

    for event in &events {
        state.trace.record(event_record(event));
        if state.show_steps {
            writeln!(out, "  · {}", describe_event(event))?;
        }
    }

    match result {
        Ok(reply) => {
            state.trace.record(TraceRecord::Reply { text: &reply });
            writeln!(out, "{}: {reply}", state.chatbot.identity().name())?;
            state.history.push(ChatMessage::user(message));
            state.history.push(ChatMessage::assistant(reply));
        }
        Err(err) => {
            tracing::warn!(error = %err, "chat turn failed");
            state.trace.record(TraceRecord::TurnFailed {
                error: err.to_string(),
            });
            writeln!(out, "Sorry, I couldn't answer that right now ({err}).")?;
        }
    }
    Ok(())
}

fn event_record(event: &ChatEvent) -> TraceRecord<'_> {
    match event {
        ChatEvent::ToolRequest {
            round,
            id,
            name,
            arguments,
        } => TraceRecord::ToolCall {
            round: *round,
            id,
            name,
            arguments,
        },
        ChatEvent::ToolResult { round, id, content } => TraceRecord::ToolResult {
            round: *round,
            id,
            content,
        },
        ChatEvent::Evaluated {
            is_acceptable,
            feedback,
        } => TraceRecord::Verdict {
            accepted: *is_acceptable,
            feedback,
        },
        ChatEvent::Revised => TraceRecord::Revised,
    }
}

fn describe_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::ToolRequest {
            round,
            id,
            name,
            arguments,
        } => format!("round {round}: {name}({arguments}) [{id}]"),
        ChatEvent::ToolResult { round, id, content } => {
            format!("round {round}: [{id}] -> {content}")
        }
        ChatEvent::Evaluated {
            is_acceptable: true,
            feedback,
        } => format!("evaluator accepted: {feedback}"),
        ChatEvent::Evaluated {
            is_acceptable: false,
            feedback,
        } => format!("evaluator rejected: {feedback}"),
        ChatEvent::Revised => "reply revised after rejection".to_string(),
    }
}

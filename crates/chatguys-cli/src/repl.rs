//! Interactive read-dispatch-print loop

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, warn};

use chatguys_core::{ChatSession, LineOutcome, TranscriptEntry};

use crate::commands::{self, Command, CommandOutcome};
use crate::config::AppConfig;
use crate::history;

/// Everything the loop and its commands share
pub struct ChatContext {
    pub session: Arc<ChatSession>,
    pub config: AppConfig,
    pub session_name: String,
}

/// One reply as printed to the terminal
pub fn render_entry(entry: &TranscriptEntry) -> String {
    let mut out = if entry.is_error() {
        format!("[{}] {}", entry.speaker, entry.text)
    } else {
        format!("{}: {}", entry.speaker, entry.text)
    };
    if !entry.citations.is_empty() {
        out.push_str("\n\nSources:");
        for citation in &entry.citations {
            out.push_str(&format!("\n  {}", citation));
        }
    }
    out
}

/// The agent entries of one line, separated by blank lines
pub fn render_outcome(outcome: &LineOutcome) -> String {
    outcome
        .replies()
        .map(|e| render_entry(e))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "\nYou: ")?;
    stdout.flush().context("Failed to flush stdout")
}

pub async fn run(ctx: ChatContext) -> Result<()> {
    let marker = ctx.config.session.mention_marker;
    let roles: Vec<String> = ctx.session.list_roles().into_iter().map(|r| r.id).collect();
    println!("chatguys: talking to {}", roles.join(", "));
    println!(
        "Mention roles with {}Name. Type /help for commands, /quit to leave.",
        marker
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = signal::ctrl_c() => {
                println!("\nUse 'exit' or 'quit' to exit.");
                continue;
            }
        };
        let Some(line) = line else {
            // EOF
            println!();
            break;
        };

        if let Some(command) = Command::parse(&line) {
            match commands::execute(command, &ctx).await {
                Ok(CommandOutcome::Reply(text)) => println!("{}", text),
                Ok(CommandOutcome::Quit) => break,
                Err(e) => {
                    warn!("Command failed: {:#}", e);
                    println!("Error: {:#}", e);
                }
            }
            continue;
        }

        tokio::select! {
            outcome = ctx.session.handle_line(&line) => {
                let rendered = render_outcome(&outcome);
                if !rendered.is_empty() {
                    println!("\n{}", rendered);
                }
            }
            _ = signal::ctrl_c() => {
                debug!("Line cancelled by Ctrl+C");
                println!("\n(cancelled)");
            }
        }
    }

    autosave(&ctx);
    println!("Goodbye!");
    Ok(())
}

/// Save on the way out when enabled and there is something to save
pub fn autosave(ctx: &ChatContext) {
    if !ctx.config.session.autosave {
        return;
    }
    let snapshot = ctx.session.snapshot();
    if snapshot.is_empty() {
        return;
    }
    match history::save(&ctx.config.history_dir(), &ctx.session_name, &snapshot) {
        Ok((json_path, _)) => println!("Conversation saved to {}", json_path.display()),
        Err(e) => warn!("Autosave failed: {:#}", e),
    }
}

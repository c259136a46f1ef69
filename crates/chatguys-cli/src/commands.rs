//! Slash commands for the interactive loop

use anyhow::Result;
use tracing::warn;

use chatguys_core::RoleSummary;

use crate::history;
use crate::repl::ChatContext;
use crate::roles;

/// A recognized (or unrecognized) command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Reset,
    Reload,
    Roles,
    Save,
    Quit,
    Unknown(String),
}

impl Command {
    /// `None` when the line is a chat message rather than a command
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Some(Self::Quit);
        }
        let rest = line.strip_prefix('/')?;
        let name = rest.split_whitespace().next().unwrap_or("").to_lowercase();
        Some(match name.as_str() {
            "help" => Self::Help,
            "reset" => Self::Reset,
            "reload" => Self::Reload,
            "roles" => Self::Roles,
            "save" => Self::Save,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(format!("/{}", name)),
        })
    }
}

/// What the loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Print this and keep reading
    Reply(String),
    Quit,
}

pub fn help_text(marker: char) -> String {
    format!(
        "Available commands:
/help - Show this help message
/reset - Clear conversation history
/reload - Reload role definitions
/roles - List available roles
/save - Save the conversation to disk
/quit or /exit - Exit the application

To send a message to a specific agent, put {m}RoleName in your message.
Example: {m}Tech How do I implement a binary search?

Mention several agents together to ask all of them the same thing:
Example: {m}Tech {m}Creative how would you describe the internet?

Or give each agent its own part of the message:
Example: {m}Tech explain how databases work. {m}Creative write a story about a database.",
        m = marker
    )
}

pub fn format_roles(roles: &[RoleSummary]) -> String {
    if roles.is_empty() {
        return "No roles are currently configured.".to_string();
    }
    let mut out = String::from("Available roles:");
    for role in roles {
        out.push_str(&format!(
            "\n• {}{} [{} / {}]",
            role.id,
            if role.is_default { " (default)" } else { "" },
            role.provider,
            role.engine
        ));
        if !role.description.is_empty() {
            out.push_str(&format!("\n  {}", role.description));
        }
    }
    out
}

pub async fn execute(command: Command, ctx: &ChatContext) -> Result<CommandOutcome> {
    let reply = match command {
        Command::Help => help_text(ctx.config.session.mention_marker),
        Command::Reset => {
            ctx.session.reset().await;
            "Conversation history has been cleared.".to_string()
        }
        Command::Reload => match roles::load_registry(&ctx.config) {
            Ok(registry) => {
                let count = registry.len();
                ctx.session.reload(registry).await;
                format!("Role definitions reloaded ({} roles).", count)
            }
            Err(e) => {
                warn!("Reload failed: {:#}", e);
                format!("Error reloading role definitions (keeping current roles): {:#}", e)
            }
        },
        Command::Roles => format_roles(&ctx.session.list_roles()),
        Command::Save => {
            let (json_path, log_path) = history::save(
                &ctx.config.history_dir(),
                &ctx.session_name,
                &ctx.session.snapshot(),
            )?;
            format!(
                "Conversation saved to {} and {}",
                json_path.display(),
                log_path.display()
            )
        }
        Command::Quit => return Ok(CommandOutcome::Quit),
        Command::Unknown(name) => {
            format!("Unknown command: {}. Type /help for available commands.", name)
        }
    };
    Ok(CommandOutcome::Reply(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use chatguys_core::{ChatRequest, ChatSession, DispatchConfig, ModelEndpoint, Role};
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl ModelEndpoint for Echo {
        async fn complete(&self, role: &Role, _request: &ChatRequest) -> anyhow::Result<Value> {
            Ok(json!({
                "choices": [{"message": {"role": "assistant", "content": format!("{} here", role.id)}}]
            }))
        }
    }

    const ROLES: &str = "Default:\n  prompt: Helpful.\n  model:\n    engine: gpt-4o\nTech:\n  prompt: Technical.\n  model:\n    engine: gpt-4o\n";

    fn context(dir: &Path) -> ChatContext {
        let roles_dir = dir.join("roles");
        std::fs::create_dir_all(&roles_dir).unwrap();
        std::fs::write(roles_dir.join("roles.yaml"), ROLES).unwrap();

        let mut config = AppConfig::default();
        config.roles_dir = roles_dir.display().to_string();
        config.session.history_dir = dir.join("sessions").display().to_string();
        let registry = roles::load_registry(&config).unwrap();
        let session = ChatSession::new(registry, Arc::new(Echo), DispatchConfig::default());
        ChatContext {
            session: Arc::new(session),
            config,
            session_name: "chat_test".to_string(),
        }
    }

    fn reply_text(outcome: CommandOutcome) -> String {
        match outcome {
            CommandOutcome::Reply(text) => text,
            CommandOutcome::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn test_reset_clears_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.session.handle_line("@Tech hi").await;
        assert_eq!(ctx.session.snapshot().len(), 2);

        let text = reply_text(execute(Command::Reset, &ctx).await.unwrap());
        assert!(text.contains("cleared"));
        assert!(ctx.session.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_save_writes_history_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.session.handle_line("hello").await;

        let text = reply_text(execute(Command::Save, &ctx).await.unwrap());
        assert!(text.contains("chat_test.json"));
        let log = std::fs::read_to_string(dir.path().join("sessions/chat_test.log")).unwrap();
        assert!(log.contains("user: hello"));
        assert!(log.contains("Default: Default here"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_roles() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        std::fs::write(
            dir.path().join("roles/extra.yaml"),
            "Poet:\n  prompt: Rhymes.\n  model:\n    engine: gpt-4o\n",
        )
        .unwrap();

        let text = reply_text(execute(Command::Reload, &ctx).await.unwrap());
        assert!(text.contains("3 roles"));
        assert!(ctx.session.registry().contains("Poet"));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_roles() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        std::fs::write(dir.path().join("roles/roles.yaml"), "- not\n- a mapping\n").unwrap();

        let text = reply_text(execute(Command::Reload, &ctx).await.unwrap());
        assert!(text.contains("keeping current roles"));
        assert!(ctx.session.registry().contains("Tech"));
    }

    #[tokio::test]
    async fn test_quit_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert_eq!(execute(Command::Quit, &ctx).await.unwrap(), CommandOutcome::Quit);
        let text = reply_text(
            execute(Command::Unknown("/nope".to_string()), &ctx)
                .await
                .unwrap(),
        );
        assert!(text.contains("Unknown command: /nope"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("  /RESET  "), Some(Command::Reset));
        assert_eq!(Command::parse("/reload now"), Some(Command::Reload));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("EXIT"), Some(Command::Quit));
        assert_eq!(
            Command::parse("/frobnicate"),
            Some(Command::Unknown("/frobnicate".to_string()))
        );
    }

    #[test]
    fn test_chat_lines_are_not_commands() {
        assert_eq!(Command::parse("@Tech hello"), None);
        assert_eq!(Command::parse("quit smoking tips?"), None);
        assert_eq!(Command::parse("what is a/b?"), None);
    }

    #[test]
    fn test_help_uses_marker() {
        let help = help_text('#');
        assert!(help.contains("#Tech How do I"));
        for name in ["/help", "/reset", "/reload", "/roles", "/save", "/quit", "/exit"] {
            assert!(help.contains(name), "help is missing {}", name);
        }
    }

    #[test]
    fn test_format_roles() {
        let roles = vec![
            RoleSummary {
                id: "Default".to_string(),
                description: "You are a helpful assistant".to_string(),
                provider: "openai".to_string(),
                engine: "gpt-4o".to_string(),
                is_default: true,
            },
            RoleSummary {
                id: "News".to_string(),
                description: String::new(),
                provider: "search".to_string(),
                engine: "sonar".to_string(),
                is_default: false,
            },
        ];
        let text = format_roles(&roles);
        assert!(text.contains("• Default (default) [openai / gpt-4o]\n  You are a helpful assistant"));
        assert!(text.contains("• News [search / sonar]"));
        assert_eq!(format_roles(&[]), "No roles are currently configured.");
    }
}

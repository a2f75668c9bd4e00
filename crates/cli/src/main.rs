//! Johnathan CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat or single-message mode
//! - `tools`   — List the tools the agent can call
//! - `config`  — Show, locate or validate configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "johnathan",
    about = "Johnathan — a streaming tool-use agent for the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Wait for complete responses instead of streaming them
        #[arg(long)]
        no_stream: bool,
    },

    /// List available tools
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the config file location
    Path,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only model output.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { message, no_stream } => commands::chat::run(message, no_stream).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_flags() {
        let cli =
            Cli::try_parse_from(["johnathan", "chat", "-m", "hi", "--no-stream", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat { message, no_stream } => {
                assert_eq!(message.as_deref(), Some("hi"));
                assert!(no_stream);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn config_action_is_optional() {
        let cli = Cli::try_parse_from(["johnathan", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { action: None }));

        let cli = Cli::try_parse_from(["johnathan", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: Some(ConfigAction::Path)
            }
        ));
    }

    #[test]
    fn unknown_command_rejected() {
        assert!(Cli::try_parse_from(["johnathan", "daemon"]).is_err());
    }
}

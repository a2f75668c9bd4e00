//! `johnathan chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::sync::{Arc, Mutex};

use johnathan_agent::{AgentLoop, AgentObserver, AgentState, ExchangeOutcome};
use johnathan_config::AppConfig;
use johnathan_core::{Error, ToolCall};
use johnathan_providers::AnthropicTransport;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub async fn run(
    message: Option<String>,
    no_stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if no_stream {
        config.stream = false;
    }

    // Fail early with setup instructions when no key is configured
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    JOHNATHAN_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    debug!(model = %config.model, stream = config.stream, "Starting chat");
    let transport = Arc::new(AnthropicTransport::from_config(&config)?);
    let tools = Arc::new(johnathan_tools::default_registry());
    let tool_names = tools.names().join(", ");
    let mut agent = AgentLoop::from_config(transport, tools, &config)?;
    let printer = ConsolePrinter::new(std::io::stdout());

    if let Some(msg) = message {
        // Single message mode
        let cancel = cancel_on_ctrl_c();
        let result = agent.send(msg, &printer, &cancel.token).await;
        return result.map(|_| ()).map_err(Into::into);
    }

    // Interactive mode
    println!();
    println!("  Johnathan Agent — Interactive Mode");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Tools:     {tool_names}");
    println!("  Streaming: {}", config.stream);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'quit' to exit; Ctrl+C cancels a running reply.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_command(input) {
            break;
        }

        println!();
        let cancel = cancel_on_ctrl_c();
        match agent.send(input, &printer, &cancel.token).await {
            Ok(_) => {}
            Err(Error::Cancelled) => {
                eprintln!("  [Cancelled]");
                break;
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
                if agent.state() == AgentState::Terminated {
                    break;
                }
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "quit" | "exit" | "q")
}

/// A cancellation token tripped by Ctrl+C until dropped.
struct CtrlC {
    token: CancellationToken,
    watcher: tokio::task::JoinHandle<()>,
}

impl Drop for CtrlC {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn cancel_on_ctrl_c() -> CtrlC {
    let token = CancellationToken::new();
    let trip = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trip.cancel();
        }
    });
    CtrlC { token, watcher }
}

/// Writes model text to `out` as it streams; tool activity goes to stderr.
struct ConsolePrinter<W> {
    out: Mutex<W>,
}

impl<W: Write> ConsolePrinter<W> {
    fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }
}

impl<W: Write + Send> AgentObserver for ConsolePrinter<W> {
    fn on_text_chunk(&self, text: &str) {
        self.write(text);
    }

    fn on_interim_text(&self, _text: &str) {
        // Already printed chunk by chunk; end the line before tool output.
        self.write("\n");
    }

    fn on_tool_start(&self, call: &ToolCall) {
        eprintln!("  [tool] {} {}", call.name, call.input);
    }

    fn on_tool_finish(&self, call: &ToolCall, output: &str, is_error: bool) {
        if is_error {
            eprintln!("  [tool] {} failed: {output}", call.name);
        }
    }

    fn on_complete(&self, _outcome: &ExchangeOutcome) {
        self.write("\n\n");
    }
}

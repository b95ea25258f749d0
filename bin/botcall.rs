use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use botcall_client::presenter::{format_elapsed, Presenter, Severity};
use botcall_client::types::{CallMode, Phase, Sender};
use botcall_client::{Client, Config, SessionEvent};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Call a bot from the terminal, by voice when the host allows it, by text otherwise.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Bot to call right away.
    #[arg(short, long)]
    bot: Option<String>,

    /// Discovery server URL. Remembered for next time.
    #[arg(short, long)]
    discovery: Option<String>,

    /// Requested call mode: voice or text.
    #[arg(short, long, default_value_t = CallMode::Voice)]
    mode: CallMode,

    /// Attestation token sent with the call request.
    #[arg(long, env = "BOTCALL_ATTESTATION", hide_env_values = true)]
    attestation: Option<String>,

    /// Preferences file.
    #[arg(long)]
    preferences: Option<std::path::PathBuf>,
}

/// Writes the session to stdout; logs go to stderr.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn render_status(&self, phase: Phase, label: &str) {
        println!("[{}] {}", phase, label);
    }

    fn append_transcript_entry(&self, sender: Sender, text: &str) {
        let who = match sender {
            Sender::Human => "you",
            Sender::Bot => "bot",
        };
        println!("{:>4}> {}", who, text);
    }

    fn render_elapsed(&self, elapsed: Duration) {
        // Once a minute is enough for a terminal.
        if elapsed.as_secs() % 60 == 0 {
            println!("  ({})", format_elapsed(elapsed));
        }
    }

    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => println!("  * {}", message),
            Severity::Warning => println!("  ! {}", message),
            Severity::Error => println!("  !! {}", message),
        }
    }

    fn render_interim(&self, text: &str) {
        print!("\r  ... {}", text);
        let _ = std::io::stdout().flush();
    }

    fn render_voice_status(&self, text: &str) {
        println!("  ~ {}", text);
    }
}

const HELP: &str = "commands: /connect <bot> | /voice | /text | /mute | /status | /hangup | /quit; \
anything else is sent to the bot";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = Config::from_env()?.into_builder();
    if let Some(url) = &args.discovery {
        builder = builder.with_discovery_url(url);
    }
    if let Some(token) = &args.attestation {
        builder = builder.with_attestation(token);
    }
    if let Some(path) = &args.preferences {
        builder = builder.with_preferences_path(path);
    }
    let config = builder.build();

    let mut client = Client::builder(config, Arc::new(ConsolePresenter))
        .build()
        .context("failed to set up client")?;
    client.check_capabilities();
    println!("discovery: {}", client.preferences().discovery_url);
    println!("{}", HELP);

    let mut mode = args.mode;
    if let Some(bot) = &args.bot {
        if let Err(e) = client.connect(bot, mode).await {
            tracing::warn!("connect failed: {}", e);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("failed to read stdin: {}", e);
                        break;
                    }
                };
                if !run_command(&mut client, &mut mode, line.trim()).await {
                    break;
                }
            }
            Some(event) = client.next_event() => {
                let ended = matches!(event, SessionEvent::ChannelClosed | SessionEvent::ChannelFailed(_));
                client.handle_event(event).await;
                if ended {
                    println!("  (channel gone; /hangup to end the call)");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    client.hangup().await?;
    Ok(())
}

/// Returns false when the user asked to quit.
async fn run_command(client: &mut Client, mode: &mut CallMode, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let result = match command {
        "" => Ok(()),
        "/quit" | "/exit" => return false,
        "/help" => {
            println!("{}", HELP);
            Ok(())
        }
        "/connect" => client.connect(rest, *mode).await,
        "/hangup" => client.hangup().await,
        "/voice" | "/text" => {
            *mode = if command == "/voice" {
                CallMode::Voice
            } else {
                CallMode::Text
            };
            match client.session_mut().filter(|s| s.phase() == Phase::Active) {
                Some(session) => session.switch_mode(*mode).await,
                None => {
                    println!("  next call will use {} mode", mode);
                    Ok(())
                }
            }
        }
        "/mute" => match client.session_mut() {
            Some(session) => session.toggle_mute().map(|muted| {
                println!("  {}", if muted { "muted" } else { "unmuted" });
            }),
            None => Ok(()),
        },
        "/status" => {
            match client.session() {
                Some(session) => println!(
                    "  {} | {}{} | {} | {}",
                    session.phase(),
                    session.mode(),
                    if session.is_muted() { " (muted)" } else { "" },
                    format_elapsed(session.elapsed()),
                    session
                        .channel_url()
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| "no channel".to_string())
                ),
                None => println!("  idle"),
            }
            Ok(())
        }
        _ if command.starts_with('/') => {
            println!("  unknown command; {}", HELP);
            Ok(())
        }
        _ => match client.session_mut() {
            Some(session) => session.send_text(line).map(|sent| {
                if !sent {
                    println!("  (not delivered)");
                }
            }),
            None => {
                println!("  not in a call; /connect <bot> first");
                Ok(())
            }
        },
    };
    if let Err(e) = result {
        tracing::debug!("{}: {}", command, e);
        println!("  {}", e);
    }
    true
}

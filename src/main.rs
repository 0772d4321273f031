use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nayla::chat::{ChatConfig, ChatController, ChatUpdate, GeminiChatClient, SendOutcome};
use nayla::live::{GeminiLiveClient, LiveSession, LiveSessionConfig, LiveState};
use nayla::persona::{self, SUGGESTED_PROMPTS};
use nayla::{AudioBackendFactory, AudioSink, AudioSource, Config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nayla", version, about = "Chat and talk with Nayla")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, global = true, default_value = "config/nayla")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Text chat; interactive unless --message is given
    Chat {
        /// Send one message and exit
        #[arg(long)]
        message: Option<String>,
    },
    /// Voice session with the live API
    Voice {
        /// Replay a WAV file instead of the microphone
        #[arg(long)]
        input_wav: Option<PathBuf>,
        /// Record Nayla's speech to a WAV file instead of the speaker
        #[arg(long)]
        record_reply: Option<PathBuf>,
        /// End the session after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// List the suggested conversation starters
    Prompts,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Nayla v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Chat { message } => run_chat(&cfg, message).await,
        Command::Voice {
            input_wav,
            record_reply,
            duration,
        } => run_voice(&cfg, input_wav, record_reply, duration.map(Duration::from_secs)).await,
        Command::Prompts => {
            print_prompts();
            Ok(())
        }
    }
}

fn print_prompts() {
    for (i, prompt) in SUGGESTED_PROMPTS.iter().enumerate() {
        println!("/{}  {}  [{}]", i + 1, prompt.text, prompt.topic.label());
    }
}

async fn run_chat(cfg: &Config, message: Option<String>) -> Result<()> {
    let client = GeminiChatClient::from_config(&cfg.gemini, ChatConfig::from_config(cfg));
    let controller = Arc::new(ChatController::new(Arc::new(client), cfg.timeouts.stream_idle()));

    if let Some(message) = message {
        match controller.send_message(&message).await {
            SendOutcome::Completed { reply } => println!("{}", reply),
            SendOutcome::Failed { .. } => println!("{}", persona::FALLBACK_REPLY),
            SendOutcome::Ignored(reason) => info!("Nothing sent ({:?})", reason),
        }
        return Ok(());
    }

    println!("Nayla: {}\n", persona::GREETING);
    let printer = tokio::spawn(print_updates(controller.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if controller.suggestions_visible(false).await {
            print_prompts();
        }
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let text = match line.trim() {
            "/quit" => break,
            cmd if cmd.starts_with('/') => {
                let prompt = cmd[1..]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| SUGGESTED_PROMPTS.get(n.wrapping_sub(1)).map(|p| p.text));
                match prompt {
                    Some(text) => text.to_string(),
                    None => {
                        println!("Unknown command: {}", cmd);
                        continue;
                    }
                }
            }
            _ => line.clone(),
        };

        controller.send_message(&text).await;
    }

    println!("\n{}", persona::DISCLAIMER);
    printer.abort();
    Ok(())
}

async fn print_updates(mut updates: broadcast::Receiver<ChatUpdate>) {
    loop {
        match updates.recv().await {
            Ok(ChatUpdate::AssistantStarted { .. }) => print!("Nayla: "),
            Ok(ChatUpdate::Fragment { text, .. }) => print!("{}", text),
            Ok(ChatUpdate::Completed { .. }) => println!("\n"),
            Ok(ChatUpdate::Failed { text, .. }) => println!("\nNayla: {}\n", text),
            Ok(ChatUpdate::UserMessage { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => error!("Display skipped {} updates", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
        let _ = std::io::stdout().flush();
    }
}

async fn run_voice(
    cfg: &Config,
    input_wav: Option<PathBuf>,
    record_reply: Option<PathBuf>,
    duration: Option<Duration>,
) -> Result<()> {
    let source = input_wav.map_or(AudioSource::Microphone, AudioSource::File);
    let sink = record_reply.map_or(AudioSink::Speaker, AudioSink::File);

    let mut session = LiveSession::new(
        Arc::new(GeminiLiveClient::from_config(&cfg.gemini)),
        Arc::new(AudioBackendFactory::new(source, sink)),
        LiveSessionConfig::from_config(cfg),
    );

    if let Err(e) = session.start().await {
        error!("Failed to start voice session: {}", e);
        println!("{}", e.user_notice());
        return Ok(());
    }

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut last = session.status();
    loop {
        // Only the wait races the shutdown triggers; applying a signal is
        // never cut short
        let signal = tokio::select! {
            signal = session.next_signal() => signal,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, ending session");
                break;
            }
            _ = &mut deadline => {
                info!("Session duration reached");
                break;
            }
        };
        let Some(signal) = signal else {
            break;
        };
        session.apply(signal).await;

        let status = session.status();
        if status.state != last.state {
            match status.state {
                LiveState::Open => println!("{}", persona::LISTENING),
                LiveState::Closed => println!("Session ended by Nayla"),
                LiveState::Idle if last.state == LiveState::Connecting => {
                    println!("{}", persona::VOICE_START_FAILED)
                }
                _ => {}
            }
        }
        if status.speaking != last.speaking {
            println!("{}", if status.speaking { "Nayla is speaking" } else { "..." });
        }
        last = status;
    }

    session.stop().await;
    Ok(())
}

//! Terminal session for nanna.

use clap::Parser;
use nanna::audio::SimulatedPlayback;
use nanna::avatar::{AnimationSynchronizer, ExpressionAssets};
use nanna::llm::generator_from_config;
use nanna::pipeline::orchestrator::Collaborators;
use nanna::settings::SharedSettings;
use nanna::stt::{CaptureEvent, CaptureFeed, ChannelCapture};
use nanna::tts::{PollPolicy, ProviderChain};
use nanna::{NannaConfig, RuntimeEvent, TurnOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Nanna: talk to a patient Telugu father figure.
#[derive(Parser)]
#[command(name = "nanna", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nanna=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(NannaConfig::default_config_path);
    let config = if path.exists() {
        NannaConfig::from_file(&path)?
    } else {
        info!("no config at {}, using defaults", path.display());
        NannaConfig::default()
    };

    let (orchestrator, feed) = build(&config)?;
    let events = orchestrator.subscribe();
    tokio::spawn(print_events(events));

    println!("Nanna v{}", env!("CARGO_PKG_VERSION"));
    println!("Type to talk. /say <text> speaks through capture, /stop, /clear, /test, /quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            "/stop" => orchestrator.interrupt(),
            "/clear" => orchestrator.clear_history(),
            "/test" => report(orchestrator.speak_test_phrase()),
            _ => {
                if let Some(spoken) = line.strip_prefix("/say ") {
                    say(&orchestrator, &feed, spoken);
                } else {
                    report(orchestrator.submit_text(line));
                }
            }
        }
    }

    orchestrator.interrupt();
    Ok(())
}

fn build(config: &NannaConfig) -> anyhow::Result<(TurnOrchestrator, CaptureFeed)> {
    let playback = Arc::new(SimulatedPlayback::new(
        config.animation.ms_per_char,
        config.animation.sample_interval(),
    ));
    let chain = ProviderChain::builder(playback)
        .with_builtin_providers()
        .poll_policy(PollPolicy::from_config(&config.tts))
        .build()?;

    let mut animator = AnimationSynchronizer::new(config.animation.clone());
    if let Some(ref dir) = config.animation.assets_dir {
        match ExpressionAssets::load(dir) {
            Ok(assets) => animator = animator.with_assets(assets),
            Err(e) => warn!("expression assets ignored: {e}"),
        }
    }

    let (capture, feed) = ChannelCapture::new();
    let orchestrator = TurnOrchestrator::new(
        config,
        Collaborators {
            capture: Arc::new(capture),
            generator: generator_from_config(&config.llm),
            chain: Arc::new(chain),
            animator: Arc::new(animator),
            settings: Arc::new(SharedSettings::new(config.tts.clone())),
        },
    );
    Ok((orchestrator, feed))
}

/// Run a spoken turn with `text` standing in for the recogniser's output.
fn say(orchestrator: &TurnOrchestrator, feed: &CaptureFeed, text: &str) {
    match orchestrator.start_capture() {
        Ok(_) => {
            feed.send(CaptureEvent::Final(text.to_owned()));
            feed.send(CaptureEvent::Ended);
        }
        Err(e) => println!("  ! {e}"),
    }
}

fn report<T>(result: Result<T, nanna::TurnRejected>) {
    if let Err(e) = result {
        println!("  ! {e}");
    }
}

async fn print_events(mut events: broadcast::Receiver<RuntimeEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("dropped {n} runtime events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        match event {
            RuntimeEvent::StateChanged { state, .. } => println!("  [{state}]"),
            RuntimeEvent::Interim { text, .. } => println!("  ... {text}"),
            RuntimeEvent::Transcript { text, .. } => println!("You: {text}"),
            RuntimeEvent::Reply { text, .. } => println!("Nanna: {text}"),
            RuntimeEvent::Apology { text, .. } => println!("Nanna: {text}"),
            RuntimeEvent::CaptureFailed { error, .. } => println!("  ! {}", error.user_message()),
            RuntimeEvent::ProviderFallback { from, to, reason, .. } => {
                println!("  ! {from} failed ({reason}), using {to}");
            }
            RuntimeEvent::Interrupted { .. } => println!("  (interrupted)"),
            RuntimeEvent::HistoryCleared => println!("  (history cleared)"),
            _ => {}
        }
    }
}

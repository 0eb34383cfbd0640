//! Companion terminal entry point
//!
//! Reads messages from stdin, prints the streamed reply and speaks it
//! sentence by sentence.

mod commands;

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use companion_agent::{ChatSession, ReplySource};
use companion_config::{load_settings, Settings};
use companion_pipeline::WhisperTranscriber;

use commands::{Command, HELP};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("COMPANION_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&settings);

    tracing::info!("Starting companion v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = env.as_deref().unwrap_or("default"),
        chat = settings.chat.is_configured(),
        voice = settings.tts.is_configured(),
        "Configuration loaded"
    );

    let mut session = ChatSession::from_settings(&settings)?;
    let transcriber = WhisperTranscriber::new(settings.stt.clone())?;

    if !settings.chat.is_configured() {
        println!("(no chat API key set, replies are offline examples)");
    }
    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Empty => {},
            Command::Say(message) => run_turn(&mut session, &message).await,
            Command::Stop => session.interrupt(),
            Command::Voice(enabled) => {
                session.set_voice_enabled(enabled);
                println!("voice {}", if enabled { "on" } else { "off" });
            },
            Command::Transcribe(path) => match transcriber.transcribe_file(&path).await {
                Ok(text) if text.trim().is_empty() => println!("(nothing recognized)"),
                Ok(text) => {
                    println!("you said: {}", text);
                    run_turn(&mut session, &text).await;
                },
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Transcription failed");
                    println!("could not transcribe {}: {}", path.display(), e);
                },
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Invalid(input) => println!("unknown command: {} (try /help)", input),
        }
    }

    session.interrupt();
    tracing::info!(turns = session.turns(), "Shutting down");
    Ok(())
}

fn prompt() {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "> ");
    let _ = stdout.flush();
}

/// Stream one reply to the terminal; Ctrl-C abandons the turn
async fn run_turn(session: &mut ChatSession, message: &str) {
    let mut print = |delta: &str| {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", delta);
        let _ = stdout.flush();
    };

    let reply = tokio::select! {
        reply = session.send(message, &mut print) => Some(reply),
        _ = tokio::signal::ctrl_c() => None,
    };
    println!();

    match reply {
        Some(reply) => {
            if reply.source == ReplySource::Mock {
                tracing::debug!("Reply served offline");
            }
            if let Some(error) = reply.error {
                println!("(chat error: {})", error);
            }
        },
        None => {
            session.interrupt();
            println!("[interrupted]");
        },
    }
}

/// Initialize tracing
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("companion={}", level).into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

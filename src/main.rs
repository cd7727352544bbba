//! deskvoice console entry point.

use std::sync::Arc;

use clap::Parser;
use deskvoice::audio::{MicrophoneSource, PlaybackSink};
use deskvoice::cli::{Cli, ConsoleCommand, HELP};
use deskvoice::config::VoiceConfig;
use deskvoice::desk::{DeskEvent, VoiceDesk};
use deskvoice::dispatch::InvocationStatus;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deskvoice=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = VoiceConfig::from_file(path)?;
            config.apply_env_with(|name| std::env::var(name).ok());
            config
        }
        None => VoiceConfig::load()?,
    };
    if let Some(url) = cli.backend_url {
        config.backend_url = Some(url);
    }

    let (microphone, speaker) = audio_io()?;
    let (desk, mut events) = VoiceDesk::from_config(config, cli.provider, microphone, speaker)?;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    if desk.join_room(cli.room).await.is_ok() && cli.mic {
        let _ = desk.toggle_mic().await;
    }
    eprintln!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        // Failures are already reported through the event stream.
        match command {
            ConsoleCommand::Say(text) => {
                let _ = desk.send_user_text(&text).await;
            }
            ConsoleCommand::Room(room) => {
                let _ = desk.join_room(room).await;
            }
            ConsoleCommand::Provider(provider) => {
                desk.set_provider(provider);
                eprintln!("provider set to {provider}; takes effect on the next /room");
            }
            ConsoleCommand::Mic => {
                if let Ok(on) = desk.toggle_mic().await {
                    eprintln!("microphone {}", if on { "on" } else { "off" });
                }
            }
            ConsoleCommand::Leave => {
                let _ = desk.leave_room().await;
            }
            ConsoleCommand::Help => eprintln!("{HELP}"),
            ConsoleCommand::Quit => break,
        }
    }

    desk.leave_room().await?;
    drop(desk);
    printer.abort();
    Ok(())
}

#[cfg(feature = "device")]
fn audio_io() -> deskvoice::error::Result<(Arc<dyn MicrophoneSource>, Arc<dyn PlaybackSink>)> {
    use deskvoice::audio::{CpalMicrophone, RodioSpeaker};
    Ok((Arc::new(CpalMicrophone), Arc::new(RodioSpeaker::open_default()?)))
}

#[cfg(not(feature = "device"))]
fn audio_io() -> deskvoice::error::Result<(Arc<dyn MicrophoneSource>, Arc<dyn PlaybackSink>)> {
    use deskvoice::audio::{SimulatedPlayback, UnavailableMicrophone};
    Ok((Arc::new(UnavailableMicrophone), Arc::new(SimulatedPlayback)))
}

fn print_event(event: &DeskEvent) {
    use std::io::Write;
    match event {
        DeskEvent::ConnectionStatus { room, state } => eprintln!("[{room}] {state}"),
        DeskEvent::ActiveSpeaker { speaker: Some(speaker) } => eprintln!("({speaker} speaking)"),
        DeskEvent::ActiveSpeaker { speaker: None } => {}
        DeskEvent::Transcript { text, is_final, .. } => {
            print!("{text}");
            if *is_final {
                println!();
            }
            let _ = std::io::stdout().flush();
        }
        DeskEvent::ToolActivity { invocation } => match invocation.status {
            InvocationStatus::Pending => eprintln!("\n⚡ {} ({})", invocation.name, invocation.call_id),
            InvocationStatus::Ok => eprintln!("  ✅ {}", invocation.name),
            InvocationStatus::Error => eprintln!(
                "  ❌ {}: {}",
                invocation.name,
                invocation.error_message.as_deref().unwrap_or("failed")
            ),
        },
        DeskEvent::Error { message, suggestion } => eprintln!("❌ {message} ({suggestion:?})"),
    }
}

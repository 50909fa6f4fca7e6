//! Hanashi Desk
//!
//! Console front-end for the Hanashi agent: loads configuration, wires the microphone,
//! VOICEVOX and the speaker into the agent, and turns stdin lines into button presses
//! or chat input.

mod commands;
mod console;

use anyhow::Context;
use commands::{ConsoleCommand, HELP};
use console::ConsoleSurface;
use hanashi_voice::config::DEFAULT_CONFIG_PATH;
use hanashi_voice::{
    launch, AgentConfig, AgentHandle, AgentParts, AudioSink, HttpTranscriber, MicrophoneCapture, NullSink,
    RodioSink, SpeechCapture, SpeechSynthesizer, VoicevoxClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Backends = (Arc<dyn SpeechCapture>, Arc<dyn SpeechSynthesizer>, Arc<dyn AudioSink>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[hanashi-desk] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        PathBuf::from(std::env::var("HANASHI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()));
    if !config_path.exists() {
        match AgentConfig::write_template(&config_path) {
            Ok(()) => tracing::info!(path = %config_path.display(), "📝 Wrote default configuration"),
            Err(e) => tracing::warn!(error = %e, "could not write configuration template"),
        }
    }
    let config = AgentConfig::load_from(&config_path).context("load hanashi configuration")?;

    tracing::info!(
        voicevox = %config.voicevox.base_url,
        speaker = config.voicevox.speaker,
        stt = %config.recognition.api_url,
        assets = %config.assets_dir.display(),
        "Hanashi desk starting"
    );

    // Device and HTTP client setup blocks; keep it off the async workers.
    let backend_config = config.clone();
    let (capture, synthesizer, sink) = tokio::task::spawn_blocking(move || build_backends(&backend_config))
        .await
        .context("backend setup task")??;

    let parts = AgentParts::from_config(config, Box::new(ConsoleSurface::new()), capture, synthesizer, sink);
    let handle = launch(parts);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let Some(command) = ConsoleCommand::parse(&line) else { continue };
                        if command == ConsoleCommand::Quit {
                            break;
                        }
                        if let Err(e) = dispatch(&handle, command).await {
                            tracing::warn!(error = %e, "console command failed");
                        }
                    }
                    Ok(None) => {
                        tracing::info!("stdin closed; shutting down");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed; shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down desk");
                break;
            }
        }
    }

    handle.close().await.context("close agent")?;
    Ok(())
}

fn build_backends(config: &AgentConfig) -> anyhow::Result<Backends> {
    let transcriber = Arc::new(HttpTranscriber::new(&config.recognition).context("transcription client")?);
    let capture: Arc<dyn SpeechCapture> = Arc::new(MicrophoneCapture::new(config.recognition.clone(), transcriber));
    let synthesizer: Arc<dyn SpeechSynthesizer> =
        Arc::new(VoicevoxClient::new(&config.voicevox).context("VOICEVOX client")?);
    let sink: Arc<dyn AudioSink> = match RodioSink::new() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "⚠️ No audio output; replies will be silent");
            Arc::new(NullSink)
        }
    };
    Ok((capture, synthesizer, sink))
}

async fn dispatch(handle: &AgentHandle, command: ConsoleCommand) -> hanashi_voice::AgentResult<()> {
    match command {
        ConsoleCommand::Start => handle.start().await,
        ConsoleCommand::Stop => handle.stop().await,
        ConsoleCommand::ForceStop => handle.force_stop().await,
        ConsoleCommand::SlidesPlay => handle.slideshow_play().await,
        ConsoleCommand::SlidesPause => handle.slideshow_pause().await,
        ConsoleCommand::SlidesNext => handle.slideshow_next().await,
        ConsoleCommand::Resize(geometry) => handle.resize_window(geometry).await,
        ConsoleCommand::Say(text) => handle.submit_typed_input(text).await,
        ConsoleCommand::Help => {
            println!("{}", HELP);
            Ok(())
        }
        ConsoleCommand::Unknown(line) => {
            println!("不明なコマンド: {} (:help で一覧)", line);
            Ok(())
        }
        ConsoleCommand::Quit => Ok(()),
    }
}

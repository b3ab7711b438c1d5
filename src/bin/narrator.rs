//! Console front end for narrator.

use clap::Parser;
use narrator::capture::CommandCamera;
use narrator::controller::{Controller, ControllerParts};
use narrator::narration::{CommandNarrator, ModelDirLoader};
use narrator::settings::VoiceSettings;
use narrator::speech::azure::AzureSynthesizer;
use narrator::speech::{Player, Synthesizer};
use narrator::ui::console::{ConsoleSurface, LineSource, spawn_stdin_reader};
use narrator::voice::{KeywordClassifier, LineRecognizer};
use narrator::{CoreEvent, EventSink, NarratorConfig, UiLoop, ui_channel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Spoken audio descriptions of images, video and camera frames.
#[derive(Parser)]
#[command(name = "narrator", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable the voice command loop; buttons only.
    #[arg(long)]
    no_voice: bool,

    /// Override the model directory.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Output device name (requires the `cpal-output` feature).
    #[arg(long)]
    output_device: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    write_config: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(NarratorConfig::default_config_path);
    let mut config = if config_path.exists() {
        NarratorConfig::from_file(&config_path)?
    } else {
        NarratorConfig::default()
    };
    if cli.no_voice {
        config.voice.enabled = false;
    }
    if let Some(dir) = cli.model_dir.clone() {
        config.models.model_dir = dir;
    }

    if cli.write_config {
        config.save_to_file(&config_path)?;
        println!("wrote {}", config_path.display());
        return Ok(());
    }

    let _log_guard = init_tracing(&config)?;
    info!("narrator v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = VoiceSettings::default_path();
    let settings = VoiceSettings::load_or_default(&settings_path);

    let synthesizer: Arc<dyn Synthesizer> = Arc::new(AzureSynthesizer::new(&config.speech)?);
    let player = build_player(cli.output_device);

    let (ui, queue) = ui_channel();
    let (line_tx, lines) = LineSource::channel();
    let narrator = CommandNarrator::new(
        config.models.image_command.clone(),
        config.models.video_command.clone(),
    );
    let camera = CommandCamera::new(config.capture.camera_command.clone());
    let drain_interval = config.ui.drain_interval();

    let controller = Controller::new(ControllerParts {
        config,
        settings,
        settings_path,
        ui,
        synthesizer,
        player,
        recognizer: Arc::new(LineRecognizer::new(lines.clone())),
        classifier: Arc::new(KeywordClassifier::default()),
        loader: Arc::new(ModelDirLoader),
        engine: Arc::new(narrator.clone()),
        video: Arc::new(narrator),
        camera: Arc::new(camera),
        events: EventSink::new(Box::new(|event: CoreEvent| tracing::debug!(?event, "core event"))),
    });

    let buttons = controller.clone();
    spawn_stdin_reader(line_tx, move |button| {
        buttons.handle_button(button);
    })?;

    println!("buttons: :image :video :live :close :stop :voice :reload :profile <name> :quit");
    controller.start_preload();
    controller.welcome();
    controller.arm_voice_loop(controller.config().voice.rearm_delay());

    UiLoop::new(Box::new(ConsoleSurface::new(lines)), queue, drain_interval).run();

    controller.set_voice_enabled(false);
    controller.speech().interrupt_current();
    info!("narrator stopped");
    Ok(())
}

/// Console logging, plus a daily rolling file when configured.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(
    config: &NarratorConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("narrator=info"));

    if !config.logging.file {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    }

    let dir = config.logging.log_dir();
    std::fs::create_dir_all(&dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "narrator.log"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}

#[cfg(feature = "cpal-output")]
fn build_player(output_device: Option<String>) -> Arc<dyn Player> {
    Arc::new(narrator::speech::playback::CpalPlayer::new(output_device))
}

#[cfg(not(feature = "cpal-output"))]
fn build_player(output_device: Option<String>) -> Arc<dyn Player> {
    if output_device.is_some() {
        tracing::warn!("--output-device ignored: built without the cpal-output feature");
    }
    Arc::new(narrator::speech::playback::SimulatedPlayer::new())
}

/// Clap decoder service binary
///
/// Listens to the microphone (or replays a WAV file) and logs decoded clap
/// symbols and command words until interrupted.

use anyhow::Context;
use clap::Parser;
use clap_decoder::{
    list_input_devices, ClapDetector, CpalSource, DetectorConfig, WavSource,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "clap-service")]
#[command(about = "Decode hand-clap command words from live audio", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input device name (default input device if omitted)
    #[arg(long)]
    device: Option<String>,

    /// Print the available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Replay a WAV file instead of capturing live audio
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Amplitude threshold override
    #[arg(long)]
    threshold: Option<f32>,

    /// Word length override
    #[arg(long)]
    word_length: Option<usize>,

    /// Max double clap gap override (seconds)
    #[arg(long)]
    max_gap: Option<f64>,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clap_decoder=info,clap_service=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    if cli.list_devices {
        for name in list_input_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    info!("Starting AetherOS Clap Decoder Service");

    let config = load_config(&cli)?;
    let mut detector = ClapDetector::new(config.clone())?;

    detector
        .on_waiting_second_clap(|| {
            info!("Waiting for a second clap...");
            Ok(())
        })
        .on_clap_completed(|symbol| {
            info!("Clap detected: {}", symbol);
            Ok(())
        })
        .on_word_completed(|word| {
            // In production: map the word to an actuator command
            info!("Word detected: {}", word);
            Ok(())
        });

    let (handle, replay_done) = match cli.wav {
        Some(path) => {
            let source = WavSource::new(path, config.sample_rate);
            let done = source.finished();
            (detector.start(source).await?, Some(done))
        }
        None => {
            let mut source = CpalSource::new(config.sample_rate);
            if let Some(name) = cli.device {
                source = source.with_device(name);
            }
            (detector.start(source).await?, None)
        }
    };

    info!("Listening for claps...");
    wait_for_shutdown(replay_done, &config).await;

    let detector = handle.stop().await?;
    info!("Clap decoder stopped. Stats: {:?}", detector.stats());

    Ok(())
}

/// Build the configuration from the optional file plus CLI overrides
fn load_config(cli: &Cli) -> anyhow::Result<DetectorConfig> {
    let mut config = match &cli.config {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DetectorConfig::default(),
    };

    if let Some(threshold) = cli.threshold {
        config.amplitude_threshold = threshold;
    }
    if let Some(word_length) = cli.word_length {
        config.word_length = word_length;
    }
    if let Some(max_gap) = cli.max_gap {
        config.max_double_clap_gap = max_gap;
    }

    config.validate()?;
    Ok(config)
}

async fn wait_for_shutdown(replay_done: Option<CancellationToken>, config: &DetectorConfig) {
    match replay_done {
        Some(done) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                _ = done.cancelled() => {
                    // Give a trailing single clap time to time out
                    info!("Replay finished, flushing pending claps");
                    tokio::time::sleep(config.double_clap_gap() + config.tick_period() * 2).await;
                }
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted");
        }
    }
}

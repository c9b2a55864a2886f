use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::info;

use speechmatics_stt_bridge::AppConfig;
use speechmatics_stt_bridge::core::stt::{
    AudioChannels, AudioCodec, AudioFormat, SpeechMetadata, SpeechResult, SpeechToTextEntity,
    SpeechmaticsSTT,
};

/// Speechmatics STT bridge - transcribe utterances over the real-time API
#[derive(Parser, Debug)]
#[command(name = "speechmatics-stt-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transcribe a 16-bit PCM WAV file
    Transcribe {
        /// Path to the WAV file
        #[arg(value_name = "WAV")]
        input: PathBuf,

        /// Language code (defaults to the configured language)
        #[arg(short = 'l', long = "language")]
        language: Option<String>,
    },

    /// List supported language codes
    Languages,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        AppConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        AppConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let stt = SpeechmaticsSTT::new(config.connection_settings());

    match cli.command {
        Commands::Languages => {
            for language in stt.supported_languages() {
                println!("{language}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Transcribe { input, language } => {
            let (metadata, chunks) = read_wav(&input, config.chunk_size, language)?;
            info!(
                "Streaming {} chunks from {} to {}",
                chunks.len(),
                input.display(),
                stt.unique_id()
            );

            let result = stt
                .process_audio_stream(metadata, futures::stream::iter(chunks).boxed())
                .await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::from(exit_status(&result)))
        }
    }
}

/// Process exit status for a transcription result: 0 on success, 1 on error.
fn exit_status(result: &SpeechResult) -> u8 {
    if result.is_success() { 0 } else { 1 }
}

/// Read a WAV file into request metadata and raw little-endian PCM chunks.
fn read_wav(
    path: &Path,
    chunk_size: usize,
    language: Option<String>,
) -> anyhow::Result<(SpeechMetadata, Vec<Bytes>)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "Only 16-bit PCM WAV files are supported (got {} bits, {:?})",
            spec.bits_per_sample,
            spec.sample_format
        );
    }

    let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }

    let pcm = Bytes::from(pcm);
    let chunk_size = chunk_size.max(1);
    let chunks = (0..pcm.len())
        .step_by(chunk_size)
        .map(|start| pcm.slice(start..(start + chunk_size).min(pcm.len())))
        .collect();

    let metadata = SpeechMetadata {
        language,
        format: AudioFormat::Wav,
        codec: AudioCodec::Pcm,
        sample_rate: spec.sample_rate,
        channels: if spec.channels == 1 {
            AudioChannels::Mono
        } else {
            AudioChannels::Stereo
        },
        bit_rate: spec.bits_per_sample,
    };

    Ok((metadata, chunks))
}

use anyhow::{Context, Result, bail};
use clap::Parser;
use speechloop::audio::wav::{MediaWavWriter, read_pcm_file};
use speechloop::cli::{Cli, Commands, log_filter};
use speechloop::config::Config;
use speechloop::http::HttpBridge;
use speechloop::recognition::{ContinuousRecognizer, ContinuousSettings};
use speechloop::stt::{WhisperConfig, WhisperTranscriber};
use speechloop::synthesis::HttpSynthesizer;
use speechloop::translation::{HttpTranslator, TranslationBackend};
use speechloop::{CollectingListener, MediaBufferFramer, SessionBuilder, TracingSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Upper bound for recognition and synthesis to finish after the input ended.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            output,
            model,
            realtime,
            stop_timeout,
        } => {
            let mut config = config;
            if let Some(timeout) = stop_timeout {
                config.session.stop_timeout_ms = timeout.as_millis() as u64;
            }
            let bridge = HttpBridge::current()?;
            let options = RunOptions {
                input,
                output,
                model,
                realtime,
            };
            tokio::task::spawn_blocking(move || run_file(config, bridge, options))
                .await
                .context("Session task failed")??;
        }
        Commands::Config => {
            let text = toml::to_string_pretty(&config.redacted())
                .context("Failed to serialize configuration")?;
            print!("{text}");
        }
    }

    Ok(())
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

struct RunOptions {
    input: PathBuf,
    output: PathBuf,
    model: Option<PathBuf>,
    realtime: bool,
}

/// Feeds a WAV file through one session and writes what it speaks back.
fn run_file(config: Config, bridge: HttpBridge, options: RunOptions) -> Result<()> {
    let model_path = options
        .model
        .or_else(|| config.recognition.model_path.clone())
        .context("No whisper model given, use --model or recognition.model_path")?;

    let log = Arc::new(TracingSink);
    let transcriber = WhisperTranscriber::new(WhisperConfig::from_recognition(
        &config.recognition,
        &model_path,
    ))?;
    let recognizer = ContinuousRecognizer::new(
        transcriber,
        ContinuousSettings::from_config(&config.recognition),
        log.clone(),
    );
    let synthesizer = HttpSynthesizer::new(bridge.clone(), &config.speech)?;
    let translator: Option<Arc<dyn TranslationBackend>> = if config.translation_required() {
        Some(Arc::new(HttpTranslator::new(bridge, &config.translation)?))
    } else {
        None
    };

    let listener = Arc::new(CollectingListener::new());
    let framer = MediaBufferFramer::new(config.session.frame_ms);
    let mut builder = SessionBuilder::new()
        .config(config)
        .recognizer(Arc::new(recognizer))
        .synthesizer(Arc::new(synthesizer))
        .listener(listener.clone())
        .log(log);
    if let Some(translator) = translator {
        builder = builder.translator(translator);
    }
    let session = builder.build()?;

    let pcm = read_pcm_file(&options.input)?;
    tracing::info!(
        bytes = pcm.len(),
        input = %options.input.display(),
        "Feeding input audio"
    );
    for chunk in pcm.chunks(framer.frame_bytes()) {
        session.append_audio(chunk, None);
        if options.realtime {
            std::thread::sleep(framer.frame_duration());
        }
    }
    session.finish_input();

    if !session.wait_until_stopped(DRAIN_TIMEOUT) {
        tracing::warn!("Session did not finish in time, shutting down");
        session.shutdown();
    }

    let mut writer = MediaWavWriter::create(&options.output)?;
    for buffer in listener.take_buffers() {
        writer.write(&buffer)?;
    }
    let frames = writer.frames();
    writer.finalize()?;
    tracing::info!(frames, output = %options.output.display(), "Wrote outbound audio");

    if let Some(end) = session.end()
        && let Some(error) = &end.error
    {
        bail!("Session ended with error: {error}");
    }
    Ok(())
}

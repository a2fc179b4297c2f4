mod error;
mod render;

use clap::{Args, Parser, Subcommand};
use error::{CliError, Result};
use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tonecast_core::{
    ChannelEvent, ChannelMap, ChannelRole, Decoder, Encoder, FileMeta, ToneConfig,
    ToneError, ToneObservation, ToneSegmenter, Transmission,
};

#[derive(Parser)]
#[command(name = "tonecast")]
#[command(about = "Multi-frequency tone channel modem: encode, render and decode tone sequences")]
struct Cli {
    /// Tone configuration as JSON (missing fields take their defaults)
    #[arg(long, global = true, value_name = "CONFIG.JSON")]
    config: Option<PathBuf>,

    /// Use the 10-channel bit-flag plan (5-14 kHz)
    #[arg(long, global = true, conflicts_with = "config")]
    legacy: bool,

    /// Override the per-tone duration in seconds
    #[arg(long, global = true)]
    channel_duration: Option<f32>,

    /// Override the frequency tolerance in Hz
    #[arg(long, global = true)]
    tolerance: Option<f32>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the channel table
    Channels,

    /// Encode a message into a JSON channel event list
    Encode {
        #[command(flatten)]
        message: Message,

        /// Output event list
        #[arg(short, long, value_name = "EVENTS.JSON")]
        output: PathBuf,
    },

    /// Encode a message and synthesise it to a WAV file
    Render {
        #[command(flatten)]
        message: Message,

        /// Output WAV file
        #[arg(short, long, value_name = "OUTPUT.WAV")]
        output: PathBuf,

        #[arg(long, default_value_t = render::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,
    },

    /// Decode observed tones (or per-block frequency estimates) from JSON
    Decode {
        #[arg(value_name = "OBSERVATIONS.JSON")]
        input: PathBuf,

        /// Directory received files are written to
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Message {
    /// Text to send
    #[arg(long)]
    text: Option<String>,

    /// File to send; its stem and extension travel in the header
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

/// Decoder input: tone observations, or raw block estimates to segment first
#[derive(Deserialize)]
#[serde(untagged)]
enum DecodeInput {
    Observations(Vec<ToneObservation>),
    Blocks {
        block_duration: f32,
        frequencies: Vec<Option<f32>>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Channels => channels_command(&config),
        Commands::Encode { message, output } => encode_command(&config, &message, &output),
        Commands::Render {
            message,
            output,
            sample_rate,
        } => render_command(&config, &message, &output, sample_rate),
        Commands::Decode { input, output_dir } => decode_command(&config, &input, &output_dir),
    }
}

fn load_config(cli: &Cli) -> Result<ToneConfig> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None if cli.legacy => ToneConfig::legacy(),
        None => ToneConfig::default(),
    };
    if let Some(duration) = cli.channel_duration {
        config.channel_duration = duration;
    }
    if let Some(tolerance) = cli.tolerance {
        config.frequency_tolerance = tolerance;
    }
    config.validate()?;
    Ok(config)
}

fn channels_command(config: &ToneConfig) -> Result<()> {
    let scheme = config.scheme()?;
    let map = ChannelMap::from_config(config);

    println!(
        "{:?} scheme, {} channels, {:.1} Hz spacing",
        scheme,
        map.channel_count(),
        map.spacing()
    );
    for channel in map.channels() {
        let role = match scheme.role(channel) {
            Some(ChannelRole::Marker) => "preamble/postamble".to_string(),
            Some(ChannelRole::Separator) => "separator".to_string(),
            Some(ChannelRole::TrainingOnly) => "training".to_string(),
            Some(ChannelRole::Nibble(value)) => format!("nibble {:#x}", value),
            Some(ChannelRole::Bit(position)) => format!("bit {}", 7 - position),
            None => "unused".to_string(),
        };
        println!("{:>4}  {:>9.1} Hz  {}", channel.id(), map.frequency(channel), role);
    }
    Ok(())
}

fn encode_message(encoder: &Encoder, message: &Message) -> Result<Vec<ChannelEvent>> {
    match (&message.text, &message.file) {
        (Some(text), _) => {
            println!("Encoding {} bytes of text", text.len());
            Ok(encoder.encode_text(text)?)
        }
        (None, Some(path)) => {
            let data = std::fs::read(path)?;
            let meta = file_meta(path)?;
            println!("Read {} bytes from {}", data.len(), path.display());
            Ok(encoder.encode_file(&meta, &data)?)
        }
        (None, None) => Err(CliError::InvalidInput(
            "either --text or --file is required".into(),
        )),
    }
}

fn file_meta(path: &Path) -> Result<FileMeta> {
    let stem = path
        .file_stem()
        .ok_or_else(|| CliError::InvalidInput(format!("{} has no file name", path.display())))?;
    let extension = path.extension().unwrap_or_default();
    Ok(FileMeta::new(
        stem.to_string_lossy(),
        extension.to_string_lossy(),
    ))
}

fn encode_command(config: &ToneConfig, message: &Message, output: &Path) -> Result<()> {
    let encoder = Encoder::new(*config)?;
    let events = encode_message(&encoder, message)?;

    std::fs::write(output, serde_json::to_string_pretty(&events)?)?;
    println!(
        "Wrote {} events ({:.2} s) to {}",
        events.len(),
        tonecast_core::total_duration(&events),
        output.display()
    );
    Ok(())
}

fn render_command(
    config: &ToneConfig,
    message: &Message,
    output: &Path,
    sample_rate: u32,
) -> Result<()> {
    if sample_rate < 2 * config.max_frequency.ceil() as u32 {
        return Err(CliError::InvalidInput(format!(
            "sample rate {} Hz cannot carry tones up to {:.0} Hz",
            sample_rate, config.max_frequency
        )));
    }

    let encoder = Encoder::new(*config)?;
    let events = encode_message(&encoder, message)?;
    let samples = render::synthesize(&events, encoder.channel_map(), sample_rate);
    render::write_wav(output, &samples, sample_rate)?;

    println!(
        "Wrote {} samples at {} Hz to {}",
        samples.len(),
        sample_rate,
        output.display()
    );
    Ok(())
}

fn decode_command(config: &ToneConfig, input: &Path, output_dir: &Path) -> Result<()> {
    let observations = match serde_json::from_str(&std::fs::read_to_string(input)?)? {
        DecodeInput::Observations(observations) => observations,
        DecodeInput::Blocks {
            block_duration,
            frequencies,
        } => {
            let mut segmenter = ToneSegmenter::new(config, block_duration)?;
            let observations = segmenter.segment(&frequencies);
            info!(
                "Segmented {} blocks into {} tones",
                frequencies.len(),
                observations.len()
            );
            observations
        }
    };

    let mut decoder = Decoder::new(*config)?;
    let mut received = 0;
    let mut first_error = None;
    for observation in observations {
        match decoder.push(observation) {
            Ok(Some(transmission)) => {
                deliver(&transmission, output_dir)?;
                received += 1;
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Transmission dropped: {}", err);
                first_error.get_or_insert(err);
                // The decoder has reset; the tone that ended the session may open the next one
                let _ = decoder.push(observation);
            }
        }
    }

    let trailing = decoder.finish();
    if received > 0 {
        if let Err(err) = trailing {
            warn!("Trailing transmission incomplete: {}", err);
        }
        return Ok(());
    }
    match first_error {
        Some(err) => Err(err.into()),
        None => {
            trailing?;
            Err(ToneError::PreambleNotFound.into())
        }
    }
}

fn deliver(transmission: &Transmission, output_dir: &Path) -> Result<()> {
    if let Some(text) = transmission.text() {
        println!("{}", text);
        return Ok(());
    }

    let name = transmission
        .file_name()
        .ok_or_else(|| CliError::InvalidInput("text message is not valid UTF-8".into()))?;
    // Only the final component is trusted; the name came off the air
    let name = Path::new(&name)
        .file_name()
        .ok_or_else(|| CliError::InvalidInput(format!("unusable file name {:?}", name)))?;

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(name);
    std::fs::write(&path, &transmission.data)?;
    println!("Wrote {} bytes to {}", transmission.data.len(), path.display());
    Ok(())
}

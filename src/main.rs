//! Command line front end for the flipnote decoder.
//!
//! Prints metadata and per-frame details, exports audio to WAV and checks
//! signatures against the built-in or a caller-supplied RSA public key.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

use flipnote::audio::DEFAULT_OUTPUT_SAMPLE_RATE;
use flipnote::{
    AudioTrack, Flipnote, FlipnoteDecoder, FlipnoteFormat, FlipnoteMeta, ImageRect, KwzSettings,
    RsaPkcs1Verifier, SignatureHash,
};

#[derive(Parser)]
#[command(name = "flipnote")]
#[command(about = "Inspect and convert Flipnote Studio PPM and KWZ files")]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON file with KWZ decoder settings
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print metadata as JSON
    Info {
        /// Input file
        file: PathBuf,

        /// Only read the playback fields of a KWZ header
        #[arg(long)]
        quick: bool,

        /// Pretty print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Print palette, layer order and ink coverage of one frame
    Frame {
        /// Input file
        file: PathBuf,

        /// Frame index
        index: usize,
    },
    /// Export audio to a 16-bit mono WAV file
    Audio {
        /// Input file
        file: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Output sample rate
        #[arg(long, default_value_t = DEFAULT_OUTPUT_SAMPLE_RATE)]
        rate: u32,

        /// Single track to export (bgm, se1 .. se4) instead of the master mix
        #[arg(long)]
        track: Option<String>,
    },
    /// Verify the embedded signature
    Verify {
        /// Input file
        file: PathBuf,

        /// PEM public key (SPKI or PKCS#1) instead of the built-in one
        #[arg(long)]
        key: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct NoteInfo<'a> {
    format: FlipnoteFormat,
    width: usize,
    height: usize,
    image_rect: ImageRect,
    framerate: f64,
    duration_seconds: f64,
    tracks: Vec<AudioTrack>,
    meta: &'a FlipnoteMeta,
}

#[derive(Serialize)]
struct FrameInfo {
    index: usize,
    palette: Vec<String>,
    layer_order: Vec<usize>,
    layer_depths: Vec<u8>,
    ink_pixels: Vec<usize>,
    author: String,
    sound_effects: Vec<AudioTrack>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<KwzSettings> {
    let Some(path) = path else {
        return Ok(KwzSettings::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading settings {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
}

fn read_note(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn open<'a>(data: &'a [u8], settings: KwzSettings, path: &Path) -> Result<Flipnote<'a>> {
    Flipnote::open(data, settings).with_context(|| format!("opening {}", path.display()))
}

fn cmd_info(file: &Path, settings: KwzSettings, pretty: bool) -> Result<()> {
    let data = read_note(file)?;
    let note = open(&data, settings, file)?;
    let decoder = note.as_decoder();
    let info = NoteInfo {
        format: decoder.format(),
        width: decoder.width(),
        height: decoder.height(),
        image_rect: decoder.image_rect(),
        framerate: decoder.framerate(),
        duration_seconds: decoder.duration(),
        tracks: AudioTrack::ALL
            .into_iter()
            .filter(|&t| decoder.has_audio_track(t))
            .collect(),
        meta: decoder.meta(),
    };
    let json = if pretty {
        serde_json::to_string_pretty(&info)?
    } else {
        serde_json::to_string(&info)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_frame(file: &Path, settings: KwzSettings, index: usize) -> Result<()> {
    let data = read_note(file)?;
    let mut note = open(&data, settings, file)?;
    let decoder = note.as_decoder_mut();

    let palette = decoder
        .frame_palette(index)?
        .iter()
        .map(|c| format!("#{:02x}{:02x}{:02x}{:02x}", c.0[0], c.0[1], c.0[2], c.0[3]))
        .collect();
    let layer_order = decoder.layer_order(index)?;
    let layer_depths = decoder.layer_depths(index)?;
    let author = decoder.frame_author(index)?;
    let flags = decoder.sound_effect_flags(index)?;
    let sound_effects = AudioTrack::ALL
        .into_iter()
        .filter(|t| t.effect_flag().is_some_and(|f| flags.contains(f)))
        .collect();
    let ink_pixels = decoder
        .decode_frame(index)?
        .iter()
        .map(|layer| layer.iter().filter(|&&p| p != 0).count())
        .collect();

    let info = FrameInfo {
        index,
        palette,
        layer_order,
        layer_depths,
        ink_pixels,
        author,
        sound_effects,
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

#[cfg(feature = "wav")]
fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(not(feature = "wav"))]
fn write_wav(_path: &Path, _samples: &[i16], _sample_rate: u32) -> Result<()> {
    bail!("WAV export requires the \"wav\" feature. Rebuild with `--features wav`.")
}

fn cmd_audio(
    file: &Path,
    settings: KwzSettings,
    output: &Path,
    rate: u32,
    track: Option<&str>,
) -> Result<()> {
    let data = read_note(file)?;
    let mut note = open(&data, settings, file)?;
    let decoder = note.as_decoder_mut();

    let samples = match track {
        Some(name) => {
            let track =
                AudioTrack::from_name(name).ok_or_else(|| anyhow!("unknown track {name:?}"))?;
            decoder.audio_track_pcm(track, rate)?
        }
        None => {
            let master = decoder.audio_master_pcm(rate)?;
            tracing::info!(clip_ratio = master.clip_ratio, "mixed master track");
            master.samples
        }
    };
    write_wav(output, &samples, rate)?;
    println!(
        "wrote {} samples ({:.2}s) to {}",
        samples.len(),
        samples.len() as f64 / rate as f64,
        output.display()
    );
    Ok(())
}

fn cmd_verify(file: &Path, settings: KwzSettings, key: Option<&Path>) -> Result<()> {
    let data = read_note(file)?;
    let note = open(&data, settings, file)?;
    let verifier = match key {
        Some(key) => {
            let pem =
                fs::read_to_string(key).with_context(|| format!("reading {}", key.display()))?;
            let hash = match note.format() {
                FlipnoteFormat::Ppm => SignatureHash::Sha1,
                FlipnoteFormat::Kwz => SignatureHash::Sha256,
            };
            RsaPkcs1Verifier::from_pem(&pem, hash)?
        }
        None => RsaPkcs1Verifier::builtin(note.format())?,
    };
    if note.as_decoder().verify(&verifier)? {
        println!("{}: signature valid", file.display());
        Ok(())
    } else {
        bail!("{}: signature invalid", file.display())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let settings = load_settings(args.settings.as_deref())?;

    match args.command {
        Command::Info {
            file,
            quick,
            pretty,
        } => {
            let settings = KwzSettings {
                quick_meta: settings.quick_meta || quick,
                ..settings
            };
            cmd_info(&file, settings, pretty)
        }
        Command::Frame { file, index } => cmd_frame(&file, settings, index),
        Command::Audio {
            file,
            output,
            rate,
            track,
        } => cmd_audio(&file, settings, &output, rate, track.as_deref()),
        Command::Verify { file, key } => cmd_verify(&file, settings, key.as_deref()),
    }
}

//! Command-line front end: inspect media metadata and concatenate movie
//! files frame by frame.

use std::{
    error::Error,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use frameshift::{
    set_engine_log_level, EngineLogLevel, FrameReader, FrameWriter, HandleRegistry, MediaInfo,
    SinkOptions, SourceOptions, DEFAULT_FPS,
};

const CLI_AFTER_HELP: &str = "Examples:\n  frameshift info input.mp4 --json\n  frameshift concat a.mp4 b.mp4 --out joined.mp4 --fps 30\n  frameshift concat input.mp4 --out clip.mp4 --start 30 --frames 120 --size 640x360";

#[derive(Debug, Parser)]
#[command(
    name = "frameshift",
    version,
    about = "Move video frames between movie files and raw pixel buffers",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Silence FFmpeg's own console output (errors still shown).
    #[arg(long, global = true)]
    quiet_engine: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print metadata for a media source.
    #[command(visible_alias = "probe")]
    Info {
        /// Input media path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Concatenate one or more movie files into a new movie.
    Concat {
        /// Input media paths, joined in order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output media path.
        #[arg(long)]
        out: PathBuf,

        /// Output frame rate (defaults to the first input's rate).
        #[arg(long)]
        fps: Option<f64>,

        /// Frames to skip at the start of each input.
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Maximum frames to take from each input.
        #[arg(long)]
        frames: Option<u64>,

        /// Output size as WIDTHxHEIGHT (e.g. 640x360); defaults to the first
        /// frame's size.
        #[arg(long, value_parser = parse_size)]
        size: Option<(u32, u32)>,
    },
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width
        .parse::<u32>()
        .map_err(|error| format!("bad width '{width}': {error}"))?;
    let height = height
        .parse::<u32>()
        .map_err(|error| format!("bad height '{height}': {error}"))?;
    if width == 0 || height == 0 {
        return Err("width and height must be non-zero".to_string());
    }
    Ok((width, height))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.quiet_engine {
        set_engine_log_level(EngineLogLevel::Error);
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Info { input, json } => info(&input, json),
        Commands::Concat {
            inputs,
            out,
            fps,
            start,
            frames,
            size,
        } => concat(&inputs, &out, fps, start, frames, size),
    }
}

fn info(input: &Path, as_json: bool) -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(HandleRegistry::new());
    let mut reader = FrameReader::open(input, SourceOptions::new(), &registry)?;
    let info = reader.info().clone();
    let estimated = reader.estimated_frame_count();
    reader.close()?;

    if as_json {
        let payload = json!({
            "path": input,
            "info": info,
            "estimated_frames": estimated,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_info(input, &info, estimated);
    }
    Ok(())
}

fn print_info(input: &Path, info: &MediaInfo, estimated: Option<u64>) {
    println!("{}", input.display());
    println!("  size:     {}x{}", info.width, info.height);
    match info.fps {
        Some(fps) => println!("  fps:      {fps:.3}"),
        None => println!("  fps:      unknown"),
    }
    match info.duration {
        Some(duration) => println!("  duration: {duration:.2}s"),
        None => println!("  duration: unknown"),
    }
    match estimated {
        Some(count) => println!("  frames:   {count}"),
        None => println!("  frames:   unknown"),
    }
    if let Some(codec) = &info.codec {
        println!("  codec:    {codec}");
    }
    for (key, value) in &info.extra {
        println!("  {key}: {value}");
    }
}

fn concat(
    inputs: &[PathBuf],
    out: &Path,
    fps: Option<f64>,
    start: u64,
    frames: Option<u64>,
    size: Option<(u32, u32)>,
) -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(HandleRegistry::new());

    let mut readers = Vec::with_capacity(inputs.len());
    for input in inputs {
        readers.push(FrameReader::open(input, SourceOptions::new(), &registry)?);
    }

    let fps = fps
        .or_else(|| readers.first().and_then(|reader| reader.info().fps))
        .unwrap_or(DEFAULT_FPS);

    let mut sink_options = SinkOptions::new();
    if let Some((width, height)) = size {
        sink_options = sink_options.size(width, height);
    }
    let mut writer = FrameWriter::open(out, fps, sink_options, &registry)?;

    let total: Option<u64> = readers
        .iter()
        .map(|reader| match frames {
            Some(frames) => reader
                .estimated_frame_count()
                .map(|count| count.saturating_sub(start).min(frames)),
            None => reader
                .estimated_frame_count()
                .map(|count| count.saturating_sub(start)),
        })
        .sum();
    let progress = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::no_length(),
    };
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} frames ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for mut reader in readers {
        reader.skip(start)?;
        let mut remaining = frames;
        while remaining != Some(0) {
            let Some(frame) = reader.next_frame()? else {
                break;
            };
            writer.write(frame)?;
            progress.inc(1);
            if let Some(remaining) = remaining.as_mut() {
                *remaining -= 1;
            }
        }
        reader.close()?;
    }

    writer.close()?;
    progress.finish_and_clear();
    println!("wrote {}", out.display());
    Ok(())
}

//! Command-line interface for the JPEG session tool.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use crate::batch::{BatchOptions, BatchStats, BatchTranscoder};
use crate::config::SessionConfig;
use crate::conversion::{DecodeConversion, EncodeConversion};
use crate::decoder::DecoderSession;
use crate::error::Result;
use crate::format::{ColorSpace, PixelFormat};
use crate::pipeline::{default_color_space, EncodeOptions, EncodeResult, TranscodePipeline};

/// Streaming JPEG encoder/decoder
///
/// Inspect, encode, decode and batch-transcode JPEG files through
/// scanline sessions.
#[derive(Parser, Debug)]
#[command(name = "jsess")]
#[command(version)]
#[command(about = "Streaming JPEG encode/decode sessions")]
#[command(long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the header of a JPEG file
    Info {
        /// Input JPEG file
        #[arg(short, long)]
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Encode a raster image (PNG, BMP, ...) to JPEG
    Encode {
        /// Input raster file
        #[arg(short, long)]
        input: PathBuf,

        /// Output JPEG file
        #[arg(short, long)]
        output: PathBuf,

        /// Pixel format handed to the encoder
        #[arg(long, value_enum, default_value = "rgb")]
        input_format: FormatArg,

        /// Colour space stored in the stream (derived from the input format if omitted)
        #[arg(long, value_enum)]
        color_space: Option<FormatArg>,

        /// JPEG quality 1-100 (0 = settings default)
        #[arg(short = 'Q', long)]
        quality: Option<u8>,

        /// Decode the result and report PSNR
        #[arg(long)]
        verify: bool,
    },

    /// Decode a JPEG file
    Decode {
        /// Input JPEG file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (GRAY/RGB: raster by extension, others: raw samples)
        #[arg(short, long)]
        output: PathBuf,

        /// Output pixel format
        #[arg(short, long, value_enum, default_value = "rgb")]
        format: FormatArg,
    },

    /// Transcode every JPEG in a directory
    Batch {
        /// Input directory
        #[arg(long)]
        input_dir: PathBuf,

        /// Output directory
        #[arg(long)]
        output_dir: PathBuf,

        /// JPEG quality 1-100
        #[arg(short = 'Q', long)]
        quality: Option<u8>,

        /// Intermediate pixel format (default: keep the stream's colour space)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Scan subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// List the supported colour conversions
    Conversions,
}

/// Pixel format / colour space argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    /// 8-bit grayscale
    Gray,
    /// 24-bit RGB
    Rgb,
    /// 24-bit YCbCr
    Ycc,
    /// 32-bit CMYK
    Cmyk,
    /// 32-bit YCCK
    Ycck,
    /// Big-gamut RGB
    BgRgb,
    /// Big-gamut YCbCr
    BgYcc,
}

impl From<FormatArg> for ColorSpace {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Gray => ColorSpace::Gray,
            FormatArg::Rgb => ColorSpace::Rgb,
            FormatArg::Ycc => ColorSpace::YCbCr,
            FormatArg::Cmyk => ColorSpace::Cmyk,
            FormatArg::Ycck => ColorSpace::Ycck,
            FormatArg::BgRgb => ColorSpace::BgRgb,
            FormatArg::BgYcc => ColorSpace::BgYcc,
        }
    }
}

impl From<FormatArg> for PixelFormat {
    fn from(arg: FormatArg) -> Self {
        PixelFormat::for_color_space(arg.into())
    }
}

/// Run the CLI application.
pub fn run(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    } else if !cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();
    }

    let config = match cli.config {
        Some(ref path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Info { input, json } => run_info(&input, json, cli.quiet),
        Commands::Encode {
            input,
            output,
            input_format,
            color_space,
            quality,
            verify,
        } => {
            let format = PixelFormat::from(input_format);
            let options = EncodeOptions {
                format,
                color_space: color_space.map_or_else(|| default_color_space(format), Into::into),
                quality: quality.unwrap_or(config.encoder.quality),
                verify,
            };
            let pipeline = TranscodePipeline::new(config);
            let result = pipeline.encode_file(&input, &output, &options)?;
            if !cli.quiet {
                print_encode_result(&result);
            }
            Ok(())
        }
        Commands::Decode {
            input,
            output,
            format,
        } => {
            let pipeline = TranscodePipeline::new(config);
            let result = pipeline.decode_file(&input, &output, format.into())?;
            if !cli.quiet {
                println!(
                    "Decoded {} ({}x{} {}) -> {} in {} ms",
                    result.source_path.display(),
                    result.width,
                    result.height,
                    result.format,
                    result.output_path.display(),
                    result.time_ms
                );
            }
            Ok(())
        }
        Commands::Batch {
            input_dir,
            output_dir,
            quality,
            format,
            threads,
            recursive,
        } => {
            let options = BatchOptions {
                quality: quality.unwrap_or(config.encoder.quality),
                format: format.map(Into::into),
                color_space: None,
            };
            let mut transcoder = BatchTranscoder::from_settings(options, &config.batch);
            if let Some(n) = threads {
                transcoder = transcoder.threads(n);
            }
            if recursive {
                transcoder = transcoder.recursive(true);
            }
            run_batch(&transcoder, &input_dir, &output_dir, cli.quiet)
        }
        Commands::Conversions => {
            print_conversions();
            Ok(())
        }
    }
}

/// Run info command.
fn run_info(input: &Path, json: bool, quiet: bool) -> Result<()> {
    let mut session = DecoderSession::new();
    session.configure_path(input)?;
    let info = session.query_info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!("JPEG File Information");
    println!("=====================");
    println!("File: {}", input.display());
    println!("  Dimensions: {}x{}", info.width, info.height);
    println!("  Components: {}", info.components);
    println!("  Colour space: {}", info.color_space);
    let outputs: Vec<String> = DecodeConversion::ALL
        .iter()
        .filter(|c| c.jpeg_color_space() == info.color_space)
        .map(|c| c.output_format().to_string())
        .collect();
    println!("  Decodes to: {}", outputs.join(", "));
    Ok(())
}

fn run_batch(
    transcoder: &BatchTranscoder,
    input_dir: &Path,
    output_dir: &Path,
    quiet: bool,
) -> Result<()> {
    let total = transcoder.discover(input_dir)?.len() as u64;
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total)
    };
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
    {
        bar.set_style(style);
    }

    let stats = transcoder.process_directory_with(input_dir, output_dir, |outcome| {
        let name = outcome
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        bar.set_message(name);
        bar.inc(1);
    })?;
    bar.finish_and_clear();

    if !quiet {
        print_batch_stats(&stats);
    }
    Ok(())
}

/// Print both conversion tables.
fn print_conversions() {
    println!("Encode (input => stream):");
    for conv in EncodeConversion::ALL {
        println!("  {:<18} {:#010x}", conv.name(), conv.raw());
    }
    println!();
    println!("Decode (stream => output):");
    for conv in DecodeConversion::ALL {
        println!("  {:<18} {:#010x}", conv.name(), conv.raw());
    }
}

/// Print encode result.
fn print_encode_result(result: &EncodeResult) {
    println!("Encode Result:");
    println!("  Conversion: {}", result.conversion);
    println!("  Dimensions: {}x{}", result.width, result.height);
    println!("  Raw Size: {} bytes", result.raw_size);
    println!("  JPEG Size: {} bytes", result.compressed_size);
    println!("  Compression Ratio: {:.2}:1", result.compression_ratio());
    println!("  Time: {} ms", result.time_ms);
    if let Some(ref psnr) = result.psnr {
        println!("  {}", psnr);
    }
}

fn print_batch_stats(stats: &BatchStats) {
    println!("Batch Result:");
    println!("  Files: {}", stats.total_files);
    println!("  Transcoded: {}", stats.successful);
    println!("  Failed: {}", stats.failed);
    println!(
        "  Input: {} bytes, Output: {} bytes ({:.2}:1)",
        stats.total_input_bytes,
        stats.total_output_bytes,
        stats.overall_ratio()
    );
    println!("  Time: {} ms", stats.total_time_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encode() {
        let cli = Cli::try_parse_from([
            "jsess", "encode", "-i", "a.png", "-o", "a.jpg", "--input-format", "bg-ycc", "-Q", "90",
        ])
        .unwrap();
        match cli.command {
            Commands::Encode {
                input_format,
                color_space,
                quality,
                ..
            } => {
                assert_eq!(PixelFormat::from(input_format), PixelFormat::BG_YCC);
                assert!(color_space.is_none());
                assert_eq!(quality, Some(90));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["jsess", "conversions", "--quiet", "--config", "s.toml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("s.toml")));
    }

    #[test]
    fn test_format_args_cover_all_formats() {
        let all: Vec<PixelFormat> = FormatArg::value_variants()
            .iter()
            .map(|&a| PixelFormat::from(a))
            .collect();
        assert_eq!(all, PixelFormat::ALL.to_vec());
    }
}

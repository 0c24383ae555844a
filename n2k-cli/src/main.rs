//! NMEA2000 Log Decoder CLI Application
//!
//! This is the command-line interface for the NMEA2000 log decoder.
//! It uses the n2k-decoder library and adds:
//! - candump log reading
//! - Dictionary loading with a local overlay document
//! - Record filters and named presets
//! - PGN statistics and device directory reports

use anyhow::{bail, Context, Result};
use clap::Parser;
use n2k_decoder::{
    merge_documents, DecodedEvent, DecodedMessage, Decoder, MessageHeader, PgnDictionary, Transport,
};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

mod config;
mod filter;
mod input;
mod report;

use config::{AppConfig, FilterConfig};
use filter::RecordFilter;

/// NMEA2000 Log Decoder - Decode and analyze NMEA2000 CAN logs
#[derive(Parser, Debug)]
#[command(name = "n2k-cli")]
#[command(about = "Decode NMEA2000 candump logs with a canboat PGN dictionary", long_about = None)]
#[command(version)]
struct Args {
    /// candump log file to decode
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// canboat JSON dictionary
    #[arg(short, long, value_name = "FILE")]
    dictionary: Option<PathBuf>,

    /// Local dictionary additions merged into the main document
    #[arg(long, value_name = "FILE")]
    overlay: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only keep these PGNs (comma separated)
    #[arg(long, value_name = "PGN", value_delimiter = ',')]
    include_pgn: Vec<u32>,

    /// Drop these PGNs (comma separated)
    #[arg(long, value_name = "PGN", value_delimiter = ',')]
    exclude_pgn: Vec<u32>,

    /// Only keep messages from or to these addresses (comma separated)
    #[arg(long, value_name = "ADDR", value_delimiter = ',')]
    address: Vec<u8>,

    /// Keep only the first message of each distinct payload
    #[arg(long)]
    distinct: bool,

    /// Apply a named preset from the configuration file
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Print PGN statistics instead of decoded messages
    #[arg(long)]
    stats: bool,

    /// Print the device directory instead of decoded messages
    #[arg(long)]
    devices: bool,

    /// Maximum number of frames to decode
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,

    /// Keep numeric values in dictionary units
    #[arg(long)]
    raw_units: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// One decoded message as written to the output
#[derive(Serialize)]
struct OutputRecord<'a> {
    #[serde(flatten)]
    header: &'a MessageHeader,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    decoded: Option<&'a DecodedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a DecodedEvent> for OutputRecord<'a> {
    fn from(event: &'a DecodedEvent) -> Self {
        let error = match event {
            DecodedEvent::Failed { error, .. } => Some(error.to_string()),
            _ => None,
        };
        Self {
            header: event.header(),
            description: event.description(),
            decoded: event.message(),
            error,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("NMEA2000 Log Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", n2k_decoder::VERSION);

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    let Some(log_path) = args.log.clone() else {
        println!("NMEA2000 Log Decoder - No input specified");
        println!("\nQuick Start:");
        println!("  n2k-cli --log candump.log --dictionary canboat.json");
        println!("  n2k-cli --log candump.log --config config.toml --stats");
        println!("\nUse --help for more options");
        return Ok(());
    };

    let dictionary_path = args
        .dictionary
        .clone()
        .or_else(|| config.dictionary.path.clone())
        .context("No dictionary given: use --dictionary or [dictionary] path in the config file")?;
    let overlay_path = args.overlay.clone().or_else(|| config.dictionary.overlay.clone());

    let dictionary = load_dictionary(&dictionary_path, overlay_path.as_deref())?;

    let mut decoder_config = config.decoder.clone();
    if args.raw_units {
        decoder_config.convert_units = false;
    }
    let mut decoder = Decoder::new(dictionary.into_handle(), decoder_config);

    let stats = decoder.dictionary_stats();
    log::info!(
        "Dictionary: {} definitions, {} PGNs, {} lookup tables",
        stats.num_definitions,
        stats.num_pgns,
        stats.direct_lookups + stats.indirect_lookups + stats.bit_lookups
    );

    let filter = build_filter(&args, &config)?;
    let headers = assemble_log(&mut decoder, &log_path, args.max_frames)?;
    let headers = filter.apply(headers);

    // Reassembly is done; the remaining messages are independent
    let message_decoder = decoder.message_decoder().clone();
    let events: Vec<DecodedEvent> = headers
        .into_par_iter()
        .map(|header| message_decoder.decode_header(header))
        .collect();

    let failed = events
        .iter()
        .filter(|e| matches!(e, DecodedEvent::Failed { .. }))
        .count();
    log::info!("Decoded {} messages ({} failed)", events.len(), failed);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if args.stats {
        write!(out, "{}", report::render_statistics(&report::pgn_statistics(&events)))?;
    } else if args.devices {
        write!(out, "{}", report::render_devices(&report::device_directory(&events)))?;
    } else {
        for event in &events {
            serde_json::to_writer_pretty(&mut out, &OutputRecord::from(event))?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Read the canboat document, merge the overlay and build the dictionary
fn load_dictionary(path: &Path, overlay: Option<&Path>) -> Result<PgnDictionary> {
    log::info!("Loading dictionary: {:?}", path);
    let mut document = read_json(path)?;

    if let Some(overlay) = overlay {
        log::info!("Merging local dictionary: {:?}", overlay);
        document = merge_documents(document, read_json(overlay)?);
    }

    n2k_decoder::dictionary::parse_canboat_value(document)
        .with_context(|| format!("Invalid dictionary: {:?}", path))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {:?}", path))
}

/// Combine config file filters, command-line filters and the selected preset
fn build_filter(args: &Args, config: &AppConfig) -> Result<RecordFilter> {
    let mut filter_config: FilterConfig = config.filter.clone();
    filter_config.include_pgns.extend(&args.include_pgn);
    filter_config.exclude_pgns.extend(&args.exclude_pgn);
    filter_config.addresses.extend(&args.address);
    filter_config.distinct |= args.distinct;

    let mut filter = RecordFilter::new(&filter_config);
    if let Some(name) = &args.preset {
        let Some(preset) = config.preset(name) else {
            bail!("Unknown preset '{}'", name);
        };
        log::info!("Using preset '{}': {:?}", preset.name, preset.include_pgns);
        filter = filter.with_preset(preset);
    }

    Ok(filter)
}

/// Read the log and turn its frames into logical messages, in log order
fn assemble_log(decoder: &mut Decoder, path: &Path, max_frames: Option<usize>) -> Result<Vec<MessageHeader>> {
    log::info!("Decoding log file: {:?}", path);
    let file = File::open(path).with_context(|| format!("Failed to open log file: {:?}", path))?;
    let (mut frames, _failures) =
        input::read_frames(BufReader::new(file)).with_context(|| format!("Failed to read log file: {:?}", path))?;

    if let Some(max) = max_frames {
        frames.truncate(max);
    }

    let emit_unknown = decoder.config().emit_unknown;
    let headers: Vec<MessageHeader> = frames
        .into_iter()
        .filter_map(|frame| decoder.assemble(frame))
        .filter(|h| emit_unknown || h.transport != Transport::Unknown)
        .collect();

    let abandoned = decoder.flush();
    let stats = decoder.reassembly_stats();
    log::info!(
        "Fast packets: {} completed, {} frames discarded, {} duplicates, {} abandoned ({} at end of log)",
        stats.completed,
        stats.discarded,
        stats.duplicates,
        stats.evicted,
        abandoned
    );

    Ok(headers)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

//! candump log reader
//!
//! Turns `candump` text logs into normalized frames. Two layouts are
//! understood, detected from the first record of the file:
//!
//! ```text
//! (1700000000.123456) can0 09F80103#7B2AC2211E7F0C00     -l / -L log files
//!   can0  09F80103   [8]  7B 2A C2 21 1E 7F 0C 00        console output
//! ```
//!
//! Lines that fit neither layout are skipped.

use chrono::{DateTime, SecondsFormat, Utc};
use n2k_decoder::{CanFrame, DecoderError};
use std::io::BufRead;

/// Errors for a single log line
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("line {line}: invalid CAN identifier '{id}'")]
    InvalidId { line: usize, id: String },

    #[error("line {line}: invalid data '{data}'")]
    InvalidData { line: usize, data: String },

    #[error("line {line}: invalid timestamp '{timestamp}'")]
    InvalidTimestamp { line: usize, timestamp: String },

    #[error("line {line}: {source}")]
    Frame {
        line: usize,
        #[source]
        source: DecoderError,
    },

    #[error("Failed to read log: {0}")]
    Io(#[from] std::io::Error),
}

/// Layout of a candump log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `(timestamp) iface ID#DATA`
    Compact,
    /// `iface ID [len] XX XX ..`
    Columns,
}

impl LogFormat {
    /// Recognize the layout of one line
    pub fn detect(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [ts, _iface, record, ..] if ts.starts_with('(') && ts.ends_with(')') && record.contains('#') => {
                Some(LogFormat::Compact)
            }
            [_iface, id, len, ..] if is_hex(id) && len.starts_with('[') && len.ends_with(']') => {
                Some(LogFormat::Columns)
            }
            _ => None,
        }
    }
}

/// Read every frame from a candump log
///
/// Returns the frames plus the number of recognized lines that failed to parse;
/// each failure is logged and skipped.
pub fn read_frames<R: BufRead>(reader: R) -> Result<(Vec<CanFrame>, usize), InputError> {
    let mut format = None;
    let mut frames = Vec::new();
    let mut failures = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let number = idx + 1;

        let Some(line_format) = format.or_else(|| LogFormat::detect(&line)) else {
            continue;
        };
        if format.is_none() {
            log::debug!("Detected {:?} candump layout at line {}", line_format, number);
            format = Some(line_format);
        }

        match parse_line(&line, number, line_format) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => log::trace!("Skipping line {}: {}", number, line.trim()),
            Err(e) => {
                log::warn!("{}", e);
                failures += 1;
            }
        }
    }

    log::info!("Read {} frames ({} unreadable lines)", frames.len(), failures);
    Ok((frames, failures))
}

/// Parse one line in a known layout; `Ok(None)` for lines that are not records
pub fn parse_line(line: &str, number: usize, format: LogFormat) -> Result<Option<CanFrame>, InputError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match format {
        LogFormat::Compact => {
            let [ts, _iface, record, ..] = tokens.as_slice() else {
                return Ok(None);
            };
            let Some(ts) = ts.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
                return Ok(None);
            };
            let Some((id, data)) = record.split_once('#') else {
                return Ok(None);
            };

            let timestamp = parse_timestamp(ts, number)?;
            let can_id = parse_id(id, number)?;
            let data = parse_packed_data(data, number)?;
            build_frame(can_id, data, Some(timestamp), number).map(Some)
        }
        LogFormat::Columns => {
            let [_iface, id, len, bytes @ ..] = tokens.as_slice() else {
                return Ok(None);
            };
            if !(len.starts_with('[') && len.ends_with(']')) {
                return Ok(None);
            }

            let can_id = parse_id(id, number)?;
            let data = bytes
                .iter()
                .map(|b| parse_byte(b, number))
                .collect::<Result<Vec<u8>, _>>()?;
            build_frame(can_id, data, None, number).map(Some)
        }
    }
}

fn build_frame(can_id: u32, data: Vec<u8>, timestamp: Option<String>, line: usize) -> Result<CanFrame, InputError> {
    CanFrame::from_can_id(can_id, data, timestamp).map_err(|source| InputError::Frame { line, source })
}

/// Seconds since the epoch, rendered as ISO-8601 UTC with milliseconds
fn parse_timestamp(text: &str, line: usize) -> Result<String, InputError> {
    let invalid = || InputError::InvalidTimestamp {
        line,
        timestamp: text.to_string(),
    };

    let seconds: f64 = text.parse().map_err(|_| invalid())?;
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round().min(999_999_999.0) as u32;
    let time: DateTime<Utc> = DateTime::from_timestamp(whole, nanos).ok_or_else(invalid)?;

    Ok(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn parse_id(text: &str, line: usize) -> Result<u32, InputError> {
    u32::from_str_radix(text, 16)
        .ok()
        .filter(|id| *id <= 0x1FFF_FFFF)
        .ok_or_else(|| InputError::InvalidId {
            line,
            id: text.to_string(),
        })
}

fn parse_byte(text: &str, line: usize) -> Result<u8, InputError> {
    u8::from_str_radix(text, 16).map_err(|_| InputError::InvalidData {
        line,
        data: text.to_string(),
    })
}

fn parse_packed_data(text: &str, line: usize) -> Result<Vec<u8>, InputError> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return Err(InputError::InvalidData {
            line,
            data: text.to_string(),
        });
    }
    (0..text.len())
        .step_by(2)
        .map(|i| parse_byte(&text[i..i + 2], line))
        .collect()
}

fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_hexdigit())
}

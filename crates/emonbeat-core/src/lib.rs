//! emonbeat core library: serial power-monitor frame acquisition.
//!
//! A sensor node on a shared serial bus emits one CRLF-terminated ASCII line
//! per record: space-separated decimal bytes that encode a fixed binary
//! layout (node id, four little-endian power channels, RMS voltage x 100).
//! This crate reads such lines from a port, tokenizes and decodes them into
//! typed [`Reading`]s, and drives the periodic poll loop around that core.
//!
//! Layering mirrors the data flow:
//! - `source`: port access and line accumulation (all serial I/O lives here)
//! - `frame`: tokenizer and decoder (pure, byte-oriented)
//! - `fetch`: one open -> read -> decode -> release cycle
//! - `poll`: scheduler, sinks and the last-reading cache
//! - `replay`: offline decoding of recorded captures into a report
//!
//! Invariants:
//! - Frames that are too short or come from another node are ignored, never
//!   reported as errors.
//! - The port is owned by exactly one cycle and released on every exit path.
//! - Readings are immutable values; no state is carried between cycles except
//!   through the explicit [`poll::LastReading`] cache.
//!
//! # Examples
//! ```
//! use emonbeat_core::{FetchOutcome, decode_line, frame::FrameDecoder};
//!
//! let outcome = decode_line(&FrameDecoder::default(), b"10 44 1 88 2 132 3 176 4 220 5\r\n")?;
//! let FetchOutcome::Reading(reading) = outcome else { unreachable!() };
//! assert_eq!(reading.power4, 1200);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

mod fetch;
pub mod frame;
pub mod poll;
mod replay;
pub mod source;

pub use fetch::{Fetch, FetchCycle, FetchError, FetchOutcome, decode_line};
pub use frame::IgnoreReason;
pub use replay::{ReplayError, decode_capture, decode_capture_file};
pub use source::{
    CancelToken, Deadline, FilePortFactory, LineReader, PortFactory, PortSettings,
    SerialPortFactory, SourceError,
};

/// Current decode report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Timestamp used when the system clock cannot be formatted.
pub const DEFAULT_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// One decoded measurement from the sensor node.
///
/// # Examples
/// ```
/// use emonbeat_core::Reading;
///
/// let reading = Reading {
///     node: 10,
///     power1: 300,
///     power2: 600,
///     power3: 900,
///     power4: 1200,
///     vrms: 15.0,
/// };
/// assert_eq!(reading.power4, 1200);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifier of the reporting node.
    pub node: u16,
    /// Instantaneous power, channel 1.
    pub power1: u16,
    /// Instantaneous power, channel 2.
    pub power2: u16,
    /// Instantaneous power, channel 3.
    pub power3: u16,
    /// Instantaneous power, channel 4.
    pub power4: u16,
    /// RMS voltage (wire value / 100).
    pub vrms: f32,
}

/// A reading stamped with its capture time, as handed to sinks.
///
/// # Examples
/// ```
/// use emonbeat_core::{Reading, ReadingEvent};
///
/// let event = ReadingEvent {
///     timestamp: "2024-01-01T00:00:00Z".to_string(),
///     reading: Reading { node: 10, power1: 1, power2: 2, power3: 3, power4: 4, vrms: 230.0 },
/// };
/// let json = serde_json::to_value(&event).unwrap();
/// assert_eq!(json["power3"], 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingEvent {
    /// RFC3339 capture time.
    pub timestamp: String,
    #[serde(flatten)]
    pub reading: Reading,
}

impl ReadingEvent {
    pub fn now(reading: Reading) -> Self {
        Self {
            timestamp: now_rfc3339(),
            reading,
        }
    }
}

/// Offline decode report for a recorded capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeReport {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// Input capture metadata.
    pub input: InputInfo,
    /// Line counters.
    pub summary: DecodeSummary,
    /// Decoded readings in line order.
    pub readings: Vec<Reading>,
    /// Lines that failed to tokenize, in line order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LineError>,
}

/// Tool metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

/// Input capture metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the decoder.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

/// Per-outcome line counts of a decoded capture.
///
/// # Examples
/// ```
/// use emonbeat_core::DecodeSummary;
///
/// let summary = DecodeSummary::default();
/// assert_eq!(summary.lines_total, 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeSummary {
    pub lines_total: u64,
    pub readings: u64,
    pub ignored: u64,
    pub errors: u64,
}

/// A capture line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    /// 1-based line number in the capture.
    pub line: u64,
    pub message: String,
}

/// Build an empty report with tool and input metadata filled in.
///
/// # Examples
/// ```
/// use emonbeat_core::make_stub_report;
///
/// let report = make_stub_report("capture.txt", 64);
/// assert_eq!(report.report_version, emonbeat_core::REPORT_VERSION);
/// assert!(report.readings.is_empty());
/// ```
pub fn make_stub_report(input_path: &str, input_bytes: u64) -> DecodeReport {
    DecodeReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "emonbeat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        summary: DecodeSummary::default(),
        readings: vec![],
        errors: vec![],
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| DEFAULT_TIMESTAMP.to_string())
}

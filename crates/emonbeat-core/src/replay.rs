use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::fetch::{FetchOutcome, decode_line};
use crate::frame::FrameDecoder;
use crate::{DecodeReport, DecodeSummary, LineError, Reading, make_stub_report};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode every line of a recorded serial capture.
///
/// # Errors
/// Returns `ReplayError::Io` when the capture cannot be read.
pub fn decode_capture_file(
    path: &Path,
    decoder: &FrameDecoder,
) -> Result<DecodeReport, ReplayError> {
    let bytes = std::fs::read(path)?;
    let mut report = make_stub_report(&path.display().to_string(), bytes.len() as u64);
    let (summary, readings, errors) = decode_capture(&bytes, decoder);
    report.summary = summary;
    report.readings = readings;
    report.errors = errors;
    Ok(report)
}

/// Decode an in-memory capture.
///
/// Lines are split on LF (a preceding CR is part of the line). A trailing
/// fragment without LF is decoded as a line of its own. Lines that fail to
/// tokenize are collected instead of aborting the replay.
///
/// # Examples
/// ```
/// use emonbeat_core::decode_capture;
/// use emonbeat_core::frame::FrameDecoder;
///
/// let capture = b"10 44 1 88 2 132 3 176 4 220 5\r\n7 1 2\r\n";
/// let (summary, readings, errors) = decode_capture(capture, &FrameDecoder::default());
/// assert_eq!(summary.lines_total, 2);
/// assert_eq!(readings.len(), 1);
/// assert!(errors.is_empty());
/// ```
pub fn decode_capture(
    bytes: &[u8],
    decoder: &FrameDecoder,
) -> (DecodeSummary, Vec<Reading>, Vec<LineError>) {
    let mut summary = DecodeSummary::default();
    let mut readings = Vec::new();
    let mut errors = Vec::new();

    for (index, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
        let line_no = index as u64 + 1;
        summary.lines_total += 1;
        match decode_line(decoder, line) {
            Ok(FetchOutcome::Reading(reading)) => {
                summary.readings += 1;
                readings.push(reading);
            }
            Ok(FetchOutcome::Ignored(reason)) => {
                debug!(line = line_no, %reason, "line ignored");
                summary.ignored += 1;
            }
            Err(err) => {
                warn!(line = line_no, error = %err, "line failed to decode");
                summary.errors += 1;
                errors.push(LineError {
                    line: line_no,
                    message: err.to_string(),
                });
            }
        }
    }

    (summary, readings, errors)
}

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::Reading;
use crate::frame::{Decoded, FrameDecoder, FrameError, IgnoreReason, tokenize};
use crate::source::{CancelToken, Deadline, LineReader, PortFactory, SourceError};

/// Result of a cycle that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Reading(Reading),
    Ignored(IgnoreReason),
}

impl From<Decoded> for FetchOutcome {
    fn from(value: Decoded) -> Self {
        match value {
            Decoded::Reading(reading) => FetchOutcome::Reading(reading),
            Decoded::Ignored(reason) => FetchOutcome::Ignored(reason),
        }
    }
}

/// Conditions that end a cycle without an outcome.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("port open failed: {0}")]
    PortOpen(SourceError),
    #[error("read failed: {0}")]
    Read(SourceError),
    #[error("parse failed: {0}")]
    Parse(FrameError),
    /// A field read past the frame. The decoder's length check rules this
    /// out for the fixed layout.
    #[error("decode failed: {0}")]
    Decode(FrameError),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Read(SourceError::Cancelled))
    }
}

impl From<SourceError> for FetchError {
    fn from(value: SourceError) -> Self {
        if value.is_open_error() {
            FetchError::PortOpen(value)
        } else {
            FetchError::Read(value)
        }
    }
}

/// A parameterless poll, invoked once per scheduler tick.
pub trait Fetch {
    fn fetch(&mut self) -> Result<FetchOutcome, FetchError>;
}

/// Tokenize and decode one raw line.
///
/// # Errors
/// `FetchError::Parse` when a token is not a byte value.
pub fn decode_line(decoder: &FrameDecoder, line: &[u8]) -> Result<FetchOutcome, FetchError> {
    let tokens = tokenize(line).map_err(FetchError::Parse)?;
    decoder
        .decode(&tokens)
        .map(FetchOutcome::from)
        .map_err(FetchError::Decode)
}

/// Opens the port, reads one frame, decodes it and releases the port.
pub struct FetchCycle<P> {
    factory: P,
    decoder: FrameDecoder,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl<P: PortFactory> FetchCycle<P> {
    pub fn new(factory: P, decoder: FrameDecoder) -> Self {
        Self {
            factory,
            decoder,
            timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Bound the line read of every cycle. Without a timeout a silent port
    /// blocks the cycle until a terminator arrives.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_once(&self) -> Result<FetchOutcome, FetchError> {
        let deadline = Deadline::from_timeout(self.timeout);
        let port = self.factory.open()?;
        debug!(device = %self.factory.describe(), "port opened");

        let line = {
            let mut reader = LineReader::new(port);
            reader.read_line(&deadline, &self.cancel)?
        };
        debug!(device = %self.factory.describe(), "port released");

        let outcome = decode_line(&self.decoder, &line)?;
        match &outcome {
            FetchOutcome::Reading(reading) => info!(
                node = reading.node,
                power1 = reading.power1,
                power2 = reading.power2,
                power3 = reading.power3,
                power4 = reading.power4,
                vrms = reading.vrms,
                "frame decoded"
            ),
            FetchOutcome::Ignored(reason) => debug!(%reason, "frame ignored"),
        }
        Ok(outcome)
    }
}

impl<P: PortFactory> Fetch for FetchCycle<P> {
    fn fetch(&mut self) -> Result<FetchOutcome, FetchError> {
        self.run_once()
    }
}

//! Periodic polling around the fetch core.
//!
//! The scheduler owns an explicit [`Fetch`] implementation and a [`Sink`];
//! nothing is registered globally. It runs one cycle at a time, waits out the
//! rest of the interval and keeps the last decoded reading in a separate
//! cache. Fatal cycles are handed to the sink and the loop continues on the
//! next tick; only sink write failures and cancellation end the run.

use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::ReadingEvent;
use crate::fetch::{Fetch, FetchError, FetchOutcome};
use crate::source::CancelToken;

/// Longest uninterrupted sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Receives the results of each cycle.
pub trait Sink {
    fn emit(&mut self, event: &ReadingEvent) -> std::io::Result<()>;

    /// Called for every fatal cycle. The default only logs.
    fn fail(&mut self, err: &FetchError) {
        error!(error = %err, "fetch cycle failed");
    }
}

/// Writes one JSON object per reading, newline separated.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn emit(&mut self, event: &ReadingEvent) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Last successfully decoded reading, kept outside the decoding core.
#[derive(Debug, Clone, Default)]
pub struct LastReading {
    event: Option<ReadingEvent>,
}

impl LastReading {
    pub fn update(&mut self, event: ReadingEvent) {
        self.event = Some(event);
    }

    pub fn get(&self) -> Option<&ReadingEvent> {
        self.event.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub cycles: u64,
    pub readings: u64,
    pub ignored: u64,
    pub errors: u64,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("sink write failed: {0}")]
    Sink(#[from] std::io::Error),
}

pub struct Scheduler<F, S> {
    fetcher: F,
    sink: S,
    interval: Duration,
    max_cycles: Option<u64>,
    cancel: CancelToken,
    last: LastReading,
}

impl<F: Fetch, S: Sink> Scheduler<F, S> {
    pub fn new(fetcher: F, sink: S, interval: Duration) -> Self {
        Self {
            fetcher,
            sink,
            interval,
            max_cycles: None,
            cancel: CancelToken::new(),
            last: LastReading::default(),
        }
    }

    /// Stop after `max_cycles` cycles; `None` runs until cancelled.
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn last_reading(&self) -> Option<&ReadingEvent> {
        self.last.get()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run cycles until the cycle limit is reached or the token is cancelled.
    ///
    /// # Errors
    /// Returns `PollError::Sink` when a reading cannot be written.
    pub fn run(&mut self) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();

        while !self.cancel.is_cancelled() && !self.limit_reached(&summary) {
            let started = Instant::now();
            summary.cycles += 1;

            match self.fetcher.fetch() {
                Ok(FetchOutcome::Reading(reading)) => {
                    let event = ReadingEvent::now(reading);
                    self.sink.emit(&event)?;
                    self.last.update(event);
                    summary.readings += 1;
                }
                Ok(FetchOutcome::Ignored(reason)) => {
                    debug!(%reason, cycle = summary.cycles, "no reading this cycle");
                    summary.ignored += 1;
                }
                Err(err) if err.is_cancelled() => {
                    info!("poll cancelled during read");
                    break;
                }
                Err(err) => {
                    self.sink.fail(&err);
                    summary.errors += 1;
                }
            }

            if !self.limit_reached(&summary) {
                self.sleep_remaining(started);
            }
        }

        info!(
            cycles = summary.cycles,
            readings = summary.readings,
            ignored = summary.ignored,
            errors = summary.errors,
            "poll finished"
        );
        Ok(summary)
    }

    fn limit_reached(&self, summary: &PollSummary) -> bool {
        self.max_cycles.is_some_and(|max| summary.cycles >= max)
    }

    /// Sleep until the next tick. An interval past the clock's range only
    /// ends through cancellation.
    fn sleep_remaining(&self, started: Instant) {
        let until = started.checked_add(self.interval);
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let slice = match until {
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return;
                    }
                    (until - now).min(SLEEP_SLICE)
                }
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

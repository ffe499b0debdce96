use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::SourceError;
use crate::frame::layout::LINE_TERMINATOR;

/// Size of a single bounded read from the port.
pub const READ_CHUNK_SIZE: usize = 128;

/// Pause after an end-of-stream read before trying again.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Point in time after which a line read gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<(Instant, Duration)>,
}

impl Deadline {
    /// No deadline: the read blocks until a terminator arrives.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Expire `budget` from now. A budget past the clock's range never
    /// expires.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now()
                .checked_add(budget)
                .map(|at| (at, budget)),
        }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::none, Self::after)
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|(at, _)| Instant::now() >= at)
    }

    pub fn budget(&self) -> Option<Duration> {
        self.at.map(|(_, budget)| budget)
    }
}

/// Cooperative cancellation flag shared between the poller and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Accumulates port bytes into CRLF-terminated lines.
///
/// Bytes read past the first terminator stay buffered for the next call on
/// the same reader; they are dropped together with the reader.
pub struct LineReader<R> {
    port: R,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(port: R) -> Self {
        Self {
            port,
            pending: Vec::new(),
        }
    }

    /// Bytes received after the last returned line.
    pub fn buffered(&self) -> &[u8] {
        &self.pending
    }

    /// Read until the first CRLF of the accumulated stream.
    ///
    /// The returned line always ends with the terminator. End-of-stream and
    /// read timeouts count as "nothing yet" and the loop keeps reading;
    /// any other I/O error aborts the call.
    ///
    /// # Errors
    /// `SourceError::Io` for port failures, `SourceError::TimedOut` once
    /// `deadline` passes and `SourceError::Cancelled` once `cancel` fires.
    /// Both are checked between reads, so a single blocking read is bounded
    /// only by the port's own timeout.
    pub fn read_line(
        &mut self,
        deadline: &Deadline,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, SourceError> {
        let mut line = std::mem::take(&mut self.pending);
        let mut scan_from = 0;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(end) = find_terminator(&line, scan_from) {
                self.pending = line.split_off(end);
                debug!(bytes = line.len(), "line complete");
                return Ok(line);
            }
            scan_from = line.len().saturating_sub(LINE_TERMINATOR.len() - 1);

            if cancel.is_cancelled() {
                self.pending = line;
                return Err(SourceError::Cancelled);
            }
            if deadline.is_expired() {
                self.pending = line;
                return Err(SourceError::TimedOut(deadline.budget().unwrap_or_default()));
            }

            match self.port.read(&mut chunk) {
                Ok(0) => {
                    trace!("end of stream, waiting for more bytes");
                    std::thread::sleep(IDLE_BACKOFF);
                }
                Ok(n) => {
                    trace!(bytes = n, total = line.len() + n, "read chunk");
                    line.extend_from_slice(&chunk[..n]);
                }
                Err(err) if is_transient(err.kind()) => {
                    trace!(kind = ?err.kind(), "no bytes available");
                }
                Err(err) => return Err(SourceError::Io(err)),
            }
        }
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

fn find_terminator(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
        .map(|pos| from + pos + LINE_TERMINATOR.len())
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, Deadline, LineReader, find_terminator};
    use crate::source::SourceError;
    use std::collections::VecDeque;
    use std::io::{self, ErrorKind, Read};
    use std::time::Duration;

    /// Replays a fixed script of read results, then reports end-of-stream.
    struct ScriptedPort {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedPort {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }

        fn chunks(chunks: &[&[u8]]) -> Self {
            Self::new(chunks.iter().map(|c| Ok(c.to_vec())).collect())
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }
    }

    fn read(port: ScriptedPort) -> Result<Vec<u8>, SourceError> {
        LineReader::new(port).read_line(
            &Deadline::after(Duration::from_millis(200)),
            &CancelToken::new(),
        )
    }

    #[test]
    fn reassembles_partial_reads() {
        let port = ScriptedPort::chunks(&[b"10 ", b"44 1 ", b"88\r\n"]);
        assert_eq!(read(port).unwrap(), b"10 44 1 88\r\n");
    }

    #[test]
    fn terminator_split_across_reads() {
        let port = ScriptedPort::chunks(&[b"1 2\r", b"\n"]);
        assert_eq!(read(port).unwrap(), b"1 2\r\n");
    }

    #[test]
    fn stops_at_first_terminator() {
        let mut reader = LineReader::new(ScriptedPort::chunks(&[b"1 2\r\n3 4\r\n5"]));
        let cancel = CancelToken::new();
        let deadline = Deadline::after(Duration::from_millis(200));
        assert_eq!(reader.read_line(&deadline, &cancel).unwrap(), b"1 2\r\n");
        assert_eq!(reader.buffered(), b"3 4\r\n5");
        assert_eq!(reader.read_line(&deadline, &cancel).unwrap(), b"3 4\r\n");
        assert_eq!(reader.buffered(), b"5");
    }

    #[test]
    fn lone_line_feed_does_not_terminate() {
        let port = ScriptedPort::chunks(&[b"1\n2", b"\r\n"]);
        assert_eq!(read(port).unwrap(), b"1\n2\r\n");
    }

    #[test]
    fn end_of_stream_and_timeouts_are_retried() {
        let port = ScriptedPort::new(vec![
            Ok(b"10 ".to_vec()),
            Ok(Vec::new()),
            Err(io::Error::new(ErrorKind::TimedOut, "serial timeout")),
            Err(io::Error::from(ErrorKind::Interrupted)),
            Ok(b"5\r\n".to_vec()),
        ]);
        assert_eq!(read(port).unwrap(), b"10 5\r\n");
    }

    #[test]
    fn hard_errors_abort() {
        let port = ScriptedPort::new(vec![
            Ok(b"10 ".to_vec()),
            Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
        ]);
        let err = read(port).unwrap_err();
        assert!(matches!(err, SourceError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn deadline_bounds_unterminated_stream() {
        let port = ScriptedPort::chunks(&[b"10 44 1"]);
        let mut reader = LineReader::new(port);
        let err = reader
            .read_line(&Deadline::after(Duration::from_millis(30)), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SourceError::TimedOut(budget) if budget == Duration::from_millis(30)));
        assert_eq!(reader.buffered(), b"10 44 1");
    }

    #[test]
    fn cancelled_before_reading() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut reader = LineReader::new(ScriptedPort::chunks(&[b"1\r\n"]));
        let err = reader.read_line(&Deadline::none(), &cancel).unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn deadline_none_never_expires() {
        let deadline = Deadline::from_timeout(None);
        assert!(!deadline.is_expired());
        assert_eq!(deadline.budget(), None);
    }

    #[test]
    fn unrepresentable_deadline_never_expires() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
        assert_eq!(deadline.budget(), None);
    }

    #[test]
    fn huge_timeout_still_reads_line() {
        let mut reader = LineReader::new(ScriptedPort::chunks(&[b"1 2", b"\r\n"]));
        let line = reader
            .read_line(&Deadline::from_timeout(Some(Duration::MAX)), &CancelToken::new())
            .unwrap();
        assert_eq!(line, b"1 2\r\n");
    }

    #[test]
    fn find_terminator_from_offset() {
        assert_eq!(find_terminator(b"ab\r\ncd\r\n", 0), Some(4));
        assert_eq!(find_terminator(b"ab\r\ncd\r\n", 3), Some(8));
        assert_eq!(find_terminator(b"ab", 5), None);
    }
}

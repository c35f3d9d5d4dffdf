//! Lock-free connection and request counters shared across every session.
//!
//! Pure observability: nothing here feeds back into a protocol decision.

use std::sync::atomic::{AtomicU64, Ordering};

use mbsrv_core::ExceptionCode;

/// Why a session ended, for the `closed_*` counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed cleanly (EOF on the next header read).
    Eof,
    /// MBAP framing was invalid (bad header fields or reserved function
    /// code).
    FramingError,
    /// An I/O error occurred on read or write.
    IoError,
}

/// Function codes never carry the high bit on a request PDU (values above
/// this close the connection before dispatch is ever reached), so a
/// per-function-code breakdown only needs this many slots.
const FUNCTION_CODE_SLOTS: usize = 0x80;

/// Largest exception code value defined by the Modbus specification; a
/// per-exception-code breakdown only needs this many slots.
const EXCEPTION_CODE_SLOTS: usize = 0x0C;

/// Process-wide server counters.
#[derive(Debug)]
pub struct Metrics {
    connections_accepted: AtomicU64,
    connections_active: AtomicU64,
    soft_limit_exceeded: AtomicU64,
    closed_eof: AtomicU64,
    closed_framing_error: AtomicU64,
    closed_io_error: AtomicU64,
    requests_dispatched: AtomicU64,
    exceptions_raised: AtomicU64,
    requests_by_function: [AtomicU64; FUNCTION_CODE_SLOTS],
    exceptions_by_code: [AtomicU64; EXCEPTION_CODE_SLOTS],
}

impl Metrics {
    /// Create a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            soft_limit_exceeded: AtomicU64::new(0),
            closed_eof: AtomicU64::new(0),
            closed_framing_error: AtomicU64::new(0),
            closed_io_error: AtomicU64::new(0),
            requests_dispatched: AtomicU64::new(0),
            exceptions_raised: AtomicU64::new(0),
            requests_by_function: std::array::from_fn(|_| AtomicU64::new(0)),
            exceptions_by_code: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Record a newly accepted connection, checking it against an optional
    /// soft cap on simultaneous connections. Never rejects the connection —
    /// only records that the cap was crossed.
    pub fn record_accept(&self, max_connections: Option<u32>) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        let active = self.connections_active.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = max_connections {
            if active > u64::from(max) {
                self.soft_limit_exceeded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record why a session closed.
    pub fn record_close(&self, reason: CloseReason) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
        let counter = match reason {
            CloseReason::Eof => &self.closed_eof,
            CloseReason::FramingError => &self.closed_framing_error,
            CloseReason::IoError => &self.closed_io_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatched request for `function`, the request's function
    /// code (already validated `<= 0x7F` by the session handler before
    /// dispatch is reached).
    pub fn record_request(&self, function: u8) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = self.requests_by_function.get(function as usize) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one exception response.
    pub fn record_exception(&self, exception: ExceptionCode) {
        self.exceptions_raised.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = self.exceptions_by_code.get(exception.code() as usize) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            soft_limit_exceeded: self.soft_limit_exceeded.load(Ordering::Relaxed),
            closed_eof: self.closed_eof.load(Ordering::Relaxed),
            closed_framing_error: self.closed_framing_error.load(Ordering::Relaxed),
            closed_io_error: self.closed_io_error.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            exceptions_raised: self.exceptions_raised.load(Ordering::Relaxed),
        }
    }

    /// Dispatched-request counts broken down by function code, omitting
    /// codes that have never been seen.
    #[must_use]
    pub fn requests_by_function(&self) -> Vec<(u8, u64)> {
        nonzero_counts(&self.requests_by_function)
    }

    /// Exception counts broken down by exception code, omitting codes that
    /// have never been raised.
    #[must_use]
    pub fn exceptions_by_code(&self) -> Vec<(u8, u64)> {
        nonzero_counts(&self.exceptions_by_code)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn nonzero_counts(counters: &[AtomicU64]) -> Vec<(u8, u64)> {
    counters
        .iter()
        .enumerate()
        .filter_map(|(code, counter)| {
            let n = counter.load(Ordering::Relaxed);
            (n > 0).then_some((code as u8, n))
        })
        .collect()
}

/// A point-in-time read of [`Metrics`]'s flat counters. Per-function-code
/// and per-exception-code breakdowns are read separately via
/// [`Metrics::requests_by_function`]/[`Metrics::exceptions_by_code`] since
/// their size varies with what has actually been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Total connections accepted since startup.
    pub connections_accepted: u64,
    /// Connections currently open.
    pub connections_active: u64,
    /// Times an accepted connection pushed `connections_active` above the
    /// configured soft cap.
    pub soft_limit_exceeded: u64,
    /// Sessions closed by clean EOF.
    pub closed_eof: u64,
    /// Sessions closed by a framing violation.
    pub closed_framing_error: u64,
    /// Sessions closed by an I/O error.
    pub closed_io_error: u64,
    /// Total requests successfully dispatched (success or exception).
    pub requests_dispatched: u64,
    /// Total exception responses produced.
    pub exceptions_raised: u64,
}

//! Benchmark engine: timed kernel execution over one working set.
//!
//! # Scope
//! The engine owns the [`WorkingSet`] and exposes one operation per kernel
//! family (`run_read`, `run_write`, `run_copy`), each parameterized by a
//! [`Tier`]. It measures the traversal with a monotonic clock, converts the
//! elapsed time to MiB/s counting both buffers' traffic, and verifies the
//! read checksum against the closed-form expectation.
//!
//! # Timing
//! The timer brackets only the traversal. Streaming kernels fence their
//! non-temporal stores before returning, so the stop timestamp observes
//! completed memory traffic. Setup, checksum verification, and bookkeeping
//! are all outside the timed region.
//!
//! # Verification
//! The read checksum is compared against `N*(N-1)/2 mod 2^64` only while
//! the working set holds the canonical interleaved progression. A write
//! pass restores that pattern; a copy pass destroys it (B becomes a copy of
//! A), so a read after a copy records its checksum without judging it.

use std::fmt;
use std::time::{Duration, Instant};

use crate::kernels::{kernel_for, Tier};
use crate::working_set::{AllocError, WorkingSet};

/// Errors from kernel execution.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The host cannot execute the requested tier. Non-fatal; surfaced as
    /// "N/A" in output.
    UnsupportedTier(Tier),
    /// The read-pass checksum did not match the closed-form expectation.
    /// Fatal: either the machine's memory/CPU is unstable or the fill logic
    /// is defective, and neither may be ignored.
    DataIntegrity { expected: u64, actual: u64 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedTier(tier) => {
                write!(f, "instruction-set tier {tier} is not supported on this CPU")
            }
            Self::DataIntegrity { expected, actual } => write!(
                f,
                "read checksum mismatch (expected {expected:#x}, got {actual:#x}); \
                 memory error or CPU instability?"
            ),
        }
    }
}

impl std::error::Error for EngineError {}

/// The benchmark engine. One instance per session; the working set is
/// allocated once and reused by every kernel invocation.
pub struct Engine {
    ws: WorkingSet,
}

impl Engine {
    /// Allocates a working set of `megabytes` MiB per buffer and seeds it.
    ///
    /// # Errors
    /// Propagates `AllocError` from the working set; construction is
    /// all-or-nothing.
    pub fn new(megabytes: usize) -> Result<Self, AllocError> {
        Ok(Self {
            ws: WorkingSet::new(megabytes)?,
        })
    }

    /// Size of each buffer in MiB.
    pub fn task_size_mib(&self) -> usize {
        self.ws.task_size_mib()
    }

    /// Checksum recorded by the most recent read pass.
    pub fn last_checksum(&self) -> u64 {
        self.ws.last_checksum()
    }

    /// Shared view of the working set (tests and diagnostics).
    pub fn working_set(&self) -> &WorkingSet {
        &self.ws
    }

    /// Runs the read kernel: lockstep traversal of A and B accumulating
    /// 64-bit lane sums. Returns the observed throughput in MiB/s.
    ///
    /// # Errors
    /// - `UnsupportedTier` when the host cannot execute `tier`.
    /// - `DataIntegrity` when the canonical pattern is intact but the
    ///   checksum disagrees with the closed-form sum.
    pub fn run_read(&mut self, tier: Tier) -> Result<u64, EngineError> {
        let kernel = kernel_for(tier).ok_or(EngineError::UnsupportedTier(tier))?;
        let len = self.ws.task_size_bytes();
        let (a, b) = (self.ws.a().as_ptr(), self.ws.b().as_ptr());

        let start = Instant::now();
        // SAFETY: dispatch succeeded for this host; the working set
        // guarantees alignment and length divisibility.
        let checksum = unsafe { kernel.read(a, b, len) };
        let elapsed = start.elapsed();

        self.ws.set_last_checksum(checksum);
        if self.ws.pattern_intact() {
            let expected = self.ws.expected_checksum();
            if checksum != expected {
                return Err(EngineError::DataIntegrity {
                    expected,
                    actual: checksum,
                });
            }
        }

        Ok(throughput_mib_s(len, elapsed))
    }

    /// Runs the write kernel: fills A with even and B with odd 64-bit
    /// values, monotonically increasing. Returns MiB/s.
    ///
    /// # Errors
    /// `UnsupportedTier` when the host cannot execute `tier`.
    pub fn run_write(&mut self, tier: Tier) -> Result<u64, EngineError> {
        let kernel = kernel_for(tier).ok_or(EngineError::UnsupportedTier(tier))?;
        let len = self.ws.task_size_bytes();
        let (a, b) = self.ws.split_mut();
        let (a, b) = (a.as_mut_ptr(), b.as_mut_ptr());

        let start = Instant::now();
        // SAFETY: as in `run_read`, with exclusive access to both buffers.
        unsafe { kernel.write(a, b, len) };
        let elapsed = start.elapsed();

        // The write kernels reproduce the canonical progression.
        self.ws.set_pattern_intact(true);
        Ok(throughput_mib_s(len, elapsed))
    }

    /// Runs the copy kernel: streams A into B with a fixed-distance
    /// prefetch ahead of the read pointer. Returns MiB/s.
    ///
    /// # Errors
    /// `UnsupportedTier` when the host cannot execute `tier`.
    pub fn run_copy(&mut self, tier: Tier) -> Result<u64, EngineError> {
        let kernel = kernel_for(tier).ok_or(EngineError::UnsupportedTier(tier))?;
        let len = self.ws.task_size_bytes();
        let (a, b) = self.ws.split_a_b_mut();
        let (a, b) = (a.as_ptr(), b.as_mut_ptr());

        let start = Instant::now();
        // SAFETY: as in `run_read`; A is read-only, B exclusively written.
        unsafe { kernel.copy(a, b, len) };
        let elapsed = start.elapsed();

        // B no longer holds the odd half of the progression.
        self.ws.set_pattern_intact(false);
        Ok(throughput_mib_s(len, elapsed))
    }
}

/// Observed throughput in MiB/s, counting traffic across both buffers.
///
/// `task_size_bytes * 2` bytes moved, converted to MiB, divided by elapsed
/// seconds expressed via a microsecond denominator. Returns 0 when the
/// elapsed time rounds to zero microseconds: too fast to measure at the
/// clock's resolution.
fn throughput_mib_s(task_size_bytes: usize, elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    if micros == 0 {
        return 0;
    }
    ((task_size_bytes as u128 * 2 * 1_000_000) / (1024 * 1024) / micros) as u64
}

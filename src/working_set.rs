//! Aligned buffer allocation and the benchmark working set.
//!
//! # Scope
//! Vectorized load/store kernels require aligned base addresses, and the
//! throughput numbers are only honest when every page of the working set is
//! backed by physical memory before the first timed pass. This module owns
//! both concerns:
//! - `AlignedBuf`: a single allocation with a guaranteed alignment boundary,
//!   released with the identical layout on drop.
//! - `WorkingSet`: the two equal-size regions ("A" and "B") the kernels
//!   traverse, plus the checksum bookkeeping for read-pass verification.
//!
//! # Invariants
//! - `a` and `b` are always the same size, fixed at construction.
//! - Both base addresses are multiples of [`BUF_ALIGN`] for the lifetime of
//!   the working set.
//! - `task_size_bytes` is a multiple of 64 (widest stride times unroll), so
//!   every kernel traverses the buffers without a remainder loop.
//! - While `pattern_intact` is set, the union of both buffers holds every
//!   64-bit integer in `0..lane_count()` exactly once (A the evens, B the
//!   odds).
//!
//! # Failure modes
//! Allocation failures and misaligned results are reported via `AllocError`
//! and are fatal to construction; there is no degraded mode.

use std::alloc::{alloc, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Alignment boundary for both benchmark buffers.
///
/// 32 bytes is the minimum the 256-bit kernels need; 64 keeps the buffers on
/// cache-line boundaries as well.
pub const BUF_ALIGN: usize = 64;

/// Errors from aligned buffer allocation.
#[derive(Debug)]
#[non_exhaustive]
pub enum AllocError {
    /// A zero-byte buffer was requested.
    SizeZero,
    /// The requested size/alignment is not representable as a layout
    /// (overflow or non-power-of-two alignment).
    InvalidLayout { bytes: usize, align: usize },
    /// The allocator returned null.
    OutOfMemory { bytes: usize },
    /// The allocator returned a pointer that violates the alignment
    /// contract. This indicates a broken platform allocator, not a
    /// recoverable condition.
    Misaligned { addr: usize, align: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeZero => write!(f, "requested a zero-byte buffer"),
            Self::InvalidLayout { bytes, align } => {
                write!(f, "invalid layout: {bytes} bytes aligned to {align}")
            }
            Self::OutOfMemory { bytes } => {
                write!(f, "failed to allocate {bytes} bytes")
            }
            Self::Misaligned { addr, align } => {
                write!(f, "allocator returned {addr:#x}, not a multiple of {align}")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// A heap region with a guaranteed base-address alignment.
///
/// Acquisition and release are paired through `Drop`, so the buffer cannot
/// leak or be freed with a mismatched layout on any exit path.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The buffer is exclusively owned; the raw pointer never aliases.
unsafe impl Send for AlignedBuf {}

impl AlignedBuf {
    /// Allocates `bytes` of uninitialized memory aligned to `align`.
    ///
    /// `align` must be a power of two, at least 32. The returned address is
    /// checked against `align`: a violation is a platform fault and is
    /// reported rather than retried.
    ///
    /// # Errors
    /// - `SizeZero` if `bytes == 0`.
    /// - `InvalidLayout` if the layout is not representable.
    /// - `OutOfMemory` if the allocator returns null.
    /// - `Misaligned` if the returned address violates `align`.
    pub fn alloc(bytes: usize, align: usize) -> Result<Self, AllocError> {
        if bytes == 0 {
            return Err(AllocError::SizeZero);
        }
        let layout = Layout::from_size_align(bytes, align)
            .map_err(|_| AllocError::InvalidLayout { bytes, align })?;

        // SAFETY: layout is valid and has non-zero size.
        let raw = unsafe { alloc(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory { bytes })?;

        let addr = ptr.as_ptr() as usize;
        if addr % align != 0 {
            // SAFETY: raw came from `alloc` with this exact layout.
            unsafe { dealloc(ptr.as_ptr(), layout) };
            return Err(AllocError::Misaligned { addr, align });
        }

        Ok(Self { ptr, layout })
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// True if the region is empty (never the case for a live buffer).
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the region is owned, live, and `len` bytes long.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the region is owned, live, and `len` bytes long.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }

    /// View as 64-bit lanes. Requires `len` to be a multiple of 8, which
    /// `WorkingSet` guarantees.
    pub fn as_lanes(&self) -> &[u64] {
        debug_assert_eq!(self.len() % 8, 0);
        // SAFETY: the base address is at least 8-aligned (BUF_ALIGN >= 8)
        // and the length is a whole number of lanes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u64>(), self.len() / 8) }
    }

    /// Mutable view as 64-bit lanes.
    pub fn as_lanes_mut(&mut self) -> &mut [u64] {
        debug_assert_eq!(self.len() % 8, 0);
        // SAFETY: as in `as_lanes`, plus exclusive access via `&mut self`.
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u64>(), self.len() / 8)
        }
    }

    /// Writes `byte` to every position of the region.
    pub fn fill(&mut self, byte: u8) {
        self.as_mut_slice().fill(byte);
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: ptr came from `alloc` with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// The benchmark engine's state: two aligned buffers and the most recent
/// read-pass checksum.
///
/// Construction eagerly touches every byte of both buffers. On-demand
/// virtual memory leaves pages unbacked until first write, which would
/// inflate the first write pass and break the read pass's checksum, so the
/// touch is mandatory, not cosmetic. After the touch, both buffers are
/// seeded with the canonical interleaved progression (A = 0,2,4,...;
/// B = 1,3,5,...) so a read pass is verifiable from the first call.
pub struct WorkingSet {
    task_size_bytes: usize,
    a: AlignedBuf,
    b: AlignedBuf,
    last_checksum: u64,
    pattern_intact: bool,
}

impl WorkingSet {
    /// Allocates and initializes a working set of `megabytes` MiB per buffer.
    ///
    /// # Errors
    /// Fails with `AllocError` if either allocation fails or violates the
    /// alignment contract. On failure nothing is leaked: a buffer allocated
    /// before the failing one is released by its own drop.
    pub fn new(megabytes: usize) -> Result<Self, AllocError> {
        let task_size_bytes = megabytes
            .checked_mul(1024 * 1024)
            .ok_or(AllocError::InvalidLayout {
                bytes: megabytes,
                align: BUF_ALIGN,
            })?;

        let mut a = AlignedBuf::alloc(task_size_bytes, BUF_ALIGN)?;
        let mut b = AlignedBuf::alloc(task_size_bytes, BUF_ALIGN)?;

        // Touch every page before any kernel runs.
        a.fill(0xAA);
        b.fill(0xEE);

        let mut ws = Self {
            task_size_bytes,
            a,
            b,
            last_checksum: 0,
            pattern_intact: false,
        };
        ws.seed_pattern();
        Ok(ws)
    }

    /// Restores the canonical interleaved progression in both buffers.
    ///
    /// This is the same sequence the write kernels produce: buffer A holds
    /// the even integers and buffer B the odd integers, so together they
    /// contain every value in `0..lane_count()` exactly once.
    pub fn seed_pattern(&mut self) {
        for (i, lane) in self.a.as_lanes_mut().iter_mut().enumerate() {
            *lane = (i as u64).wrapping_mul(2);
        }
        for (i, lane) in self.b.as_lanes_mut().iter_mut().enumerate() {
            *lane = (i as u64).wrapping_mul(2).wrapping_add(1);
        }
        self.pattern_intact = true;
    }

    /// Size of each buffer in bytes.
    pub fn task_size_bytes(&self) -> usize {
        self.task_size_bytes
    }

    /// Size of each buffer in MiB.
    pub fn task_size_mib(&self) -> usize {
        self.task_size_bytes / (1024 * 1024)
    }

    /// Total number of 64-bit lanes across both buffers.
    pub fn lane_count(&self) -> u64 {
        (self.task_size_bytes as u64 / 8) * 2
    }

    /// The checksum a read pass must produce while the canonical pattern is
    /// intact: the triangular sum of `0..lane_count()`, reduced mod 2^64 to
    /// match the kernels' wrapping lane arithmetic.
    pub fn expected_checksum(&self) -> u64 {
        let n = self.lane_count() as u128;
        ((n * (n - 1)) / 2) as u64
    }

    pub fn a(&self) -> &AlignedBuf {
        &self.a
    }

    pub fn b(&self) -> &AlignedBuf {
        &self.b
    }

    pub fn a_mut(&mut self) -> &mut AlignedBuf {
        &mut self.a
    }

    pub fn b_mut(&mut self) -> &mut AlignedBuf {
        &mut self.b
    }

    /// Borrows A immutably and B mutably at the same time (copy kernels).
    pub fn split_a_b_mut(&mut self) -> (&AlignedBuf, &mut AlignedBuf) {
        (&self.a, &mut self.b)
    }

    /// Borrows both buffers mutably at the same time (write kernels).
    pub fn split_mut(&mut self) -> (&mut AlignedBuf, &mut AlignedBuf) {
        (&mut self.a, &mut self.b)
    }

    /// Checksum produced by the most recent read pass.
    pub fn last_checksum(&self) -> u64 {
        self.last_checksum
    }

    pub(crate) fn set_last_checksum(&mut self, checksum: u64) {
        self.last_checksum = checksum;
    }

    /// Whether the buffers currently hold the canonical progression.
    pub fn pattern_intact(&self) -> bool {
        self.pattern_intact
    }

    pub(crate) fn set_pattern_intact(&mut self, intact: bool) {
        self.pattern_intact = intact;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_buf_respects_boundary() {
        for align in [32usize, 64, 128, 256, 4096] {
            let buf = AlignedBuf::alloc(align * 4, align).unwrap();
            assert_eq!(buf.as_ptr() as usize % align, 0);
            assert_eq!(buf.len(), align * 4);
        }
    }

    #[test]
    fn aligned_buf_repeated_cycles() {
        // Alignment must hold across many allocate/release cycles.
        for _ in 0..64 {
            let buf = AlignedBuf::alloc(4096, BUF_ALIGN).unwrap();
            assert_eq!(buf.as_ptr() as usize % BUF_ALIGN, 0);
        }
    }

    #[test]
    fn aligned_buf_zero_size_is_an_error() {
        assert!(matches!(
            AlignedBuf::alloc(0, BUF_ALIGN),
            Err(AllocError::SizeZero)
        ));
    }

    #[test]
    fn aligned_buf_bad_alignment_is_an_error() {
        assert!(matches!(
            AlignedBuf::alloc(64, 48),
            Err(AllocError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn working_set_size_overflow_is_an_error() {
        assert!(matches!(
            WorkingSet::new(usize::MAX),
            Err(AllocError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn working_set_seeds_canonical_pattern() {
        let ws = WorkingSet::new(1).unwrap();
        assert!(ws.pattern_intact());
        assert_eq!(ws.task_size_bytes(), 1024 * 1024);

        let a = ws.a().as_lanes();
        let b = ws.b().as_lanes();
        assert_eq!(a[0], 0);
        assert_eq!(a[1], 2);
        assert_eq!(b[0], 1);
        assert_eq!(b[1], 3);
        assert_eq!(a[a.len() - 1], (a.len() as u64 - 1) * 2);
        assert_eq!(b[b.len() - 1], (b.len() as u64 - 1) * 2 + 1);
    }

    #[test]
    fn expected_checksum_matches_scalar_sum() {
        let ws = WorkingSet::new(1).unwrap();
        let mut sum = 0u64;
        for lane in ws.a().as_lanes() {
            sum = sum.wrapping_add(*lane);
        }
        for lane in ws.b().as_lanes() {
            sum = sum.wrapping_add(*lane);
        }
        assert_eq!(sum, ws.expected_checksum());
    }
}

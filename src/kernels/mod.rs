//! Per-tier vectorized traversal kernels.
//!
//! # Scope
//! Each instruction-set tier is one strategy implementation behind the
//! [`VectorKernel`] interface, selected once per call through
//! [`kernel_for`]. Every implementation owns its own stride, unroll, and
//! prefetch constants, so tier differences live in one place instead of
//! being scattered across conditionals.
//!
//! # Safety model
//! Kernel entry points are compiled with `#[target_feature]` and are only
//! reachable through `kernel_for`, which gates each tier on runtime feature
//! detection. Executing an unsupported vector instruction is undefined
//! behavior, so the trait methods stay `unsafe` and document the contract.
//!
//! Buffers handed to a kernel must be [`BUF_ALIGN`]-aligned and their length
//! a multiple of 64 bytes; `WorkingSet` guarantees both.
//!
//! [`BUF_ALIGN`]: crate::working_set::BUF_ALIGN

use std::fmt;

#[cfg(target_arch = "x86_64")]
mod x86;

/// One instruction-set capability level the engine can target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Tier {
    /// 128-bit integer vectors (SSE2). Baseline on x86_64.
    Baseline128,
    /// 256-bit vectors without native 64-bit integer addition (AVX).
    Wide256,
    /// 256-bit vectors with integer operations (AVX2).
    Wide256Int,
}

impl Tier {
    /// All tiers in reporting order (widest first).
    pub const ALL: [Tier; 3] = [Tier::Wide256Int, Tier::Wide256, Tier::Baseline128];

    /// Conventional instruction-set name for console output.
    pub fn label(self) -> &'static str {
        match self {
            Tier::Baseline128 => "SSE2",
            Tier::Wide256 => "AVX",
            Tier::Wide256Int => "AVX2",
        }
    }

    /// Bytes per vector load/store at this tier.
    pub fn stride(self) -> usize {
        match self {
            Tier::Baseline128 => 16,
            Tier::Wide256 | Tier::Wide256Int => 32,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strategy interface for one tier's three traversal kernels.
///
/// All methods traverse front to back in lockstep and never touch memory
/// outside `len` bytes per buffer (prefetch hints may point past the end;
/// they are advisory and cannot fault).
pub trait VectorKernel: Sync {
    /// The tier this implementation targets.
    fn tier(&self) -> Tier;

    /// Loads chunks from both buffers, accumulates 64-bit lane sums, and
    /// returns the horizontal sum (wrapping arithmetic throughout).
    ///
    /// # Safety
    /// The host must support [`Self::tier`], `a` and `b` must be valid for
    /// `len` bytes, 64-byte aligned, and `len` a multiple of 64.
    unsafe fn read(&self, a: *const u8, b: *const u8, len: usize) -> u64;

    /// Fills A with the even integers and B with the odd integers as
    /// 64-bit lanes, monotonically increasing, advancing by the lane count
    /// per chunk. High-throughput tiers use non-temporal stores and fence
    /// before returning.
    ///
    /// # Safety
    /// As [`Self::read`], with both buffers writable.
    unsafe fn write(&self, a: *mut u8, b: *mut u8, len: usize);

    /// Copies A into B chunk by chunk with a fixed-distance prefetch ahead
    /// of the read pointer. High-throughput tiers use non-temporal stores
    /// and fence before returning.
    ///
    /// # Safety
    /// As [`Self::read`], with `b` writable and not overlapping `a`.
    unsafe fn copy(&self, a: *const u8, b: *mut u8, len: usize);
}

/// Selects the kernel for `tier`, or `None` when the host cannot execute it.
///
/// This is the single dispatch point: a returned kernel is safe to invoke on
/// this host (subject to the pointer contract on each method).
pub fn kernel_for(tier: Tier) -> Option<&'static dyn VectorKernel> {
    #[cfg(target_arch = "x86_64")]
    {
        x86::kernel_for(tier)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = tier;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_labels_and_strides() {
        assert_eq!(Tier::Baseline128.label(), "SSE2");
        assert_eq!(Tier::Wide256.label(), "AVX");
        assert_eq!(Tier::Wide256Int.label(), "AVX2");
        assert_eq!(Tier::Baseline128.stride(), 16);
        assert_eq!(Tier::Wide256.stride(), 32);
        assert_eq!(Tier::Wide256Int.stride(), 32);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn baseline_tier_always_dispatches_on_x86_64() {
        let kernel = kernel_for(Tier::Baseline128).expect("SSE2 is baseline on x86_64");
        assert_eq!(kernel.tier(), Tier::Baseline128);
    }

    #[test]
    fn dispatched_kernel_reports_its_tier() {
        for tier in Tier::ALL {
            if let Some(kernel) = kernel_for(tier) {
                assert_eq!(kernel.tier(), tier);
            }
        }
    }
}

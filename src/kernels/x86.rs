//! x86_64 kernel implementations (SSE2, AVX, AVX2).
//!
//! Stride, unroll, and prefetch distances are per-tier constants owned by
//! each implementation:
//! - SSE2 processes two 16-byte chunks per iteration and prefetches four
//!   chunks ahead on the read pass.
//! - AVX processes one 32-byte chunk per iteration; it has no 256-bit
//!   integer addition, so lane increments ride on denormal-domain double
//!   adds and lane sums fall back to 128-bit integer adds on the halves.
//! - AVX2 processes one 32-byte chunk per iteration for read/write and two
//!   for copy.
//!
//! Write and copy use non-temporal stores on the SSE2 and AVX2 tiers; each
//! streaming kernel issues an `sfence` before returning so the stores are
//! globally visible before the caller stops its timer.

use core::arch::x86_64::*;

use super::{Tier, VectorKernel};

pub(super) fn kernel_for(tier: Tier) -> Option<&'static dyn VectorKernel> {
    match tier {
        // SSE2 is part of the x86_64 baseline; no runtime check needed.
        Tier::Baseline128 => Some(&Sse2Kernel),
        Tier::Wide256 if std::is_x86_feature_detected!("avx") => Some(&AvxKernel),
        Tier::Wide256Int if std::is_x86_feature_detected!("avx2") => Some(&Avx2Kernel),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// SSE2 (128-bit baseline)
// ---------------------------------------------------------------------------

struct Sse2Kernel;

impl VectorKernel for Sse2Kernel {
    fn tier(&self) -> Tier {
        Tier::Baseline128
    }

    unsafe fn read(&self, a: *const u8, b: *const u8, len: usize) -> u64 {
        // SAFETY: dispatch guaranteed SSE2; pointer contract is the caller's.
        unsafe { read_sse2(a, b, len) }
    }

    unsafe fn write(&self, a: *mut u8, b: *mut u8, len: usize) {
        // SAFETY: as above.
        unsafe { write_sse2(a, b, len) }
    }

    unsafe fn copy(&self, a: *const u8, b: *mut u8, len: usize) {
        // SAFETY: as above.
        unsafe { copy_sse2(a, b, len) }
    }
}

#[target_feature(enable = "sse2")]
unsafe fn read_sse2(a: *const u8, b: *const u8, len: usize) -> u64 {
    const STRIDE: usize = 16;
    // Two chunks per iteration, prefetch four chunks ahead of the loads.
    const PREFETCH_AHEAD: usize = STRIDE * 4;

    let mut sum = _mm_setzero_si128();
    let mut off = 0;
    while off != len {
        _mm_prefetch::<_MM_HINT_T0>(a.add(off + PREFETCH_AHEAD).cast());

        let a0 = _mm_load_si128(a.add(off).cast());
        let b0 = _mm_load_si128(b.add(off).cast());
        let a1 = _mm_load_si128(a.add(off + STRIDE).cast());
        let b1 = _mm_load_si128(b.add(off + STRIDE).cast());

        sum = _mm_add_epi64(sum, _mm_add_epi64(a0, b0));
        sum = _mm_add_epi64(sum, _mm_add_epi64(a1, b1));
        off += STRIDE * 2;
    }

    let mut lanes = [0u64; 2];
    _mm_storeu_si128(lanes.as_mut_ptr().cast(), sum);
    lanes[0].wrapping_add(lanes[1])
}

#[target_feature(enable = "sse2")]
unsafe fn write_sse2(a: *mut u8, b: *mut u8, len: usize) {
    const STRIDE: usize = 16;

    let inc = _mm_set1_epi64x(4);
    let mut evens = _mm_set_epi64x(2, 0);
    let mut odds = _mm_set_epi64x(3, 1);

    let mut off = 0;
    while off != len {
        _mm_stream_si128(a.add(off).cast(), evens);
        evens = _mm_add_epi64(evens, inc);

        _mm_stream_si128(b.add(off).cast(), odds);
        odds = _mm_add_epi64(odds, inc);
        off += STRIDE;
    }

    // Streaming stores bypass cache; fence before the caller reads the clock.
    _mm_sfence();
}

#[target_feature(enable = "sse2")]
unsafe fn copy_sse2(a: *const u8, b: *mut u8, len: usize) {
    const STRIDE: usize = 16;
    const PREFETCH_AHEAD: usize = STRIDE * 2;

    let mut off = 0;
    while off != len {
        _mm_prefetch::<_MM_HINT_T0>(a.add(off + PREFETCH_AHEAD).cast());

        _mm_stream_si128(b.add(off).cast(), _mm_load_si128(a.add(off).cast()));
        _mm_stream_si128(
            b.add(off + STRIDE).cast(),
            _mm_load_si128(a.add(off + STRIDE).cast()),
        );
        off += STRIDE * 2;
    }

    _mm_sfence();
}

// ---------------------------------------------------------------------------
// AVX (256-bit, no integer ops)
// ---------------------------------------------------------------------------

struct AvxKernel;

impl VectorKernel for AvxKernel {
    fn tier(&self) -> Tier {
        Tier::Wide256
    }

    unsafe fn read(&self, a: *const u8, b: *const u8, len: usize) -> u64 {
        // SAFETY: dispatch verified AVX; pointer contract is the caller's.
        unsafe { read_avx(a, b, len) }
    }

    unsafe fn write(&self, a: *mut u8, b: *mut u8, len: usize) {
        // SAFETY: as above.
        unsafe { write_avx(a, b, len) }
    }

    unsafe fn copy(&self, a: *const u8, b: *mut u8, len: usize) {
        // SAFETY: as above.
        unsafe { copy_avx(a, b, len) }
    }
}

#[target_feature(enable = "avx")]
unsafe fn read_avx(a: *const u8, b: *const u8, len: usize) -> u64 {
    const STRIDE: usize = 32;

    // No 256-bit integer addition at this tier; sum the halves with SSE2.
    let mut sum = _mm_setzero_si128();
    let mut off = 0;
    while off != len {
        let a256: __m256i = _mm256_load_si256(a.add(off).cast());
        let b256: __m256i = _mm256_load_si256(b.add(off).cast());

        sum = _mm_add_epi64(
            sum,
            _mm_add_epi64(_mm256_castsi256_si128(a256), _mm256_castsi256_si128(b256)),
        );
        sum = _mm_add_epi64(
            sum,
            _mm_add_epi64(
                _mm256_extractf128_si256::<1>(a256),
                _mm256_extractf128_si256::<1>(b256),
            ),
        );
        off += STRIDE;
    }

    let mut lanes = [0u64; 2];
    _mm_storeu_si128(lanes.as_mut_ptr().cast(), sum);
    lanes[0].wrapping_add(lanes[1])
}

#[target_feature(enable = "avx")]
unsafe fn write_avx(a: *mut u8, b: *mut u8, len: usize) {
    const STRIDE: usize = 32;

    // Lane increments ride on double-precision adds over bit-reinterpreted
    // integers. Both operands stay in the denormal range (below 2^52), where
    // `add_pd` adds the mantissas exactly, so this is integer addition.
    let inc = _mm256_castsi256_pd(_mm256_set1_epi64x(8));
    let mut evens = _mm256_castsi256_pd(_mm256_set_epi64x(6, 4, 2, 0));
    let mut odds = _mm256_castsi256_pd(_mm256_set_epi64x(7, 5, 3, 1));

    let mut off = 0;
    while off != len {
        _mm256_store_si256(a.add(off).cast(), _mm256_castpd_si256(evens));
        evens = _mm256_add_pd(evens, inc);

        _mm256_store_si256(b.add(off).cast(), _mm256_castpd_si256(odds));
        odds = _mm256_add_pd(odds, inc);
        off += STRIDE;
    }
}

#[target_feature(enable = "avx")]
unsafe fn copy_avx(a: *const u8, b: *mut u8, len: usize) {
    const STRIDE: usize = 32;
    const PREFETCH_AHEAD: usize = STRIDE * 2;

    let mut off = 0;
    while off != len {
        _mm_prefetch::<_MM_HINT_T0>(a.add(off + PREFETCH_AHEAD).cast());

        _mm256_store_si256(b.add(off).cast(), _mm256_load_si256(a.add(off).cast()));
        _mm256_store_si256(
            b.add(off + STRIDE).cast(),
            _mm256_load_si256(a.add(off + STRIDE).cast()),
        );
        off += STRIDE * 2;
    }
}

// ---------------------------------------------------------------------------
// AVX2 (256-bit with integer ops)
// ---------------------------------------------------------------------------

struct Avx2Kernel;

impl VectorKernel for Avx2Kernel {
    fn tier(&self) -> Tier {
        Tier::Wide256Int
    }

    unsafe fn read(&self, a: *const u8, b: *const u8, len: usize) -> u64 {
        // SAFETY: dispatch verified AVX2; pointer contract is the caller's.
        unsafe { read_avx2(a, b, len) }
    }

    unsafe fn write(&self, a: *mut u8, b: *mut u8, len: usize) {
        // SAFETY: as above.
        unsafe { write_avx2(a, b, len) }
    }

    unsafe fn copy(&self, a: *const u8, b: *mut u8, len: usize) {
        // SAFETY: as above.
        unsafe { copy_avx2(a, b, len) }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn read_avx2(a: *const u8, b: *const u8, len: usize) -> u64 {
    const STRIDE: usize = 32;

    let mut sum = _mm256_setzero_si256();
    let mut off = 0;
    while off != len {
        let a256 = _mm256_load_si256(a.add(off).cast());
        let b256 = _mm256_load_si256(b.add(off).cast());

        sum = _mm256_add_epi64(sum, _mm256_add_epi64(a256, b256));
        off += STRIDE;
    }

    let mut lanes = [0u64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr().cast(), sum);
    lanes
        .iter()
        .fold(0u64, |acc, lane| acc.wrapping_add(*lane))
}

#[target_feature(enable = "avx2")]
unsafe fn write_avx2(a: *mut u8, b: *mut u8, len: usize) {
    const STRIDE: usize = 32;

    let inc = _mm256_set1_epi64x(8);
    let mut evens = _mm256_set_epi64x(6, 4, 2, 0);
    let mut odds = _mm256_set_epi64x(7, 5, 3, 1);

    let mut off = 0;
    while off != len {
        _mm256_stream_si256(a.add(off).cast(), evens);
        evens = _mm256_add_epi64(evens, inc);

        _mm256_stream_si256(b.add(off).cast(), odds);
        odds = _mm256_add_epi64(odds, inc);
        off += STRIDE;
    }

    _mm_sfence();
}

#[target_feature(enable = "avx2")]
unsafe fn copy_avx2(a: *const u8, b: *mut u8, len: usize) {
    const STRIDE: usize = 32;
    const PREFETCH_AHEAD: usize = STRIDE * 2;

    let mut off = 0;
    while off != len {
        _mm_prefetch::<_MM_HINT_T0>(a.add(off + PREFETCH_AHEAD).cast());

        _mm256_stream_si256(b.add(off).cast(), _mm256_load_si256(a.add(off).cast()));
        _mm256_stream_si256(
            b.add(off + STRIDE).cast(),
            _mm256_load_si256(a.add(off + STRIDE).cast()),
        );
        off += STRIDE * 2;
    }

    _mm_sfence();
}

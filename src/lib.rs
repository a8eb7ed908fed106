//! Single-threaded sustained main-memory bandwidth benchmark.
//!
//! ## Scope
//! This crate measures read, write, and copy bandwidth over a pair of large
//! aligned buffers using hand-vectorized kernels at three instruction-set
//! tiers (SSE2, AVX, AVX2), with best-of-N repetition and closed-form
//! checksum verification of the read path.
//!
//! ## Key invariants
//! - Buffers are 64-byte aligned and their size is a whole number of MiB,
//!   so every kernel stride divides the traversal exactly.
//! - The timed region covers only the traversal; streaming kernels fence
//!   their non-temporal stores before the stop timestamp.
//! - The read checksum is verified against `N*(N-1)/2 mod 2^64` whenever
//!   the working set holds the canonical interleaved even/odd progression;
//!   a mismatch is fatal.
//! - Unsupported tiers are skipped, never emulated: one code path per tier,
//!   selected by runtime CPU feature detection.
//!
//! ## Session flow
//! `WorkingSet -> Engine -> run_session (per tier: Write, Read, Copy, each
//! best-of-N) -> SessionReport`
//!
//! ## Notable entry points
//! - [`Engine`]: timed kernel execution over one working set.
//! - [`run_session`] / [`TrialConfig`]: whole-session orchestration.
//! - [`HostProbe`]: which tiers this CPU can run.
//! - [`meminfo::query_memory_modules`]: informational RAM topology.

pub mod driver;
pub mod engine;
pub mod kernels;
pub mod meminfo;
pub mod probe;
pub mod report;
pub mod working_set;

pub use driver::{best_of, pin_current_thread, run_session, TrialConfig};
pub use engine::{Engine, EngineError};
pub use kernels::Tier;
pub use probe::{cpu_model, CapabilityProbe, HostProbe, StaticProbe};
pub use report::{SessionReport, TierRow};
pub use working_set::{AllocError, WorkingSet, BUF_ALIGN};

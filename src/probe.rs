//! Capability probe: which instruction-set tiers the host CPU supports.
//!
//! The probe is read-only and purely advisory to the trial driver: a tier
//! it reports unsupported is skipped without invoking any kernel, because
//! executing an unsupported vector instruction is undefined behavior.
//! Kernel dispatch re-checks the same features, so a lying probe degrades
//! to an `UnsupportedTier` error rather than a crash.

use crate::kernels::Tier;

/// Read-only report of per-tier host support.
pub trait CapabilityProbe {
    fn supports(&self, tier: Tier) -> bool;
}

/// Probe backed by runtime CPU feature detection.
pub struct HostProbe;

impl CapabilityProbe for HostProbe {
    fn supports(&self, tier: Tier) -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            match tier {
                // SSE2 is part of the x86_64 baseline.
                Tier::Baseline128 => true,
                Tier::Wide256 => std::is_x86_feature_detected!("avx"),
                Tier::Wide256Int => std::is_x86_feature_detected!("avx2"),
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = tier;
            false
        }
    }
}

/// Probe with fixed answers, for tests and forced configurations.
pub struct StaticProbe {
    supported: Vec<Tier>,
}

impl StaticProbe {
    /// Reports every tier unsupported.
    pub fn none() -> Self {
        Self { supported: Vec::new() }
    }

    /// Reports exactly the given tiers supported.
    pub fn only(tiers: &[Tier]) -> Self {
        Self {
            supported: tiers.to_vec(),
        }
    }
}

impl CapabilityProbe for StaticProbe {
    fn supports(&self, tier: Tier) -> bool {
        self.supported.contains(&tier)
    }
}

/// Human-readable processor model, best effort.
///
/// Uses the CPUID brand string on x86_64 and falls back to `/proc/cpuinfo`
/// elsewhere (or when the brand leaves are absent). Never fails; returns
/// "unknown CPU" when nothing better is available.
pub fn cpu_model() -> String {
    #[cfg(target_arch = "x86_64")]
    {
        if let Some(model) = cpuid_brand_string() {
            return model;
        }
    }
    fallback_cpu_model()
}

#[cfg(target_arch = "x86_64")]
fn cpuid_brand_string() -> Option<String> {
    use core::arch::x86_64::__cpuid;

    // SAFETY: CPUID is unprivileged and always present on x86_64.
    let max_extended = unsafe { __cpuid(0x8000_0000) }.eax;
    if max_extended < 0x8000_0004 {
        return None;
    }

    let mut bytes = Vec::with_capacity(48);
    for leaf in 0x8000_0002u32..=0x8000_0004 {
        // SAFETY: leaf support verified above.
        let regs = unsafe { __cpuid(leaf) };
        for reg in [regs.eax, regs.ebx, regs.ecx, regs.edx] {
            bytes.extend_from_slice(&reg.to_le_bytes());
        }
    }

    let model = String::from_utf8_lossy(&bytes);
    let model = model.trim_matches('\0').trim();
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

fn fallback_cpu_model() -> String {
    if let Ok(text) = std::fs::read_to_string("/proc/cpuinfo") {
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                if key.trim() == "model name" {
                    return value.trim().to_string();
                }
            }
        }
    }
    "unknown CPU".to_string()
}

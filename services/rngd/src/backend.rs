// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! DRNG back-end: auxiliary entropy pool plus a hash-based DRBG.
//!
//! The pool conditions caller-provided input with SHA-512 and tracks an
//! entropy estimate in bits; the DRBG derives output blocks from a working
//! state that is reseeded from the OS entropy source and the pool. Handlers
//! registered in the service tables are the only consumers.
//!
//! INVARIANTS:
//!   - The working state never leaves this module and is wiped on drop
//!   - The entropy estimate never exceeds the pool capacity
//!   - Prediction-resistant reads produce at most the credited pool
//!     entropy, reseed first, and spend the credit

use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use thiserror::Error;
use zeroize::Zeroize;

/// Digest width of the conditioner in bytes.
const DIGEST_BYTES: usize = 64;

/// Capacity of the auxiliary pool in bits; equals the conditioner digest size.
pub const POOL_SIZE_BITS: u32 = (DIGEST_BYTES * 8) as u32;

/// DRBG security strength in bytes; bounds one prediction-resistant read.
pub const SECURITY_STRENGTH_BYTES: usize = 32;

/// Generate calls after which a reseed is forced regardless of timing.
const RESEED_GENERATE_LIMIT: u64 = 1 << 20;

/// Default write-wakeup threshold in bits.
const DEFAULT_WRITE_WAKEUP_BITS: u32 = 4096;

/// Default minimum reseed interval in seconds.
const DEFAULT_MIN_RESEED_SECS: u32 = 600;

/// Failures surfaced by the back-end to RPC handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The DRNG has not yet been seeded at full security strength.
    #[error("DRNG not fully seeded")]
    NotFullySeeded,
    /// The DRNG has not yet reached its minimal seed level.
    #[error("DRNG not minimally seeded")]
    NotMinSeeded,
    /// The OS entropy source failed.
    #[error("entropy source unavailable")]
    EntropySource,
}

impl BackendError {
    /// Errno-style return code reported on the wire.
    pub fn ret_code(&self) -> i32 {
        match self {
            Self::NotFullySeeded | Self::NotMinSeeded => -libc::EAGAIN,
            Self::EntropySource => -libc::EIO,
        }
    }
}

/// Seed level a random-bytes request insists on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedRequirement {
    /// No guarantee; serve from whatever state the DRNG is in.
    Any,
    /// The DRNG must be at least minimally seeded.
    Min,
    /// The DRNG must be fully seeded.
    Full,
    /// Reseed from the entropy sources before generating.
    PredictionResistant,
}

struct BackendState {
    v: [u8; DIGEST_BYTES],
    key: [u8; DIGEST_BYTES],
    aux_pool: [u8; DIGEST_BYTES],
    aux_entropy_bits: u32,
    reseed_counter: u64,
    last_reseed: Instant,
    min_seeded: bool,
    fully_seeded: bool,
    force_reseed: bool,
    write_wakeup_bits: u32,
    min_reseed_secs: u32,
}

impl Drop for BackendState {
    fn drop(&mut self) {
        self.v.zeroize();
        self.key.zeroize();
        self.aux_pool.zeroize();
    }
}

/// Shared DRNG back-end handed to both service tables.
pub struct Backend {
    state: Mutex<BackendState>,
}

impl Backend {
    /// Creates a back-end seeded from the OS entropy source.
    pub fn new() -> Result<Self, BackendError> {
        let mut state = BackendState {
            v: [0u8; DIGEST_BYTES],
            key: [0u8; DIGEST_BYTES],
            aux_pool: [0u8; DIGEST_BYTES],
            aux_entropy_bits: 0,
            reseed_counter: 0,
            last_reseed: Instant::now(),
            min_seeded: false,
            fully_seeded: false,
            force_reseed: false,
            write_wakeup_bits: DEFAULT_WRITE_WAKEUP_BITS,
            min_reseed_secs: DEFAULT_MIN_RESEED_SECS,
        };
        Self::reseed(&mut state)?;
        Ok(Self { state: Mutex::new(state) })
    }

    fn reseed(state: &mut BackendState) -> Result<(), BackendError> {
        let mut fresh = [0u8; DIGEST_BYTES];
        OsRng
            .try_fill_bytes(&mut fresh)
            .map_err(|_| BackendError::EntropySource)?;

        let mut hasher = Sha512::new();
        hasher.update(b"rngd drbg seed v1");
        hasher.update(state.v);
        hasher.update(fresh);
        hasher.update(state.aux_pool);
        state.v = hasher.finalize().into();

        let mut hasher = Sha512::new();
        hasher.update(b"rngd drbg key v1");
        hasher.update(state.key);
        hasher.update(state.v);
        state.key = hasher.finalize().into();

        fresh.zeroize();

        // The pool credit is spent by folding the pool into the new seed.
        state.aux_entropy_bits = 0;
        state.reseed_counter = 0;
        state.last_reseed = Instant::now();
        state.min_seeded = true;
        state.fully_seeded = true;
        state.force_reseed = false;
        Ok(())
    }

    fn generate(state: &mut BackendState, out: &mut [u8]) -> Result<(), BackendError> {
        let interval = u64::from(state.min_reseed_secs);
        if state.force_reseed
            || state.reseed_counter >= RESEED_GENERATE_LIMIT
            || state.last_reseed.elapsed().as_secs() >= interval
        {
            Self::reseed(state)?;
        }

        let mut counter: u64 = 0;
        for chunk in out.chunks_mut(DIGEST_BYTES) {
            let mut hasher = Sha512::new();
            hasher.update(state.v);
            hasher.update(counter.to_le_bytes());
            let mut block: [u8; DIGEST_BYTES] = hasher.finalize().into();
            chunk.copy_from_slice(&block[..chunk.len()]);
            block.zeroize();
            counter = counter.wrapping_add(1);
        }

        // Advance the working state so earlier outputs cannot be recovered
        // from a later state capture.
        let mut hasher = Sha512::new();
        hasher.update(state.key);
        hasher.update(state.v);
        state.v = hasher.finalize().into();
        state.reseed_counter += 1;
        Ok(())
    }

    /// Fills `out` with random bytes, honoring the requested seed level.
    ///
    /// Returns the number of bytes produced. Only
    /// [`SeedRequirement::PredictionResistant`] may produce fewer bytes than
    /// requested; callers must tolerate zero.
    pub fn fill_random(
        &self,
        out: &mut [u8],
        requirement: SeedRequirement,
    ) -> Result<usize, BackendError> {
        let mut state = self.state.lock();
        match requirement {
            SeedRequirement::Any => {
                Self::generate(&mut state, out)?;
                Ok(out.len())
            }
            SeedRequirement::Min => {
                if !state.min_seeded {
                    return Err(BackendError::NotMinSeeded);
                }
                Self::generate(&mut state, out)?;
                Ok(out.len())
            }
            SeedRequirement::Full => {
                if !state.fully_seeded {
                    return Err(BackendError::NotFullySeeded);
                }
                Self::generate(&mut state, out)?;
                Ok(out.len())
            }
            SeedRequirement::PredictionResistant => {
                // Never hand out more than the entropy actually pulled: the
                // credited pool bits bound the output, and the reseed below
                // spends them.
                let produced = out
                    .len()
                    .min(state.aux_entropy_bits as usize / 8)
                    .min(SECURITY_STRENGTH_BYTES);
                Self::reseed(&mut state)?;
                if produced > 0 {
                    Self::generate(&mut state, &mut out[..produced])?;
                }
                Ok(produced)
            }
        }
    }

    /// Conditions caller data into the auxiliary pool, crediting entropy.
    pub fn add_entropy(&self, data: &[u8], entropy_bits: u32) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let mut hasher = Sha512::new();
        hasher.update(state.aux_pool);
        hasher.update(data);
        state.aux_pool = hasher.finalize().into();
        state.aux_entropy_bits = state
            .aux_entropy_bits
            .saturating_add(entropy_bits)
            .min(POOL_SIZE_BITS);
        Ok(())
    }

    /// Raises the pool entropy estimate without providing new data.
    pub fn add_to_entropy_count(&self, bits: u32) {
        let mut state = self.state.lock();
        state.aux_entropy_bits = state.aux_entropy_bits.saturating_add(bits).min(POOL_SIZE_BITS);
    }

    /// Zeroes the auxiliary pool and its entropy estimate.
    pub fn clear_pool(&self) {
        let mut state = self.state.lock();
        state.aux_pool.zeroize();
        state.aux_entropy_bits = 0;
    }

    /// Flags every DRNG for a reseed on its next generate.
    pub fn force_reseed(&self) {
        self.state.lock().force_reseed = true;
    }

    /// Whether the DRNG is seeded at full security strength.
    pub fn is_fully_seeded(&self) -> bool {
        self.state.lock().fully_seeded
    }

    /// Whether the DRNG has reached its minimal seed level.
    pub fn is_min_seeded(&self) -> bool {
        self.state.lock().min_seeded
    }

    /// Current entropy estimate of the auxiliary pool in bits.
    pub fn avail_entropy_bits(&self) -> u32 {
        self.state.lock().aux_entropy_bits
    }

    /// Capacity of the auxiliary pool in bits.
    pub fn avail_poolsize_bits(&self) -> u32 {
        POOL_SIZE_BITS
    }

    /// Current write-wakeup threshold in bits.
    pub fn write_wakeup_bits(&self) -> u32 {
        self.state.lock().write_wakeup_bits
    }

    /// Sets the write-wakeup threshold in bits.
    pub fn set_write_wakeup_bits(&self, bits: u32) {
        self.state.lock().write_wakeup_bits = bits;
    }

    /// Current minimum reseed interval in seconds.
    pub fn min_reseed_secs(&self) -> u32 {
        self.state.lock().min_reseed_secs
    }

    /// Sets the minimum reseed interval in seconds.
    pub fn set_min_reseed_secs(&self, secs: u32) {
        self.state.lock().min_reseed_secs = secs.max(1);
    }

    /// Multi-line, human-readable status report.
    pub fn status_text(&self) -> String {
        let state = self.state.lock();
        format!(
            "rngd {version}\n\
             DRNG security strength: {strength} bits\n\
             fully seeded: {fully}\n\
             minimally seeded: {min}\n\
             auxiliary pool entropy: {avail} / {size} bits\n\
             write wakeup threshold: {wakeup} bits\n\
             minimum reseed interval: {reseed} s\n",
            version = env!("CARGO_PKG_VERSION"),
            strength = SECURITY_STRENGTH_BYTES * 8,
            fully = state.fully_seeded,
            min = state.min_seeded,
            avail = state.aux_entropy_bits,
            size = POOL_SIZE_BITS,
            wakeup = state.write_wakeup_bits,
            reseed = state.min_reseed_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_at_construction() {
        let backend = Backend::new().unwrap();
        assert!(backend.is_fully_seeded());
        assert!(backend.is_min_seeded());
    }

    #[test]
    fn fill_random_produces_distinct_output() {
        let backend = Backend::new().unwrap();
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];
        assert_eq!(backend.fill_random(&mut a, SeedRequirement::Full).unwrap(), 48);
        assert_eq!(backend.fill_random(&mut b, SeedRequirement::Full).unwrap(), 48);
        assert_ne!(a, b);
        assert_ne!(a, [0u8; 48]);
    }

    #[test]
    fn prediction_resistant_reads_are_bounded_and_spend_credit() {
        let backend = Backend::new().unwrap();
        backend.add_entropy(b"fresh noise", 128).unwrap();
        assert_eq!(backend.avail_entropy_bits(), 128);

        let mut out = [0u8; 256];
        let produced = backend
            .fill_random(&mut out, SeedRequirement::PredictionResistant)
            .unwrap();
        // 128 credited bits allow exactly 16 bytes out.
        assert_eq!(produced, 16);
        assert_ne!(out[..16], [0u8; 16]);
        assert_eq!(backend.avail_entropy_bits(), 0);
    }

    #[test]
    fn prediction_resistant_reads_without_credit_produce_nothing() {
        let backend = Backend::new().unwrap();
        assert_eq!(backend.avail_entropy_bits(), 0);

        let mut out = [0u8; 64];
        let produced = backend
            .fill_random(&mut out, SeedRequirement::PredictionResistant)
            .unwrap();
        assert_eq!(produced, 0);
        assert_eq!(out, [0u8; 64]);
    }

    #[test]
    fn prediction_resistant_reads_cap_at_security_strength() {
        let backend = Backend::new().unwrap();
        backend.add_entropy(b"plenty of noise", POOL_SIZE_BITS).unwrap();

        let mut out = [0u8; 256];
        let produced = backend
            .fill_random(&mut out, SeedRequirement::PredictionResistant)
            .unwrap();
        assert_eq!(produced, SECURITY_STRENGTH_BYTES);
    }

    #[test]
    fn entropy_credit_caps_at_poolsize() {
        let backend = Backend::new().unwrap();
        backend.add_entropy(b"a", u32::MAX).unwrap();
        assert_eq!(backend.avail_entropy_bits(), POOL_SIZE_BITS);
        backend.add_to_entropy_count(u32::MAX);
        assert_eq!(backend.avail_entropy_bits(), POOL_SIZE_BITS);
    }

    #[test]
    fn clear_pool_drops_the_estimate() {
        let backend = Backend::new().unwrap();
        backend.add_entropy(b"noise", 64).unwrap();
        backend.clear_pool();
        assert_eq!(backend.avail_entropy_bits(), 0);
        // Clearing the pool does not unseed the DRNG.
        assert!(backend.is_fully_seeded());
    }

    #[test]
    fn tunables_roundtrip() {
        let backend = Backend::new().unwrap();
        backend.set_write_wakeup_bits(256);
        assert_eq!(backend.write_wakeup_bits(), 256);
        backend.set_min_reseed_secs(0);
        assert_eq!(backend.min_reseed_secs(), 1);
        backend.set_min_reseed_secs(120);
        assert_eq!(backend.min_reseed_secs(), 120);
    }

    #[test]
    fn forced_reseed_still_generates() {
        let backend = Backend::new().unwrap();
        backend.force_reseed();
        let mut out = [0u8; 16];
        assert_eq!(backend.fill_random(&mut out, SeedRequirement::Any).unwrap(), 16);
    }

    #[test]
    fn status_text_names_the_seed_state() {
        let backend = Backend::new().unwrap();
        let text = backend.status_text();
        assert!(text.contains("fully seeded: true"));
        assert!(text.contains("auxiliary pool entropy"));
    }
}

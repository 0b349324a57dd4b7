//! Deterministic hash-to-prime encoding.
//!
//! Accumulated elements must be prime exponents: the collision resistance of
//! an RSA accumulator relies on the exponents being pairwise coprime, which
//! arbitrary digests do not guarantee.  This module maps arbitrary bytes to a
//! prime by hashing with SHA-256, interpreting the digest as a big-endian
//! unsigned integer and probing upward (`candidate`, `candidate + 1`, …)
//! until a Miller–Rabin test accepts.  The probe always starts from the same
//! digest and advances identically, so the mapping is a pure function of the
//! input bytes.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Upper bound on upward probes before `hash_to_prime` gives up.
///
/// By the prime number theorem the expected gap near a 256-bit candidate is
/// about 177, so hitting this bound signals a broken input path rather than
/// bad luck.  Exhaustion is surfaced as a hard failure, never retried.
pub const MAX_PRIME_PROBES: u32 = 65_536;

/// Maps arbitrary bytes to a prime exponent.
///
/// Returns `None` only when [`MAX_PRIME_PROBES`] consecutive candidates all
/// fail the primality test.
pub fn hash_to_prime(data: &[u8]) -> Option<BigUint> {
    let digest = Sha256::digest(data);
    next_prime_within(BigUint::from_bytes_be(&digest), MAX_PRIME_PROBES)
}

/// Probes upward from `candidate` for at most `max_probes` steps.
pub(crate) fn next_prime_within(mut candidate: BigUint, max_probes: u32) -> Option<BigUint> {
    for _ in 0..max_probes {
        if is_prime(&candidate) {
            return Some(candidate);
        }
        candidate += 1u32;
    }
    None
}

/// Small odd primes used for trial division before Miller–Rabin.
const SMALL_PRIMES: [u32; 8] = [3, 5, 7, 11, 13, 17, 19, 23];

/// Miller–Rabin witnesses.  Deterministic for all 64-bit integers; for the
/// 256-bit candidates produced by hashing the residual error is below 4^-12.
const MR_BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Probabilistic primality test with a trial-division fast path.
pub fn is_prime(n: &BigUint) -> bool {
    if *n == BigUint::from(2u32) {
        return true;
    }
    if n.is_zero() || n.is_one() || n.is_even() {
        return false;
    }
    for p in SMALL_PRIMES {
        let p = BigUint::from(p);
        if (n % &p).is_zero() {
            return *n == p;
        }
    }
    MR_BASES.iter().all(|&a| miller_rabin(n, a))
}

fn miller_rabin(n: &BigUint, base: u32) -> bool {
    let a = BigUint::from(base) % n;
    // A zero residue means n divides the base; the bases are prime, so n is
    // that base itself and the witness has nothing to say against it.
    if a.is_zero() {
        return true;
    }
    let one = BigUint::one();
    let n_minus_one = n - &one;

    // Write n - 1 = d * 2^s with d odd.
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while d.is_even() {
        d >>= 1;
        s += 1;
    }

    let mut x = a.modpow(&d, n);
    if x == one || x == n_minus_one {
        return true;
    }
    for _ in 1..s {
        x = x.modpow(&BigUint::from(2u32), n);
        if x == n_minus_one {
            return true;
        }
    }
    false
}

/// Samples a random prime of exactly `bits` bits by rejection.
///
/// Backs the dev-only parameter generator; production moduli come from an
/// external setup and never pass through here.
pub(crate) fn random_prime(bits: u64, rng: &mut impl RngCore) -> BigUint {
    debug_assert!(bits >= 8);
    let byte_len = ((bits + 7) / 8) as usize;
    let mut bytes = vec![0u8; byte_len];
    let width_mask = (BigUint::one() << bits) - 1u32;
    loop {
        rng.fill_bytes(&mut bytes);
        let mut candidate = BigUint::from_bytes_be(&bytes) & &width_mask;
        // Pin the top bit for exact width and the bottom bit for oddness.
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_prime(&candidate) {
            return candidate;
        }
    }
}

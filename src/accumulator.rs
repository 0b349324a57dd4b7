//! Dynamic RSA accumulator with constant-size membership proofs.
//!
//! The accumulator folds every element into a single group element
//! `A = g^(p_1 * p_2 * …) mod N`, where each `p_i` is the prime encoding of
//! an element (see [`crate::primes::hash_to_prime`]).  Adding an element is
//! one modular exponentiation; the value held *before* the add serves as the
//! membership witness, so every proof satisfies
//!
//! ```text
//! witness ^ element_hash ≡ accumulator  (mod N)
//! ```
//!
//! independently of every other proof.  Verification therefore needs only
//! the modulus and the proof — no replay, no shared state, O(1) work.
//!
//! Every transition is made durable in the write-ahead log before the
//! in-memory state advances, so a crash can lose at most an unacknowledged
//! operation and recovery always lands on an acknowledged state.

use crate::primes::{hash_to_prime, random_prime};
use crate::wal::{AccumulatorWal, WalError, WalOperation};
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Fixed public base the accumulator starts from.
pub const DEFAULT_GENERATOR: u32 = 65_537;

/// Errors raised by accumulator operations.
#[derive(Debug, thiserror::Error)]
pub enum AccumulatorError {
    /// The write-ahead log rejected or failed a durable append.
    #[error(transparent)]
    Wal(#[from] WalError),
    /// Hash-to-prime probing hit its upper bound without finding a prime.
    #[error("hash-to-prime probing exhausted its upper bound")]
    PrimeSearchExhausted,
    /// Removal was requested without a valid membership proof for the
    /// element, which would silently corrupt the accumulator.
    #[error("removal requires a valid membership proof for the element")]
    RemovalUnproven,
    /// The element's prime has no inverse modulo the supplied totient.
    #[error("element prime is not invertible modulo the totient")]
    NoModularInverse,
    /// Parameter or anchor file could not be read.
    #[error("io error: {0}")]
    Io(String),
    /// Parameter or anchor content could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Public accumulator parameters, consumed from an external setup.
///
/// The modulus is the product of two large primes whose factorization must
/// be unknown to verifiers; this crate never derives it itself outside the
/// explicitly insecure test generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorParams {
    /// RSA-style modulus `N`.
    pub modulus: BigUint,
    /// Public base `g` the empty accumulator equals.
    pub generator: BigUint,
}

#[derive(Serialize, Deserialize)]
struct ParamsFile {
    modulus: String,
    generator: String,
}

impl AccumulatorParams {
    /// Creates parameters with the default generator `65537`.
    pub fn new(modulus: BigUint) -> Self {
        Self {
            modulus,
            generator: BigUint::from(DEFAULT_GENERATOR),
        }
    }

    /// Creates parameters with an explicit generator.
    pub fn with_generator(modulus: BigUint, generator: BigUint) -> Self {
        Self { modulus, generator }
    }

    /// Loads parameters from a JSON file with decimal-encoded integers.
    pub fn from_json_file(path: &Path) -> Result<Self, AccumulatorError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| AccumulatorError::Io(err.to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Parses parameters previously emitted by
    /// [`AccumulatorParams::to_json_string`].
    pub fn from_json_str(input: &str) -> Result<Self, AccumulatorError> {
        let file: ParamsFile =
            serde_json::from_str(input).map_err(|err| AccumulatorError::Decode(err.to_string()))?;
        let modulus = parse_decimal(&file.modulus, "modulus")?;
        let generator = parse_decimal(&file.generator, "generator")?;
        Ok(Self { modulus, generator })
    }

    /// Serializes the parameters to JSON with decimal-encoded integers.
    pub fn to_json_string(&self) -> String {
        json!({
            "modulus": self.modulus.to_str_radix(10),
            "generator": self.generator.to_str_radix(10),
        })
        .to_string()
    }

    /// Generates a fresh modulus of roughly `bits` bits with a locally known
    /// factorization, returning the parameters and the removal secret.
    ///
    /// **Insecure by construction**: whoever runs this knows the totient and
    /// can forge membership.  Intended for tests and local development only;
    /// production parameters come from an external ceremony that discards
    /// the factors.
    pub fn generate_insecure(bits: u64) -> (Self, RemovalSecret) {
        let mut rng = rand::rngs::OsRng;
        let p = random_prime(bits / 2, &mut rng);
        let q = loop {
            let q = random_prime(bits / 2, &mut rng);
            if q != p {
                break q;
            }
        };
        let one = BigUint::one();
        let totient = (&p - &one) * (&q - &one);
        (Self::new(p * q), RemovalSecret::new(totient))
    }
}

fn parse_decimal(input: &str, field: &str) -> Result<BigUint, AccumulatorError> {
    BigUint::parse_bytes(input.as_bytes(), 10)
        .ok_or_else(|| AccumulatorError::Decode(format!("{field} is not a decimal integer")))
}

/// Capability object holding the Euler totient `phi(N)`.
///
/// Required only for [`RsaAccumulator::remove`] and passed in by reference;
/// the accumulator never stores it.  The value is overwritten with zero when
/// the capability is dropped.  `BigUint` offers no in-place scrubbing of
/// freed limbs, so the wipe is best-effort; deployments with an isolated
/// signer should keep the totient behind that boundary instead.
pub struct RemovalSecret {
    totient: BigUint,
}

impl RemovalSecret {
    /// Wraps a totient obtained from the parameter setup.
    pub fn new(totient: BigUint) -> Self {
        Self { totient }
    }

    pub(crate) fn totient(&self) -> &BigUint {
        &self.totient
    }
}

impl Drop for RemovalSecret {
    fn drop(&mut self) {
        self.totient.set_zero();
    }
}

impl fmt::Debug for RemovalSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RemovalSecret(..)")
    }
}

/// Constant-size membership proof for one accumulated element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorProof {
    /// Accumulator value immediately before the element was added.
    pub witness: BigUint,
    /// Accumulator value immediately after the element was added.
    pub accumulator: BigUint,
    /// Prime encoding of the element — the exponent of the transition, not
    /// the raw content hash.
    pub element_hash: BigUint,
    /// Sequence number of the transition that produced this proof.
    pub sequence: u64,
}

impl AccumulatorProof {
    /// Serializes the proof to JSON with decimal-encoded integers.
    pub fn to_json_string(&self) -> String {
        json!({
            "witness": self.witness.to_str_radix(10),
            "accumulator": self.accumulator.to_str_radix(10),
            "element_hash": self.element_hash.to_str_radix(10),
            "sequence": self.sequence,
        })
        .to_string()
    }

    /// Parses a proof previously emitted by
    /// [`AccumulatorProof::to_json_string`].
    pub fn from_json_str(input: &str) -> Result<Self, AccumulatorError> {
        let value: serde_json::Value =
            serde_json::from_str(input).map_err(|err| AccumulatorError::Decode(err.to_string()))?;
        let field = |name: &str| -> Result<BigUint, AccumulatorError> {
            let text = value
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| AccumulatorError::Decode(format!("missing {name}")))?;
            parse_decimal(text, name)
        };
        let sequence = value
            .get("sequence")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| AccumulatorError::Decode("missing sequence".to_string()))?;
        Ok(Self {
            witness: field("witness")?,
            accumulator: field("accumulator")?,
            element_hash: field("element_hash")?,
            sequence,
        })
    }
}

/// Verifies a membership proof against an explicit modulus.
///
/// This is the stateless form of [`RsaAccumulator::verify`]: a downstream
/// verifier needs only `N` and the proof, never the accumulator instance.
/// Domain violations — zero or over-range witness, exponent below 2 — fold
/// into `false` so the function is safe to call on adversarial input.
pub fn verify_membership(modulus: &BigUint, proof: &AccumulatorProof) -> bool {
    if modulus.is_zero() {
        return false;
    }
    if proof.witness.is_zero() || proof.witness >= *modulus {
        return false;
    }
    if proof.accumulator.is_zero() || proof.accumulator >= *modulus {
        return false;
    }
    if proof.element_hash <= BigUint::one() {
        return false;
    }
    proof.witness.modpow(&proof.element_hash, modulus) == proof.accumulator
}

/// Dynamic RSA accumulator backed by a write-ahead log.
///
/// The in-memory `(value, sequence)` pair is a cache of the log's tail:
/// every mutation is appended and fsynced before the cache advances, and
/// [`RsaAccumulator::open`] rebuilds the cache from the log.
pub struct RsaAccumulator {
    params: AccumulatorParams,
    value: BigUint,
    sequence: u64,
    wal: AccumulatorWal,
}

impl RsaAccumulator {
    /// Opens an accumulator over the log at `wal_path`, creating the log if
    /// needed and recovering `(sequence, value)` from its records.
    ///
    /// An empty log yields the sentinel state `sequence = 0`,
    /// `value = generator`.
    pub fn open(
        params: AccumulatorParams,
        wal_path: impl AsRef<Path>,
    ) -> Result<Self, AccumulatorError> {
        let wal = AccumulatorWal::open(wal_path)?;
        let (sequence, value) = wal.cached_state()?;
        let value = value.unwrap_or_else(|| params.generator.clone());
        Ok(Self {
            params,
            value,
            sequence,
            wal,
        })
    }

    /// Public parameters this accumulator runs over.
    pub fn params(&self) -> &AccumulatorParams {
        &self.params
    }

    /// Current accumulator value.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Sequence number of the latest durable transition.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Folds `element` into the accumulator.
    ///
    /// Returns the new accumulator value together with a membership proof
    /// whose witness is the pre-add value.  The transition is durable in the
    /// log before this returns; on any error the in-memory state is exactly
    /// as it was and the add must be treated as never having happened.
    pub fn add(
        &mut self,
        element: &[u8],
    ) -> Result<(BigUint, AccumulatorProof), AccumulatorError> {
        let prime = hash_to_prime(element).ok_or(AccumulatorError::PrimeSearchExhausted)?;
        let old_value = self.value.clone();
        let new_value = old_value.modpow(&prime, &self.params.modulus);
        let sequence = self
            .wal
            .append(WalOperation::Add, &new_value, &scar_id(element))?;
        self.value = new_value.clone();
        self.sequence = sequence;
        let proof = AccumulatorProof {
            witness: old_value,
            accumulator: new_value.clone(),
            element_hash: prime,
            sequence,
        };
        Ok((new_value, proof))
    }

    /// Discards `element`'s contribution from the accumulator.
    ///
    /// Rare operation, used only for chain reorganization.  It requires the
    /// removal capability and a previously issued membership proof for the
    /// element; without the proof the call is rejected rather than allowed
    /// to corrupt the aggregate.  Any proof issued for this element becomes
    /// meaningless afterwards.
    pub fn remove(
        &mut self,
        element: &[u8],
        proof: &AccumulatorProof,
        secret: &RemovalSecret,
    ) -> Result<BigUint, AccumulatorError> {
        let prime = hash_to_prime(element).ok_or(AccumulatorError::PrimeSearchExhausted)?;
        if proof.element_hash != prime || !self.verify(proof) {
            return Err(AccumulatorError::RemovalUnproven);
        }
        let inverse =
            mod_inverse(&prime, secret.totient()).ok_or(AccumulatorError::NoModularInverse)?;
        let new_value = self.value.modpow(&inverse, &self.params.modulus);
        let sequence = self
            .wal
            .append(WalOperation::Remove, &new_value, &scar_id(element))?;
        self.value = new_value.clone();
        self.sequence = sequence;
        Ok(new_value)
    }

    /// Verifies a membership proof against this accumulator's modulus.
    ///
    /// Pure function of the proof and the modulus; never fails on garbage
    /// input, only returns `false`.
    pub fn verify(&self, proof: &AccumulatorProof) -> bool {
        verify_membership(&self.params.modulus, proof)
    }

    /// Verifies every proof independently; order is irrelevant.
    pub fn batch_verify(&self, proofs: &[AccumulatorProof]) -> bool {
        proofs.iter().all(|proof| self.verify(proof))
    }
}

/// Short hex identifier stored in log records for one element.
pub(crate) fn scar_id(element: &[u8]) -> String {
    hex::encode(&Sha256::digest(element)[..4])
}

/// Modular inverse of `a` modulo `m` via the extended Euclidean algorithm.
fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }
    let a = BigInt::from(a.clone());
    let m = BigInt::from(m.clone());
    let ext = a.extended_gcd(&m);
    if !ext.gcd.is_one() {
        return None;
    }
    let mut x = ext.x % &m;
    if x.sign() == Sign::Minus {
        x += &m;
    }
    x.to_biguint()
}

#[cfg(test)]
mod tests {
    use super::{
        verify_membership, AccumulatorError, AccumulatorParams, AccumulatorProof, RemovalSecret,
        RsaAccumulator, DEFAULT_GENERATOR,
    };
    use crate::primes::hash_to_prime;
    use num_bigint::BigUint;
    use num_traits::One;
    use proptest::prelude::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_wal_path(tag: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("scar_ledger_acc_{tag}_{unique}.wal"))
    }

    // Mersenne primes 2^127 - 1 and 2^89 - 1: tiny by RSA standards, but the
    // factorization is known on purpose so tests can exercise removal.
    fn test_params() -> (AccumulatorParams, RemovalSecret) {
        let p = BigUint::parse_bytes(b"170141183460469231731687303715884105727", 10).unwrap();
        let q = BigUint::parse_bytes(b"618970019642690137449562111", 10).unwrap();
        let one = BigUint::one();
        let totient = (&p - &one) * (&q - &one);
        (AccumulatorParams::new(&p * &q), RemovalSecret::new(totient))
    }

    #[test]
    fn add_produces_verifiable_proof() {
        let (params, _) = test_params();
        let modulus = params.modulus.clone();
        let path = temp_wal_path("add");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();

        let p0 = hash_to_prime(b"scar_0").unwrap();
        let expected = BigUint::from(DEFAULT_GENERATOR).modpow(&p0, &modulus);
        let (value, proof) = acc.add(b"scar_0").unwrap();

        assert_eq!(value, expected);
        assert_eq!(value, *acc.value());
        assert_eq!(proof.sequence, 1);
        assert!(acc.verify(&proof));
        assert!(verify_membership(&modulus, &proof));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn second_add_chains_from_previous_value() {
        let (params, _) = test_params();
        let modulus = params.modulus.clone();
        let path = temp_wal_path("chain");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();

        let (first, _) = acc.add(b"scar_0").unwrap();
        let p1 = hash_to_prime(b"scar_1").unwrap();
        let (second, proof) = acc.add(b"scar_1").unwrap();

        assert_eq!(second, first.modpow(&p1, &modulus));
        assert_eq!(proof.witness, first);
        assert_eq!(acc.sequence(), 2);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn verify_rejects_adversarial_proofs() {
        let (params, _) = test_params();
        let path = temp_wal_path("adversarial");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();
        let (_, good) = acc.add(b"scar_0").unwrap();

        let mut zero_witness = good.clone();
        zero_witness.witness = BigUint::from(0u32);
        assert!(!acc.verify(&zero_witness));

        let mut oversized = good.clone();
        oversized.witness = acc.params().modulus.clone();
        assert!(!acc.verify(&oversized));

        let mut unit_exponent = good.clone();
        unit_exponent.element_hash = BigUint::one();
        assert!(!acc.verify(&unit_exponent));

        let mut tampered = good.clone();
        tampered.accumulator ^= BigUint::one();
        assert!(!acc.verify(&tampered));

        assert!(acc.verify(&good));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn proofs_verify_independently_of_later_adds() {
        let (params, _) = test_params();
        let path = temp_wal_path("independent");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();

        let (_, proof_a) = acc.add(b"scar_a").unwrap();
        let (_, proof_b) = acc.add(b"scar_b").unwrap();

        // Each proof stands alone; checking order never matters.
        assert!(acc.verify(&proof_b));
        assert!(acc.verify(&proof_a));
        assert!(acc.batch_verify(&[proof_b.clone(), proof_a.clone()]));
        assert!(acc.batch_verify(&[proof_a, proof_b]));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn remove_restores_previous_value() {
        let (params, secret) = test_params();
        let path = temp_wal_path("remove");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();

        let (_, _) = acc.add(b"scar_keep").unwrap();
        let before = acc.value().clone();
        let (_, proof) = acc.add(b"scar_drop").unwrap();
        let after = acc.remove(b"scar_drop", &proof, &secret).unwrap();

        assert_eq!(after, before);
        assert_eq!(*acc.value(), before);
        assert_eq!(acc.sequence(), 3);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn remove_rejects_unproven_elements() {
        let (params, secret) = test_params();
        let path = temp_wal_path("unproven");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();

        let (_, proof) = acc.add(b"scar_real").unwrap();
        let err = acc.remove(b"scar_other", &proof, &secret).unwrap_err();
        assert!(matches!(err, AccumulatorError::RemovalUnproven));

        let mut forged = proof.clone();
        forged.accumulator ^= BigUint::one();
        let err = acc.remove(b"scar_real", &forged, &secret).unwrap_err();
        assert!(matches!(err, AccumulatorError::RemovalUnproven));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reopen_recovers_sequence_and_value() {
        let (params, _) = test_params();
        let path = temp_wal_path("recover");
        let expected;
        {
            let mut acc = RsaAccumulator::open(params.clone(), &path).unwrap();
            acc.add(b"scar_0").unwrap();
            acc.add(b"scar_1").unwrap();
            expected = acc.value().clone();
        }
        let acc = RsaAccumulator::open(params, &path).unwrap();
        assert_eq!(acc.sequence(), 2);
        assert_eq!(*acc.value(), expected);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn crash_truncated_wal_recovers_to_acknowledged_state() {
        let (params, _) = test_params();
        let path = temp_wal_path("crash");
        let after_first;
        {
            let mut acc = RsaAccumulator::open(params.clone(), &path).unwrap();
            let (value, _) = acc.add(b"scar_0").unwrap();
            after_first = value;
            acc.add(b"scar_1").unwrap();
        }

        // Chop the tail of the last record, as a mid-write crash would.
        let contents = fs::read_to_string(&path).unwrap();
        fs::write(&path, &contents[..contents.len() - 7]).unwrap();

        let acc = RsaAccumulator::open(params, &path).unwrap();
        assert_eq!(acc.sequence(), 1);
        assert_eq!(*acc.value(), after_first);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn exhausted_prime_search_surfaces_as_error() {
        // Same conversion `add` applies when the probe budget runs out.
        let err = crate::primes::next_prime_within(BigUint::from(24u32), 4)
            .ok_or(AccumulatorError::PrimeSearchExhausted)
            .unwrap_err();
        assert!(matches!(err, AccumulatorError::PrimeSearchExhausted));
    }

    #[test]
    fn params_json_round_trip() {
        let (params, _) = test_params();
        let json = params.to_json_string();
        let parsed = AccumulatorParams::from_json_str(&json).unwrap();
        assert_eq!(parsed, params);

        let err = AccumulatorParams::from_json_str("{\"modulus\":\"x\",\"generator\":\"3\"}")
            .unwrap_err();
        assert!(matches!(err, AccumulatorError::Decode(_)));
    }

    #[test]
    fn proof_json_round_trip() {
        let (params, _) = test_params();
        let path = temp_wal_path("proof_json");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();
        let (_, proof) = acc.add(b"scar_0").unwrap();

        let json = proof.to_json_string();
        let parsed = AccumulatorProof::from_json_str(&json).unwrap();
        assert_eq!(parsed, proof);
        assert!(acc.verify(&parsed));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn generated_insecure_params_support_full_cycle() {
        let (params, secret) = AccumulatorParams::generate_insecure(256);
        let path = temp_wal_path("generated");
        let mut acc = RsaAccumulator::open(params, &path).unwrap();

        let before = acc.value().clone();
        let (_, proof) = acc.add(b"scar_gen").unwrap();
        assert!(acc.verify(&proof));
        let restored = acc.remove(b"scar_gen", &proof, &secret).unwrap();
        assert_eq!(restored, before);
        fs::remove_file(&path).unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn sequences_are_gapless_and_monotone(elements in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 1..48), 1..6)) {
            let (params, _) = test_params();
            let path = temp_wal_path("prop_seq");
            let mut acc = RsaAccumulator::open(params, &path).unwrap();
            for (i, element) in elements.iter().enumerate() {
                let (_, proof) = acc.add(element).unwrap();
                prop_assert_eq!(proof.sequence, (i + 1) as u64);
            }
            prop_assert_eq!(acc.sequence(), elements.len() as u64);
            fs::remove_file(&path).unwrap();
        }

        #[test]
        fn batch_verify_is_order_independent(seed in any::<u64>()) {
            let (params, _) = test_params();
            let path = temp_wal_path("prop_batch");
            let mut acc = RsaAccumulator::open(params, &path).unwrap();
            let mut proofs = Vec::new();
            for i in 0..4u64 {
                let element = (seed ^ i).to_be_bytes();
                let (_, proof) = acc.add(&element).unwrap();
                proofs.push(proof);
            }
            prop_assert!(acc.batch_verify(&proofs));
            proofs.reverse();
            prop_assert!(acc.batch_verify(&proofs));
            proofs.swap(0, 2);
            prop_assert!(acc.batch_verify(&proofs));
            fs::remove_file(&path).unwrap();
        }
    }
}

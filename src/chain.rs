//! Incremental chain proofs over the scar history.
//!
//! The chain binds a fixed genesis element into the accumulator as its first
//! transition, then folds every subsequent scar hash in arrival order.  The
//! most recent membership proof commits to the entire history: verifying it
//! and checking that its post-state equals the live accumulator value is an
//! O(1) check of the whole chain, with no replay.

use crate::accumulator::{AccumulatorError, AccumulatorParams, AccumulatorProof, RsaAccumulator};
use crate::genesis::GenesisAnchor;
use num_bigint::BigUint;
use std::path::Path;

/// Chain-proof orchestrator: genesis bootstrap, scar accumulation and O(1)
/// chain verification.
///
/// The retained proof list is in-memory only; persisting proofs is a caller
/// concern (each proof serializes via
/// [`AccumulatorProof::to_json_string`]).  The chain itself survives
/// restarts through the accumulator's write-ahead log.
pub struct ScarChain {
    accumulator: RsaAccumulator,
    genesis: Vec<u8>,
    proofs: Vec<AccumulatorProof>,
}

impl ScarChain {
    /// Opens the chain over the log at `wal_path`, recovering the
    /// accumulator and seeding the genesis element if nothing was ever
    /// added.
    ///
    /// Genesis seeding is idempotent: on a log whose recovered value has
    /// moved past the bare generator, reopening changes nothing.  The same
    /// genesis bytes must be supplied identically across restarts; they are
    /// the chain's root of trust.
    pub fn open(
        params: AccumulatorParams,
        genesis: impl Into<Vec<u8>>,
        wal_path: impl AsRef<Path>,
    ) -> Result<Self, AccumulatorError> {
        let mut accumulator = RsaAccumulator::open(params, wal_path)?;
        let genesis = genesis.into();
        if accumulator.value() == &accumulator.params().generator {
            accumulator.add(&genesis)?;
        }
        Ok(Self {
            accumulator,
            genesis,
            proofs: Vec::new(),
        })
    }

    /// Opens the chain with genesis bytes taken from an anchor record.
    pub fn from_anchor(
        params: AccumulatorParams,
        anchor: &GenesisAnchor,
        wal_path: impl AsRef<Path>,
    ) -> Result<Self, AccumulatorError> {
        let genesis = anchor
            .genesis_bytes()
            .map_err(|err| AccumulatorError::Decode(err.to_string()))?;
        Self::open(params, genesis, wal_path)
    }

    /// Folds a scar hash into the chain and retains the returned proof.
    pub fn add_scar(&mut self, scar_hash: &[u8]) -> Result<AccumulatorProof, AccumulatorError> {
        let (_, proof) = self.accumulator.add(scar_hash)?;
        self.proofs.push(proof.clone());
        Ok(proof)
    }

    /// Verifies the whole chain through a single proof.
    ///
    /// Uses `latest` if supplied, otherwise the most recently retained
    /// proof; a chain with no retained proofs is vacuously valid.  Beyond
    /// the membership law, the proof's post-state must equal the live
    /// accumulator value — a mismatch means the proof is stale or the state
    /// has diverged, which callers should treat as an integrity failure.
    pub fn verify_chain(&self, latest: Option<&AccumulatorProof>) -> bool {
        let proof = match latest.or_else(|| self.proofs.last()) {
            Some(proof) => proof,
            None => return true,
        };
        self.accumulator.verify(proof) && proof.accumulator == *self.accumulator.value()
    }

    /// Most recent retained proof, committing to the current chain state.
    pub fn state_proof(&self) -> Option<&AccumulatorProof> {
        self.proofs.last()
    }

    /// All proofs retained since this process opened the chain, in event
    /// order.
    pub fn proofs(&self) -> &[AccumulatorProof] {
        &self.proofs
    }

    /// Read-only snapshot of the current accumulator value.
    pub fn accumulator_value(&self) -> &BigUint {
        self.accumulator.value()
    }

    /// Sequence number of the latest durable transition.
    pub fn sequence(&self) -> u64 {
        self.accumulator.sequence()
    }

    /// Genesis bytes this chain is anchored to.
    pub fn genesis(&self) -> &[u8] {
        &self.genesis
    }

    /// The underlying accumulator, for read-only inspection and proof
    /// verification.
    pub fn accumulator(&self) -> &RsaAccumulator {
        &self.accumulator
    }
}

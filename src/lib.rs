#![deny(missing_docs)]

//! # scar_ledger
//!
//! **scar_ledger** is a provenance core for long-lived stateful processes:
//! every significant event ("scar") is folded into a dynamic RSA
//! accumulator, so membership in the event history can be proven later with
//! a constant-size proof and no replay, and the process can resume safely
//! after a crash from a durable write-ahead log.
//!
//! ## Components
//!
//! * **Hash-to-prime encoding** — the [`primes`](primes/index.html) module
//!   deterministically maps arbitrary bytes to prime exponents, the form an
//!   RSA accumulator requires for its security argument.
//! * **Dynamic RSA accumulator** — the
//!   [`accumulator`](accumulator/index.html) module maintains the single
//!   group element summarizing the set, issues membership proofs on every
//!   add, supports capability-gated removal and verifies proofs in O(1)
//!   against nothing but the modulus.
//! * **Write-ahead log** — the [`wal`](wal/index.html) module records every
//!   transition in an append-only, fsync-acknowledged text log and recovers
//!   the last acknowledged `(sequence, value)` after a crash, discarding a
//!   torn tail record rather than trusting it.
//! * **Chain proofs** — the [`chain`](chain/index.html) module anchors the
//!   accumulator at a fixed genesis element and exposes whole-chain
//!   verification through the most recent proof alone.
//! * **Genesis anchors** — the [`genesis`](genesis/index.html) module holds
//!   the immutable birth record the chain is rooted in.
//!
//! The accumulator parameters (modulus, generator, optionally the totient
//! for removal) are consumed from an external setup; this crate never
//! generates production parameters itself.
//!
//! ## Usage
//!
//! ```no_run
//! use scar_ledger::{AccumulatorParams, ScarChain};
//! use sha2::{Digest, Sha256};
//!
//! // Parameters come from an external ceremony; this one is test-only.
//! let (params, _secret) = AccumulatorParams::generate_insecure(2048);
//!
//! let genesis = Sha256::digest(b"genesis").to_vec();
//! let mut chain = ScarChain::open(params, genesis, "chain.wal")?;
//!
//! let scar = Sha256::digest(b"first event");
//! let proof = chain.add_scar(&scar)?;
//! assert!(chain.verify_chain(Some(&proof)));
//! # Ok::<(), scar_ledger::AccumulatorError>(())
//! ```

pub mod accumulator;
pub mod chain;
pub mod genesis;
pub mod primes;
pub mod wal;

pub use accumulator::{
    verify_membership, AccumulatorError, AccumulatorParams, AccumulatorProof, RemovalSecret,
    RsaAccumulator, DEFAULT_GENERATOR,
};
pub use chain::ScarChain;
pub use genesis::{AnchorError, GenesisAnchor};
pub use primes::{hash_to_prime, is_prime, MAX_PRIME_PROBES};
pub use wal::{AccumulatorWal, WalError, WalOperation, WalRecord};

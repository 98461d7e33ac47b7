//! Cryptographic primitives for the weave protocol.
//!
//! - **Ed25519** for block and handshake signatures
//! - **Blake2b-256** for block hashing and proof-of-work digests

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private, KeyPair};
pub use sign::{sign_message, verify_signature};

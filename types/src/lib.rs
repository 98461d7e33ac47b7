//! Fundamental types for the weave protocol.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: accounts, hashes, amounts, keys, epochs, timestamps, and the
//! network identifier.

pub mod account;
pub mod amount;
pub mod epoch;
pub mod error;
pub mod hash;
pub mod keys;
pub mod network;
pub mod time;

pub use account::Account;
pub use amount::Amount;
pub use epoch::Epoch;
pub use error::WeaveError;
pub use hash::{BlockHash, Link, Root};
pub use keys::{PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use time::Timestamp;

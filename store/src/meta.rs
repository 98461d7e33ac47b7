//! Meta table — schema version bookkeeping.
//!
//! The version lives under key `1` as a 32-byte big-endian integer with the
//! version number in the least significant quadword.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use crate::StoreError;

const VERSION_KEY: [u8; 1] = [1u8];

#[derive(Clone, Copy)]
pub struct MetaStore {
    table: Database<Bytes, Bytes>,
}

impl MetaStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    /// The stored schema version, or 0 for a fresh database.
    pub fn version(&self, txn: &RoTxn) -> Result<u32, StoreError> {
        match self.table.get(txn, &VERSION_KEY)? {
            Some(bytes) => {
                if bytes.len() != 32 {
                    return Err(StoreError::Serialization(
                        "schema version record must be 32 bytes".into(),
                    ));
                }
                let mut quad = [0u8; 8];
                quad.copy_from_slice(&bytes[24..32]);
                Ok(u64::from_be_bytes(quad) as u32)
            }
            None => Ok(0),
        }
    }

    pub fn set_version(&self, txn: &mut RwTxn, version: u32) -> Result<(), StoreError> {
        let mut bytes = [0u8; 32];
        bytes[24..32].copy_from_slice(&(version as u64).to_be_bytes());
        self.table.put(txn, &VERSION_KEY, &bytes)?;
        Ok(())
    }
}

//! Peer endpoint storage — known endpoints persisted across restarts and
//! replayed as keepalive candidates on startup.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::StoreError;

/// 18-byte binary endpoint: IPv6 (or v4-mapped) address plus big-endian port.
fn endpoint_key(endpoint: &SocketAddr) -> [u8; 18] {
    let ip: Ipv6Addr = match endpoint.ip() {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    let mut key = [0u8; 18];
    key[..16].copy_from_slice(&ip.octets());
    key[16..].copy_from_slice(&endpoint.port().to_be_bytes());
    key
}

fn endpoint_from_key(bytes: &[u8]) -> Result<SocketAddr, StoreError> {
    if bytes.len() != 18 {
        return Err(StoreError::Serialization("peer key must be 18 bytes".into()));
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&bytes[..16]);
    let port = u16::from_be_bytes([bytes[16], bytes[17]]);
    let ip = Ipv6Addr::from(octets);
    let addr = match ip.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(ip),
    };
    Ok(SocketAddr::new(addr, port))
}

#[derive(Clone, Copy)]
pub struct PeerStore {
    table: Database<Bytes, Bytes>,
}

impl PeerStore {
    pub(crate) fn new(table: Database<Bytes, Bytes>) -> Self {
        Self { table }
    }

    pub fn put(&self, txn: &mut RwTxn, endpoint: &SocketAddr) -> Result<(), StoreError> {
        self.table.put(txn, &endpoint_key(endpoint), &[])?;
        Ok(())
    }

    pub fn del(&self, txn: &mut RwTxn, endpoint: &SocketAddr) -> Result<(), StoreError> {
        self.table.delete(txn, &endpoint_key(endpoint))?;
        Ok(())
    }

    pub fn exists(&self, txn: &RoTxn, endpoint: &SocketAddr) -> Result<bool, StoreError> {
        Ok(self.table.get(txn, &endpoint_key(endpoint))?.is_some())
    }

    pub fn count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.table.len(txn)?)
    }

    pub fn clear(&self, txn: &mut RwTxn) -> Result<(), StoreError> {
        self.table.clear(txn)?;
        Ok(())
    }

    pub fn iter(&self, txn: &RoTxn) -> Result<Vec<SocketAddr>, StoreError> {
        let mut peers = Vec::new();
        for entry in self.table.iter(txn)? {
            let (key, _) = entry?;
            peers.push(endpoint_from_key(key)?);
        }
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_key_roundtrip_v4() {
        let endpoint: SocketAddr = "10.0.0.1:7075".parse().unwrap();
        let key = endpoint_key(&endpoint);
        assert_eq!(endpoint_from_key(&key).unwrap(), endpoint);
    }

    #[test]
    fn endpoint_key_roundtrip_v6() {
        let endpoint: SocketAddr = "[2001:db8::1]:54000".parse().unwrap();
        let key = endpoint_key(&endpoint);
        assert_eq!(endpoint_from_key(&key).unwrap(), endpoint);
    }
}

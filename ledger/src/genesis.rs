//! Genesis block and ledger constants.

use weave_blocks::OpenBlock;
use weave_crypto::{keypair_from_seed, KeyPair};
use weave_types::{Account, BlockHash, Link, NetworkId};
use weave_work::WorkThresholds;

/// The epoch-1 upgrade marker carried in the link field of epoch blocks:
/// ASCII `"epoch v1 block"`, zero-padded to 32 bytes.
pub fn epoch_v1_link() -> Link {
    let mut bytes = [0u8; 32];
    let message = b"epoch v1 block";
    bytes[..message.len()].copy_from_slice(message);
    Link::new(bytes)
}

/// Fixed seed for the dev-network genesis key. Dev only — the live and beta
/// genesis keys are not derived from an embedded seed.
const DEV_GENESIS_SEED: [u8; 32] = [0xDA; 32];

/// The dev genesis key pair, available so tests can sign from genesis.
pub fn dev_genesis_keypair() -> KeyPair {
    keypair_from_seed(&DEV_GENESIS_SEED)
}

/// Per-network constants consumed by the ledger.
pub struct LedgerConstants {
    pub network: NetworkId,
    pub genesis_account: Account,
    pub genesis_block: OpenBlock,
    /// Signer of epoch upgrade blocks (the genesis account on all networks).
    pub epoch_signer: Account,
    /// Link value marking an epoch-1 upgrade.
    pub epoch_link: Link,
    pub work_thresholds: WorkThresholds,
}

impl LedgerConstants {
    /// Constants for a network id.
    // TODO: embed the live and beta genesis records once those networks
    // are minted; until then every network runs on the dev genesis.
    pub fn for_network(network: NetworkId) -> Self {
        let mut constants = Self::dev();
        constants.network = network;
        if network != NetworkId::Dev {
            constants.work_thresholds = WorkThresholds::new();
        }
        constants
    }

    /// Dev-network constants: embedded genesis key, zero work threshold.
    pub fn dev() -> Self {
        let keypair = dev_genesis_keypair();
        let genesis_account = Account::new(*keypair.public.as_bytes());
        // The genesis open block receives from itself: its source is the
        // genesis public key reinterpreted as a hash.
        let genesis_block = OpenBlock::new(
            BlockHash::new(*genesis_account.as_bytes()),
            genesis_account,
            genesis_account,
            &keypair.private,
            0,
        );
        Self {
            network: NetworkId::Dev,
            genesis_account,
            genesis_block,
            epoch_signer: genesis_account,
            epoch_link: epoch_v1_link(),
            work_thresholds: WorkThresholds::with_base(0),
        }
    }
}

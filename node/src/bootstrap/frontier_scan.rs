//! Frontier comparison — decides what to pull and what to push.
//!
//! During a legacy bootstrap the client streams the peer's sorted
//! `(account, head)` pairs and merges them against its own sorted frontier
//! iteration. Accounts the peer knows better become pulls; accounts we know
//! better (or fork on) are marked for bulk_push.

use weave_types::{Account, BlockHash};

use crate::bootstrap::pulls::PullInfo;

/// Outcome of one frontier comparison.
#[derive(Debug, Default)]
pub struct FrontierComparison {
    pub pulls: Vec<PullInfo>,
    /// Accounts where our chain is ahead of (or forked from) the peer's.
    pub push_accounts: Vec<Account>,
}

/// Merge-compare two sorted frontier streams.
///
/// `known_block(hash)` answers whether the peer's head already exists in
/// our ledger — if it does and differs from our head, we are strictly
/// ahead; if it does not, we are behind or forked.
pub fn compare_frontiers(
    local: &[(Account, BlockHash)],
    remote: &[(Account, BlockHash)],
    known_block: impl Fn(&BlockHash) -> bool,
) -> FrontierComparison {
    let mut comparison = FrontierComparison::default();
    let mut local_iter = local.iter().peekable();

    for (remote_account, remote_head) in remote {
        // Accounts only we know, ordered before the remote account: push.
        while let Some((local_account, _)) = local_iter.peek() {
            if local_account < remote_account {
                comparison.push_accounts.push(*local_account);
                local_iter.next();
            } else {
                break;
            }
        }

        match local_iter.peek() {
            Some((local_account, local_head)) if local_account == remote_account => {
                if local_head == remote_head {
                    // In sync.
                } else if known_block(remote_head) {
                    // Their head is in our chain history: we are ahead.
                    comparison.push_accounts.push(*remote_account);
                } else {
                    // Behind, or forked: pull the full remote view and mark
                    // for push so the peer learns our side too.
                    comparison
                        .pulls
                        .push(PullInfo::new(*remote_account, *remote_head, *local_head));
                    comparison.push_accounts.push(*remote_account);
                }
                local_iter.next();
            }
            _ => {
                // Unknown account: pull the whole chain.
                comparison.pulls.push(PullInfo::new(
                    *remote_account,
                    *remote_head,
                    BlockHash::ZERO,
                ));
            }
        }
    }

    // Anything left locally is unknown to the peer.
    for (local_account, _) in local_iter {
        comparison.push_accounts.push(*local_account);
    }
    comparison
}

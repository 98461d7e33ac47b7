//! Merged iteration over `(v0, v1)` table pairs.
//!
//! Several logical tables are split by account epoch (`accounts_v0` /
//! `accounts_v1`, `pending_v0` / `pending_v1`, `state_blocks_v0` /
//! `state_blocks_v1`). Callers usually want one sorted view across both.

use std::iter::Peekable;

use crate::StoreError;

/// Merges two iterators that each yield key-sorted `(key, value)` pairs into
/// a single sorted stream. On duplicate keys the v1 side wins.
pub struct MergedIter<K, V, A, B>
where
    A: Iterator<Item = Result<(K, V), StoreError>>,
    B: Iterator<Item = Result<(K, V), StoreError>>,
{
    v0: Peekable<A>,
    v1: Peekable<B>,
}

impl<K, V, A, B> MergedIter<K, V, A, B>
where
    K: Ord,
    A: Iterator<Item = Result<(K, V), StoreError>>,
    B: Iterator<Item = Result<(K, V), StoreError>>,
{
    pub fn new(v0: A, v1: B) -> Self {
        Self {
            v0: v0.peekable(),
            v1: v1.peekable(),
        }
    }
}

impl<K, V, A, B> Iterator for MergedIter<K, V, A, B>
where
    K: Ord,
    A: Iterator<Item = Result<(K, V), StoreError>>,
    B: Iterator<Item = Result<(K, V), StoreError>>,
{
    type Item = Result<(K, V), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Errors surface immediately from whichever side produced them.
        let take_v1 = match (self.v0.peek(), self.v1.peek()) {
            (None, None) => return None,
            (Some(Err(_)), _) => return self.v0.next(),
            (_, Some(Err(_))) => return self.v1.next(),
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (Some(Ok((key0, _))), Some(Ok((key1, _)))) => {
                if key0 == key1 {
                    // Same key present in both generations: v1 shadows v0.
                    let _ = self.v0.next();
                    true
                } else {
                    key1 < key0
                }
            }
        };
        if take_v1 {
            self.v1.next()
        } else {
            self.v0.next()
        }
    }
}

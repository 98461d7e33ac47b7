use proptest::prelude::*;

use weave_types::{Account, Amount, BlockHash, Epoch, Link, Root, Timestamp};

proptest! {
    /// BlockHash roundtrip: new -> as_bytes -> new produces identical hash.
    #[test]
    fn block_hash_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.as_bytes(), &bytes);
    }

    /// BlockHash::is_zero is true only for all-zero bytes.
    #[test]
    fn block_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Account address encode/decode roundtrip.
    #[test]
    fn account_encode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let account = Account::new(bytes);
        let decoded = Account::decode(&account.encode()).unwrap();
        prop_assert_eq!(decoded, account);
    }

    /// Root and Link preserve the underlying bytes of their source.
    #[test]
    fn root_link_preserve_bytes(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        let root = Root::from(hash);
        let link = Link::from(hash);
        prop_assert_eq!(root.as_bytes(), &bytes);
        prop_assert_eq!(link.as_bytes(), &bytes);
        prop_assert_eq!(link.as_block_hash(), hash);
    }

    /// Amount big-endian byte roundtrip.
    #[test]
    fn amount_be_roundtrip(raw in 0u128..u128::MAX) {
        let amount = Amount::new(raw);
        prop_assert_eq!(Amount::from_be_bytes(amount.to_be_bytes()), amount);
    }

    /// Amount: checked_add(a, b) == Some(a + b) when no overflow.
    #[test]
    fn amount_checked_add(a in 0u128..u128::MAX / 2, b in 0u128..u128::MAX / 2) {
        let sum = Amount::new(a).checked_add(Amount::new(b));
        prop_assert_eq!(sum, Some(Amount::new(a + b)));
    }

    /// Amount: checked_sub returns None when b > a.
    #[test]
    fn amount_checked_sub_underflow(a in 0u128..1_000_000, b in 0u128..1_000_000) {
        let result = Amount::new(a).checked_sub(Amount::new(b));
        if b > a {
            prop_assert!(result.is_none());
        } else {
            prop_assert_eq!(result, Some(Amount::new(a - b)));
        }
    }

    /// Epoch u8 roundtrip for valid discriminants.
    #[test]
    fn epoch_u8_roundtrip(value in 0u8..2) {
        let epoch = Epoch::from_u8(value).unwrap();
        prop_assert_eq!(epoch.as_u8(), value);
    }

    /// Timestamp elapsed_since: elapsed_since(now) = now - self (saturating).
    #[test]
    fn timestamp_elapsed_since(base in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let t = Timestamp::new(base);
        let now = Timestamp::new(base + offset);
        prop_assert_eq!(t.elapsed_since(now), offset);
    }

    /// Timestamp has_expired agrees with manual arithmetic.
    #[test]
    fn timestamp_has_expired_correct(
        start in 0u64..500_000,
        duration in 1u64..500_000,
        offset in 0u64..1_000_000,
    ) {
        let t = Timestamp::new(start);
        let now = Timestamp::new(start.saturating_add(offset));
        prop_assert_eq!(t.has_expired(duration, now), offset >= duration);
    }
}

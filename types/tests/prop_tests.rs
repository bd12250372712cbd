use proptest::prelude::*;

use keel_types::{Address, Amount, Timestamp, TokenBook, SECONDS_PER_DAY};

proptest! {
    /// Any 20 bytes render to an address string that parses back to the same bytes.
    #[test]
    fn address_display_parses_back(bytes in prop::array::uniform20(0u8..)) {
        let addr = Address::new(bytes);
        let parsed = Address::parse(&addr.to_string()).unwrap();
        prop_assert_eq!(parsed, addr);
    }

    /// The day-bucket of any timestamp contains it: bucket*86400 <= t < (bucket+1)*86400.
    #[test]
    fn day_bucket_contains_timestamp(secs in 0u64..u64::MAX / 2) {
        let bucket = Timestamp::new(secs).day_bucket();
        prop_assert!(bucket * SECONDS_PER_DAY <= secs);
        prop_assert!(secs < (bucket + 1) * SECONDS_PER_DAY);
    }

    /// Transfers conserve total supply regardless of success.
    #[test]
    fn transfers_conserve_supply(
        minted in 0u128..1_000_000,
        amounts in prop::collection::vec(0u128..500_000, 1..20),
    ) {
        let (a, b) = (Address::repeat(1), Address::repeat(2));
        let mut book = TokenBook::new();
        book.mint(&a, Amount::new(minted)).unwrap();
        for (i, raw) in amounts.into_iter().enumerate() {
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            let _ = book.transfer(&from, &to, Amount::new(raw));
            let sum = book.balance_of(&a).raw() + book.balance_of(&b).raw();
            prop_assert_eq!(sum, minted);
        }
    }
}

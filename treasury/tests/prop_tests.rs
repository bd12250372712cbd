use proptest::prelude::*;

use keel_treasury::TreasuryGuard;
use keel_types::{Address, Amount, Timestamp, TokenBook, SECONDS_PER_DAY};

const OWNER: Address = Address::repeat(0x0a);
const SAFE: Address = Address::repeat(0x5a);
const SPENDER: Address = Address::repeat(0xa1);
const RECIPIENT: Address = Address::repeat(0xb2);

fn guard_with_limits(per_tx: u128, daily: u128) -> (TreasuryGuard, TokenBook) {
    let mut guard = TreasuryGuard::new(Address::repeat(0x7e), OWNER, SAFE);
    let mut tokens = TokenBook::new();
    tokens.mint(&guard.address(), Amount::new(u64::MAX as u128)).unwrap();
    guard.set_spender(&OWNER, RECIPIENT, true).unwrap();
    guard
        .set_auto_limit(&OWNER, SPENDER, Amount::new(per_tx), Amount::new(daily), true)
        .unwrap();
    (guard, tokens)
}

proptest! {
    /// Within any single day-bucket, accepted auto-transfers never sum past the
    /// daily limit and no accepted transfer exceeds the per-tx limit.
    #[test]
    fn auto_transfers_respect_limits(
        per_tx in 1u128..1_000,
        extra_daily in 0u128..5_000,
        requests in prop::collection::vec((1u128..1_500, 0u64..3 * SECONDS_PER_DAY), 1..60),
    ) {
        let daily = per_tx + extra_daily;
        let (mut guard, mut tokens) = guard_with_limits(per_tx, daily);
        let mut requests = requests;
        requests.sort_by_key(|(_, offset)| *offset);

        let mut accepted_by_bucket = std::collections::HashMap::<u64, u128>::new();
        for (amount, offset) in requests {
            let now = Timestamp::new(1_700_000_000 + offset);
            let ok = guard
                .auto_transfer_to(&mut tokens, &SPENDER, &RECIPIENT, Amount::new(amount), now)
                .is_ok();
            if ok {
                prop_assert!(amount <= per_tx);
                let total = accepted_by_bucket.entry(now.day_bucket()).or_default();
                *total += amount;
                prop_assert!(*total <= daily);
            }
        }
    }

    /// Remaining allowance plus today's spend always equals the daily limit.
    #[test]
    fn allowance_accounts_for_spend(draws in prop::collection::vec(1u128..=10, 0..10)) {
        let (mut guard, mut tokens) = guard_with_limits(10, 50);
        let now = Timestamp::new(1_700_000_000);
        let mut spent = 0u128;
        for amount in draws {
            if guard
                .auto_transfer_to(&mut tokens, &SPENDER, &RECIPIENT, Amount::new(amount), now)
                .is_ok()
            {
                spent += amount;
            }
        }
        let remaining = guard.remaining_allowance(&SPENDER, now).raw();
        prop_assert_eq!(remaining + spent, 50);
    }
}

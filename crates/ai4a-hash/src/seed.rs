//! Roster hashing and day-seed derivation.
//!
//! The roster hash commits to the sorted set of registered accounts at the
//! instant the day starts; the day seed folds that commitment together with
//! the day id so two coordinators locking the same roster on the same day
//! draw identical lotteries.

use ai4a_types::{AccountId, DayId};

use crate::canonical::sha256_hex;

/// `SHA-256` of the sorted account ids joined by `","`, lowercase hex.
///
/// The input slice is sorted defensively; callers normally pass an already
/// sorted roster snapshot.
pub fn roster_hash(accounts: &[AccountId]) -> String {
    let mut ids: Vec<&str> = accounts.iter().map(AccountId::as_str).collect();
    ids.sort_unstable();
    sha256_hex(ids.join(",").as_bytes())
}

/// First 32 bits (big-endian) of `SHA-256("{day_id}:{roster_hash}")`.
pub fn derive_day_seed(day_id: &DayId, roster_hash: &str) -> u32 {
    let digest = sha256_hex(format!("{day_id}:{roster_hash}").as_bytes());
    // The digest is lowercase hex, so the first 8 characters encode the
    // first 4 bytes.
    u32::from_str_radix(&digest[..8], 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(tail: char) -> AccountId {
        AccountId::unchecked(format!("ai4a{}", tail.to_string().repeat(40)))
    }

    #[test]
    fn roster_hash_independent_of_input_order() {
        let forward = [acct('a'), acct('b'), acct('c')];
        let shuffled = [acct('c'), acct('a'), acct('b')];
        assert_eq!(roster_hash(&forward), roster_hash(&shuffled));
    }

    #[test]
    fn roster_hash_changes_with_membership() {
        assert_ne!(
            roster_hash(&[acct('a')]),
            roster_hash(&[acct('a'), acct('b')])
        );
    }

    #[test]
    fn seed_is_stable_and_roster_bound() {
        let day = DayId::parse("2026-01-28").unwrap();
        let rh = roster_hash(&[acct('a')]);
        assert_eq!(derive_day_seed(&day, &rh), derive_day_seed(&day, &rh));

        let other = roster_hash(&[acct('b')]);
        assert_ne!(derive_day_seed(&day, &rh), derive_day_seed(&day, &other));

        let next_day = DayId::parse("2026-01-29").unwrap();
        assert_ne!(derive_day_seed(&day, &rh), derive_day_seed(&next_day, &rh));
    }
}

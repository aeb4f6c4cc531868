//! Merges server-returned UIDs with the local high-water mark to form the
//! processing order for a run (component C10).

use crate::types::SortOrder;

/// Given ascending server UIDs bounded by `[min, max]`, a local
/// `last_processed_uid` high-water mark, and an optional
/// `oldest_cached_uid`, yields the UIDs that still need processing in
/// `order`, skipping anything already cached.
///
/// - desc: `(last_processed_uid, max] ∪ [min, oldest_cached_uid)`, newer
///   uncached first, then older uncached.
/// - asc: `[min, oldest_cached_uid) ∪ (last_processed_uid, max]`, older
///   uncached first, then newer uncached.
pub fn merge_order(
    min: u32,
    max: u32,
    last_processed_uid: u32,
    oldest_cached_uid: Option<u32>,
    order: SortOrder,
) -> Vec<u32> {
    if min > max {
        return Vec::new();
    }

    let newer_uncached: Vec<u32> = ((last_processed_uid.saturating_add(1))..=max)
        .filter(|&uid| uid >= min)
        .collect();

    let older_uncached: Vec<u32> = match oldest_cached_uid {
        Some(oldest) => (min..oldest).collect(),
        None => Vec::new(),
    };

    match order {
        SortOrder::Desc => {
            let mut result: Vec<u32> = newer_uncached.into_iter().rev().collect();
            result.extend(older_uncached.into_iter().rev());
            result
        }
        SortOrder::Asc => {
            let mut result = older_uncached;
            result.extend(newer_uncached);
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// search=0..100, last_processed=85, oldest_cached=75:
    /// desc yields [100..86, 74..0], asc yields [0..74, 86..100], and
    /// nothing in [76..85] is ever emitted.
    #[test]
    fn desc_yields_newer_uncached_then_older_uncached() {
        let order = merge_order(0, 100, 85, Some(75), SortOrder::Desc);
        let expected: Vec<u32> = (86..=100).rev().chain((0..75).rev()).collect();
        assert_eq!(order, expected);
        for uid in 75..=85 {
            assert!(!order.contains(&uid), "uid {uid} should not be re-fetched");
        }
    }

    #[test]
    fn asc_yields_older_uncached_then_newer_uncached() {
        let order = merge_order(0, 100, 85, Some(75), SortOrder::Asc);
        let expected: Vec<u32> = (0..75).chain(86..=100).collect();
        assert_eq!(order, expected);
        for uid in 75..=85 {
            assert!(!order.contains(&uid), "uid {uid} should not be re-fetched");
        }
    }

    #[test]
    fn no_oldest_cached_means_no_older_uncached_region() {
        let order = merge_order(0, 10, 8, None, SortOrder::Desc);
        assert_eq!(order, vec![9, 10]);
    }

    #[test]
    fn everything_already_processed_yields_nothing() {
        let order = merge_order(0, 50, 50, Some(0), SortOrder::Desc);
        assert!(order.is_empty());
    }

    #[test]
    fn empty_mailbox_range_yields_nothing() {
        assert!(merge_order(10, 5, 0, None, SortOrder::Desc).is_empty());
    }
}

use std::collections::HashSet;

pub fn next_available(used: &HashSet<u32>, current_max: u32) -> u32 {
    let upper = current_max.saturating_add(1);
    (1..=upper)
        .find(|candidate| !used.contains(candidate))
        .unwrap_or(upper)
}

pub fn next_gap<I>(orders: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    let used: HashSet<u32> = orders.into_iter().filter(|order| *order > 0).collect();
    let current_max = used.iter().copied().max().unwrap_or(0);
    next_available(&used, current_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_folder_starts_at_one() {
        assert_eq!(next_available(&HashSet::new(), 0), 1);
        assert_eq!(next_gap(Vec::new()), 1);
    }

    #[test]
    fn fills_lowest_hole() {
        assert_eq!(next_gap(vec![1, 2, 4, 5]), 3);
        assert_eq!(next_gap(vec![2, 3]), 1);
        assert_eq!(next_gap(vec![1, 2, 3]), 4);
    }

    #[test]
    fn ignores_zero_orders() {
        assert_eq!(next_gap(vec![0, 1]), 2);
    }

    proptest! {
        #[test]
        fn result_is_unused_and_minimal(orders in proptest::collection::hash_set(1u32..60, 0..40)) {
            let current_max = orders.iter().copied().max().unwrap_or(0);
            let next = next_available(&orders, current_max);
            prop_assert!(next >= 1);
            prop_assert!(!orders.contains(&next));
            for smaller in 1..next {
                prop_assert!(orders.contains(&smaller));
            }
        }
    }
}

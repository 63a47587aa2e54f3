use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

const JITTER: i64 = 2;

pub fn balanced_shuffle<T, F, R>(items: Vec<T>, series_of: F, rng: &mut R) -> Vec<T>
where
    F: Fn(&T) -> &str,
    R: Rng + ?Sized,
{
    let total = items.len();
    if total < 2 {
        return items;
    }

    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let key = series_of(&item).to_string();
        groups.entry(key).or_default().push(item);
    }
    // Largest series first so they claim their spread-out slots before the
    // singletons crowd the front.
    let mut groups: Vec<Vec<T>> = groups.into_values().collect();
    groups.shuffle(rng);
    groups.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut slots: Vec<Option<(usize, T)>> = (0..total).map(|_| None).collect();
    let mut leftovers: Vec<(usize, T)> = Vec::new();

    for (series, mut group) in groups.into_iter().enumerate() {
        group.shuffle(rng);
        let count = group.len();
        for (index, item) in group.into_iter().enumerate() {
            let target = target_slot(index, count, total, rng);
            match nearest_clean_slot(&slots, target, series) {
                Some(slot) => slots[slot] = Some((series, item)),
                None => leftovers.push((series, item)),
            }
        }
    }

    leftovers.shuffle(rng);
    for (series, item) in leftovers {
        let free: Vec<usize> = (0..total).filter(|slot| slots[*slot].is_none()).collect();
        let slot = free
            .iter()
            .copied()
            .find(|slot| !touches_series(&slots, *slot, series))
            .or_else(|| free.first().copied());
        if let Some(slot) = slot {
            slots[slot] = Some((series, item));
        }
    }

    let out: Vec<T> = slots.into_iter().flatten().map(|(_, item)| item).collect();
    debug_assert_eq!(out.len(), total);
    out
}

fn target_slot<R: Rng + ?Sized>(index: usize, count: usize, total: usize, rng: &mut R) -> usize {
    let spaced = (index as f64 * total as f64 / count as f64).round() as i64;
    let jitter = rng.random_range(-JITTER..=JITTER);
    (spaced + jitter).clamp(0, total as i64 - 1) as usize
}

/// Probes `target`, `target + 1`, `target - 1`, `target + 2`, ... for a free
/// slot whose neighbours hold no song of `series`.
fn nearest_clean_slot<T>(slots: &[Option<(usize, T)>], target: usize, series: usize) -> Option<usize> {
    let total = slots.len() as i64;
    let target = target as i64;
    for radius in 0..total {
        let candidates: &[i64] = if radius == 0 {
            &[0]
        } else {
            &[1, -1]
        };
        for sign in candidates {
            let slot = target + sign * radius;
            if slot < 0 || slot >= total {
                continue;
            }
            let slot = slot as usize;
            if slots[slot].is_none() && !touches_series(slots, slot, series) {
                return Some(slot);
            }
        }
    }
    None
}

fn touches_series<T>(slots: &[Option<(usize, T)>], slot: usize, series: usize) -> bool {
    let holds = |index: usize| matches!(slots.get(index), Some(Some((other, _))) if *other == series);
    (slot > 0 && holds(slot - 1)) || holds(slot + 1)
}

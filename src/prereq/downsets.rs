//! Birkhoff downset enumeration.
//!
//! A downset of a quasi-order is a subset closed under taking
//! prerequisites. The family of all downsets is the knowledge space
//! corresponding to the relation under the Birkhoff correspondence; it is
//! closed under both union and intersection and contains ∅ and Q.

use std::collections::HashSet;
use std::collections::VecDeque;

use crate::bits::StateBits;

/// Enumerate every downset of the quasi-order described by `prereq_bits`
/// (strict prerequisites per item index).
///
/// Worklist expansion from ∅: a downset grows by any item whose
/// prerequisites it already contains, which is exactly the outer fringe of
/// the induced space, so every downset is reached. The visited set keyed on
/// the bits guarantees each downset is produced exactly once. This stays
/// correct for genuine quasi-orders with mutually-equivalent items, where
/// decision-per-item enumeration would break.
///
/// Output is sorted in canonical (cardinality, id-lexicographic) order and
/// always contains ∅ and Q.
pub(crate) fn enumerate(n_items: usize, prereq_bits: &[StateBits]) -> Vec<StateBits> {
    debug_assert_eq!(n_items, prereq_bits.len());
    let empty = StateBits::empty(n_items);
    let mut seen: HashSet<StateBits> = HashSet::new();
    let mut queue: VecDeque<StateBits> = VecDeque::new();
    seen.insert(empty.clone());
    queue.push_back(empty);

    while let Some(current) = queue.pop_front() {
        for item in 0..n_items {
            if current.contains(item) {
                continue;
            }
            // Equivalent items (q ≼ r and r ≼ q) list each other as
            // prerequisites and can only ever enter together.
            if !prereq_bits[item]
                .difference(&equivalents(item, prereq_bits))
                .is_subset_of(&current)
            {
                continue;
            }
            let mut next = current.with(item);
            for eq in equivalents(item, prereq_bits).iter_ones() {
                next.insert(eq);
            }
            if seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }

    let mut family: Vec<StateBits> = seen.into_iter().collect();
    family.sort();
    family
}

/// Items mutually equivalent to `item` under the relation (excluding
/// `item` itself): r with r ≼ item and item ≼ r.
fn equivalents(item: usize, prereq_bits: &[StateBits]) -> StateBits {
    let mut out = StateBits::empty(prereq_bits.len());
    for r in prereq_bits[item].iter_ones() {
        if prereq_bits[r].contains(item) {
            out.insert(r);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prereqs(n: usize, pairs: &[(usize, usize)]) -> Vec<StateBits> {
        // pairs are (prerequisite, dependent), strict.
        let mut bits = vec![StateBits::empty(n); n];
        for &(p, q) in pairs {
            bits[q].insert(p);
        }
        bits
    }

    fn rendered(family: &[StateBits]) -> Vec<Vec<usize>> {
        family.iter().map(|b| b.iter_ones().collect()).collect()
    }

    #[test]
    fn chain_downsets() {
        // 0 -> 1 -> 2 with transitive pair (0, 2).
        let family = enumerate(3, &prereqs(3, &[(0, 1), (0, 2), (1, 2)]));
        assert_eq!(
            rendered(&family),
            vec![vec![], vec![0], vec![0, 1], vec![0, 1, 2]]
        );
    }

    #[test]
    fn discrete_order_gives_power_set() {
        let family = enumerate(3, &prereqs(3, &[]));
        assert_eq!(family.len(), 8);
        assert!(family.first().unwrap().is_empty());
        assert_eq!(family.last().unwrap().count(), 3);
    }

    #[test]
    fn diamond_downsets() {
        // 0 below 1 and 2, both below 3.
        let family = enumerate(
            4,
            &prereqs(4, &[(0, 1), (0, 2), (0, 3), (1, 3), (2, 3)]),
        );
        assert_eq!(
            rendered(&family),
            vec![
                vec![],
                vec![0],
                vec![0, 1],
                vec![0, 2],
                vec![0, 1, 2],
                vec![0, 1, 2, 3],
            ]
        );
    }

    #[test]
    fn no_duplicates() {
        let family = enumerate(4, &prereqs(4, &[(0, 2), (1, 2)]));
        let mut dedup = family.clone();
        dedup.dedup();
        assert_eq!(family.len(), dedup.len());
    }

    #[test]
    fn equivalent_items_enter_together() {
        // 0 ≡ 1 (mutual prerequisites): downsets are ∅, {0,1}.
        let family = enumerate(2, &prereqs(2, &[(0, 1), (1, 0)]));
        assert_eq!(rendered(&family), vec![vec![], vec![0, 1]]);
    }
}

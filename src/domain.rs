//! Core value types for the mathesis engine.
//!
//! Items are the atomic learnable units; a knowledge state is the set of
//! items a learner has mastered; the domain is the full finite item set.
//! All three are constructed through validating constructors and are
//! immutable for their lifetime — derived values are produced as new values.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bits::StateBits;
use crate::error::{DomainError, DomainResult};

/// An atomic learnable unit with a stable id and an optional display label.
///
/// Equality, hashing, and ordering are based solely on the id, so two items
/// with the same id but different labels are the same item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    id: String,
    label: String,
}

impl Item {
    /// Create an item. Fails with [`DomainError::InvalidItem`] for empty or
    /// whitespace-only ids.
    pub fn new(id: impl Into<String>) -> DomainResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidItem { id });
        }
        Ok(Self {
            id,
            label: String::new(),
        })
    }

    /// Attach a human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The display label; falls back to the id when no label was set.
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Item {}

impl std::hash::Hash for Item {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// An immutable set of item ids — a feasible pattern of mastery.
///
/// States are plain value types; whether the ids belong to a given domain is
/// checked where states meet a [`Domain`] (space construction, belief
/// updates), not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KnowledgeState {
    ids: BTreeSet<String>,
}

impl KnowledgeState {
    /// The empty state ∅.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a state from item ids. Duplicates collapse.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of mastered items.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True for ∅.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Membership test by id.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Iterate the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// The ids as a sorted vector.
    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    /// K₁ ∪ K₂.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            ids: self.ids.union(&other.ids).cloned().collect(),
        }
    }

    /// K₁ ∩ K₂.
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            ids: self.ids.intersection(&other.ids).cloned().collect(),
        }
    }

    /// K₁ \ K₂.
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            ids: self.ids.difference(&other.ids).cloned().collect(),
        }
    }

    /// K₁ △ K₂.
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        Self {
            ids: self
                .ids
                .symmetric_difference(&other.ids)
                .cloned()
                .collect(),
        }
    }

    /// K₁ ⊆ K₂.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.ids.is_subset(&other.ids)
    }

    /// K₁ ⊂ K₂.
    pub fn is_proper_subset_of(&self, other: &Self) -> bool {
        self.ids.is_subset(&other.ids) && self.ids != other.ids
    }

    /// Copy of this state with `id` added.
    pub fn with_item(&self, id: impl Into<String>) -> Self {
        let mut ids = self.ids.clone();
        ids.insert(id.into());
        Self { ids }
    }

    /// Copy of this state with `id` removed.
    pub fn without_item(&self, id: &str) -> Self {
        let mut ids = self.ids.clone();
        ids.remove(id);
        Self { ids }
    }
}

/// Canonical state order: cardinality first, then ids lexicographically.
impl Ord for KnowledgeState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.ids.iter().cmp(other.ids.iter()))
    }
}

impl PartialOrd for KnowledgeState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KnowledgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ids.is_empty() {
            return write!(f, "∅");
        }
        write!(f, "{{")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "}}")
    }
}

/// The domain Q — a finite, non-empty set of items with unique ids.
///
/// Items are kept sorted by id; the position of an item in that order is its
/// *index*, which doubles as its bit position in [`StateBits`].
#[derive(Debug, Clone)]
pub struct Domain {
    items: Vec<Item>,
    index: HashMap<String, usize>,
}

impl Domain {
    /// Build a domain from items. Fails on zero items or duplicate ids.
    pub fn new<I>(items: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = Item>,
    {
        let mut items: Vec<Item> = items.into_iter().collect();
        if items.is_empty() {
            return Err(DomainError::EmptyDomain);
        }
        items.sort();
        for pair in items.windows(2) {
            if pair[0].id() == pair[1].id() {
                return Err(DomainError::DuplicateItemId {
                    id: pair[0].id().to_owned(),
                });
            }
        }
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id().to_owned(), i))
            .collect();
        Ok(Self { items, index })
    }

    /// Build a domain from bare ids (no labels).
    pub fn from_ids<I, S>(ids: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ids.into_iter()
                .map(Item::new)
                .collect::<DomainResult<Vec<_>>>()?,
        )
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Domains are never empty; provided for symmetry with collections.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate the items in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// Iterate the ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Item::id)
    }

    /// Look up an item by id.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Position of an item in the id-sorted order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// The item at a given index.
    pub fn item_at(&self, index: usize) -> &Item {
        &self.items[index]
    }

    /// True if the id names an item of this domain.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// ∅ as a state.
    pub fn empty_state(&self) -> KnowledgeState {
        KnowledgeState::empty()
    }

    /// Q as a state — the maximal knowledge state.
    pub fn full_state(&self) -> KnowledgeState {
        KnowledgeState::from_ids(self.ids())
    }

    /// K ⊆ Q test.
    pub fn contains_state(&self, state: &KnowledgeState) -> bool {
        state.iter().all(|id| self.contains(id))
    }

    /// Two domains are the same iff they carry the same id set.
    pub fn same_items(&self, other: &Domain) -> bool {
        self.len() == other.len() && self.ids().eq(other.ids())
    }

    /// Convert a state to its bit representation over this domain.
    pub fn state_bits(&self, state: &KnowledgeState) -> DomainResult<StateBits> {
        let mut bits = StateBits::empty(self.len());
        for id in state.iter() {
            let idx = self
                .index_of(id)
                .ok_or_else(|| DomainError::UnknownItem { id: id.to_owned() })?;
            bits.insert(idx);
        }
        Ok(bits)
    }

    /// Convert a bit representation back to a state.
    pub fn state_from_bits(&self, bits: &StateBits) -> KnowledgeState {
        KnowledgeState::from_ids(bits.iter_ones().map(|i| self.items[i].id().to_owned()))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q = {{")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item.id())?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain::from_ids(["c", "a", "b"]).unwrap()
    }

    #[test]
    fn item_id_must_be_nonempty() {
        assert!(matches!(
            Item::new(""),
            Err(DomainError::InvalidItem { .. })
        ));
        assert!(matches!(
            Item::new("   "),
            Err(DomainError::InvalidItem { .. })
        ));
        assert!(Item::new("a").is_ok());
    }

    #[test]
    fn item_equality_ignores_label() {
        let plain = Item::new("a").unwrap();
        let labelled = Item::new("a").unwrap().with_label("Addition");
        assert_eq!(plain, labelled);
        assert_eq!(labelled.label(), "Addition");
        assert_eq!(plain.label(), "a");
    }

    #[test]
    fn domain_sorts_items_by_id() {
        let d = domain();
        let ids: Vec<&str> = d.ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(d.index_of("a"), Some(0));
        assert_eq!(d.index_of("c"), Some(2));
        assert_eq!(d.index_of("z"), None);
    }

    #[test]
    fn domain_rejects_duplicates_and_empty() {
        assert!(matches!(
            Domain::from_ids(["a", "a"]),
            Err(DomainError::DuplicateItemId { .. })
        ));
        assert!(matches!(
            Domain::from_ids(Vec::<String>::new()),
            Err(DomainError::EmptyDomain)
        ));
    }

    #[test]
    fn state_set_operations() {
        let k1 = KnowledgeState::from_ids(["a", "b"]);
        let k2 = KnowledgeState::from_ids(["b", "c"]);
        assert_eq!(k1.union(&k2), KnowledgeState::from_ids(["a", "b", "c"]));
        assert_eq!(k1.intersection(&k2), KnowledgeState::from_ids(["b"]));
        assert_eq!(k1.difference(&k2), KnowledgeState::from_ids(["a"]));
        assert_eq!(
            k1.symmetric_difference(&k2),
            KnowledgeState::from_ids(["a", "c"])
        );
    }

    #[test]
    fn state_subset_tests() {
        let small = KnowledgeState::from_ids(["a"]);
        let big = KnowledgeState::from_ids(["a", "b"]);
        assert!(small.is_subset_of(&big));
        assert!(small.is_proper_subset_of(&big));
        assert!(big.is_subset_of(&big));
        assert!(!big.is_proper_subset_of(&big));
        assert!(!big.is_subset_of(&small));
    }

    #[test]
    fn state_display() {
        assert_eq!(KnowledgeState::empty().to_string(), "∅");
        assert_eq!(
            KnowledgeState::from_ids(["b", "a"]).to_string(),
            "{a, b}"
        );
    }

    #[test]
    fn canonical_state_order() {
        let mut states = vec![
            KnowledgeState::from_ids(["b"]),
            KnowledgeState::from_ids(["a", "b"]),
            KnowledgeState::empty(),
            KnowledgeState::from_ids(["a"]),
        ];
        states.sort();
        let rendered: Vec<String> = states.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["∅", "{a}", "{b}", "{a, b}"]);
    }

    #[test]
    fn full_and_empty_states() {
        let d = domain();
        assert_eq!(d.empty_state().len(), 0);
        assert_eq!(d.full_state(), KnowledgeState::from_ids(["a", "b", "c"]));
        assert!(d.contains_state(&KnowledgeState::from_ids(["a", "c"])));
        assert!(!d.contains_state(&KnowledgeState::from_ids(["a", "z"])));
    }

    #[test]
    fn state_bits_round_trip() {
        let d = domain();
        let k = KnowledgeState::from_ids(["a", "c"]);
        let bits = d.state_bits(&k).unwrap();
        assert_eq!(bits.count(), 2);
        assert!(bits.contains(0));
        assert!(bits.contains(2));
        assert_eq!(d.state_from_bits(&bits), k);
    }

    #[test]
    fn state_bits_rejects_unknown_item() {
        let d = domain();
        let k = KnowledgeState::from_ids(["a", "z"]);
        assert!(matches!(
            d.state_bits(&k),
            Err(DomainError::UnknownItem { .. })
        ));
    }
}

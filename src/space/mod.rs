//! Knowledge spaces and learning spaces.
//!
//! A knowledge space is a family of states containing ∅ and Q and closed
//! under union (axioms S1–S3); a learning space additionally satisfies
//! accessibility. Both are dual-indexed: an ordered state vector in
//! canonical (cardinality, id-lexicographic) order for deterministic
//! iteration, and a hash map keyed on [`StateBits`] for O(1) membership.

pub mod paths;

use std::collections::HashMap;
use std::sync::Arc;

use crate::bits::StateBits;
use crate::domain::{Domain, KnowledgeState};
use crate::error::{SpaceError, SpaceResult};

pub use paths::PathEnumeration;

/// One edge of the covering relation: `lower ⋖ upper` with exactly one
/// item added. Indices refer to the space's canonical state order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverEdge {
    /// Index of the covered (lower) state.
    pub lower: usize,
    /// Index of the covering (upper) state.
    pub upper: usize,
    /// The single item the upper state adds.
    pub item: String,
}

/// A knowledge space (Q, 𝒦).
pub struct KnowledgeSpace {
    domain: Arc<Domain>,
    states: Vec<KnowledgeState>,
    bits: Vec<StateBits>,
    index: HashMap<StateBits, usize>,
}

impl KnowledgeSpace {
    /// Strict build: validates S1, S2, the subset condition, and S3, and
    /// fails with the corresponding [`SpaceError::AxiomViolation`].
    ///
    /// Duplicate states in the input collapse (the family is a set).
    pub fn build<I>(domain: Arc<Domain>, states: I) -> SpaceResult<Self>
    where
        I: IntoIterator<Item = KnowledgeState>,
    {
        let (states, bits, index) = index_family(&domain, states)?;

        if !index.contains_key(&StateBits::empty(domain.len())) {
            return Err(SpaceError::AxiomViolation {
                axiom: "S1".into(),
                witness: "∅ ∉ 𝒦".into(),
            });
        }
        if !index.contains_key(&StateBits::full(domain.len())) {
            return Err(SpaceError::AxiomViolation {
                axiom: "S2".into(),
                witness: "Q ∉ 𝒦".into(),
            });
        }
        if let Some((i, j)) = union_counterexample(&bits, &index) {
            return Err(SpaceError::AxiomViolation {
                axiom: "S3".into(),
                witness: format!(
                    "{} ∪ {} ∉ 𝒦",
                    states[i], states[j]
                ),
            });
        }

        Ok(Self {
            domain,
            states,
            bits,
            index,
        })
    }

    /// The domain Q.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Number of states in the family.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// A knowledge space always contains at least ∅ and Q.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The states in canonical order.
    pub fn states(&self) -> &[KnowledgeState] {
        &self.states
    }

    /// The state at a canonical-order index.
    pub fn state_at(&self, index: usize) -> &KnowledgeState {
        &self.states[index]
    }

    /// Membership test.
    pub fn contains(&self, state: &KnowledgeState) -> bool {
        self.index_of_state(state).is_some()
    }

    /// Canonical-order index of a state, if it is a member.
    pub fn index_of_state(&self, state: &KnowledgeState) -> Option<usize> {
        let bits = self.domain.state_bits(state).ok()?;
        self.index.get(&bits).copied()
    }

    /// Inner fringe `K^I = {q ∈ K : K \ {q} ∈ 𝒦}`, sorted by id.
    pub fn inner_fringe(&self, state: &KnowledgeState) -> SpaceResult<Vec<String>> {
        let idx = self.require_member(state)?;
        Ok(self.inner_fringe_at(idx))
    }

    /// Outer fringe `K^O = {q ∈ Q \ K : K ∪ {q} ∈ 𝒦}`, sorted by id.
    pub fn outer_fringe(&self, state: &KnowledgeState) -> SpaceResult<Vec<String>> {
        let idx = self.require_member(state)?;
        Ok(self.outer_fringe_at(idx))
    }

    pub(crate) fn inner_fringe_at(&self, index: usize) -> Vec<String> {
        let bits = &self.bits[index];
        bits.iter_ones()
            .filter(|&q| self.index.contains_key(&bits.without(q)))
            .map(|q| self.domain.item_at(q).id().to_owned())
            .collect()
    }

    pub(crate) fn outer_fringe_at(&self, index: usize) -> Vec<String> {
        let bits = &self.bits[index];
        (0..self.domain.len())
            .filter(|&q| !bits.contains(q) && self.index.contains_key(&bits.with(q)))
            .map(|q| self.domain.item_at(q).id().to_owned())
            .collect()
    }

    /// Outer fringe as item indices, for the enumeration algorithms.
    pub(crate) fn outer_fringe_indices(&self, bits: &StateBits) -> Vec<usize> {
        (0..self.domain.len())
            .filter(|&q| !bits.contains(q) && self.index.contains_key(&bits.with(q)))
            .collect()
    }

    pub(crate) fn bits_at(&self, index: usize) -> &StateBits {
        &self.bits[index]
    }

    pub(crate) fn index_of_bits(&self, bits: &StateBits) -> Option<usize> {
        self.index.get(bits).copied()
    }

    /// Atoms: the minimal non-empty states.
    ///
    /// A is an atom iff A ≠ ∅ and no state K satisfies ∅ ⊂ K ⊂ A. Scans
    /// non-empty states in increasing cardinality, so only smaller states
    /// need testing.
    pub fn atoms(&self) -> Vec<KnowledgeState> {
        let mut atoms = Vec::new();
        for (i, candidate) in self.bits.iter().enumerate() {
            if candidate.is_empty() {
                continue;
            }
            let minimal = self.bits[..i]
                .iter()
                .all(|other| other.is_empty() || !other.is_proper_subset_of(candidate));
            if minimal {
                atoms.push(self.states[i].clone());
            }
        }
        atoms
    }

    /// Gradation: states partitioned by cardinality into levels 0..=|Q|.
    ///
    /// Levels with no state are present and empty.
    pub fn gradation(&self) -> Vec<Vec<KnowledgeState>> {
        let mut levels = vec![Vec::new(); self.domain.len() + 1];
        for (state, bits) in self.states.iter().zip(&self.bits) {
            levels[bits.count()].push(state.clone());
        }
        levels
    }

    /// The covering relation: all `L ⋖ K` with |K| = |L| + 1 and L ⊂ K.
    ///
    /// Emitted in canonical order of the lower state, then by added item.
    pub fn cover_edges(&self) -> Vec<CoverEdge> {
        let mut edges = Vec::new();
        for (lower, bits) in self.bits.iter().enumerate() {
            for q in self.outer_fringe_indices(bits) {
                let upper = self.index[&bits.with(q)];
                edges.push(CoverEdge {
                    lower,
                    upper,
                    item: self.domain.item_at(q).id().to_owned(),
                });
            }
        }
        edges
    }

    fn require_member(&self, state: &KnowledgeState) -> SpaceResult<usize> {
        self.index_of_state(state)
            .ok_or_else(|| SpaceError::UnknownState {
                state: state
                    .ids()
                    .join(", "),
            })
    }
}

impl std::fmt::Debug for KnowledgeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeSpace")
            .field("items", &self.domain.len())
            .field("states", &self.states.len())
            .finish()
    }
}

/// A learning space: a knowledge space that also satisfies accessibility.
pub struct LearningSpace {
    inner: KnowledgeSpace,
}

impl LearningSpace {
    /// Strict build: knowledge-space axioms plus accessibility.
    pub fn build<I>(domain: Arc<Domain>, states: I) -> SpaceResult<Self>
    where
        I: IntoIterator<Item = KnowledgeState>,
    {
        Self::from_space(KnowledgeSpace::build(domain, states)?)
    }

    /// Upgrade a validated knowledge space, checking accessibility.
    pub fn from_space(space: KnowledgeSpace) -> SpaceResult<Self> {
        if let Some(i) = accessibility_counterexample(&space.bits, &space.index) {
            return Err(SpaceError::InaccessibleState {
                state: space.states[i].ids().join(", "),
            });
        }
        Ok(Self { inner: space })
    }

    /// View as a knowledge space.
    pub fn space(&self) -> &KnowledgeSpace {
        &self.inner
    }

    /// The domain Q.
    pub fn domain(&self) -> &Arc<Domain> {
        self.inner.domain()
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Never empty; see [`KnowledgeSpace::is_empty`].
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The states in canonical order.
    pub fn states(&self) -> &[KnowledgeState] {
        self.inner.states()
    }

    /// Membership test.
    pub fn contains(&self, state: &KnowledgeState) -> bool {
        self.inner.contains(state)
    }

    /// Inner fringe, sorted by id.
    pub fn inner_fringe(&self, state: &KnowledgeState) -> SpaceResult<Vec<String>> {
        self.inner.inner_fringe(state)
    }

    /// Outer fringe, sorted by id.
    pub fn outer_fringe(&self, state: &KnowledgeState) -> SpaceResult<Vec<String>> {
        self.inner.outer_fringe(state)
    }

    /// Covering relation edges.
    pub fn cover_edges(&self) -> Vec<CoverEdge> {
        self.inner.cover_edges()
    }

    /// Enumerate learning paths from ∅ to Q, capped at `max_paths`.
    pub fn learning_paths(&self, max_paths: usize) -> PathEnumeration {
        paths::enumerate(&self.inner, max_paths)
    }
}

impl std::fmt::Debug for LearningSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningSpace")
            .field("items", &self.inner.domain.len())
            .field("states", &self.inner.states.len())
            .finish()
    }
}

/// Index a state family: canonical order, bits, and the membership map.
///
/// Fails with a subset-axiom violation when a state mentions an item
/// outside the domain.
fn index_family<I>(
    domain: &Arc<Domain>,
    states: I,
) -> SpaceResult<(Vec<KnowledgeState>, Vec<StateBits>, HashMap<StateBits, usize>)>
where
    I: IntoIterator<Item = KnowledgeState>,
{
    let mut keyed: Vec<(StateBits, KnowledgeState)> = Vec::new();
    let mut seen: HashMap<StateBits, ()> = HashMap::new();
    for state in states {
        let bits = domain
            .state_bits(&state)
            .map_err(|_| SpaceError::AxiomViolation {
                axiom: "subset".into(),
                witness: format!("{state} ⊄ Q"),
            })?;
        if seen.insert(bits.clone(), ()).is_none() {
            keyed.push((bits, state));
        }
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    let mut states = Vec::with_capacity(keyed.len());
    let mut bits = Vec::with_capacity(keyed.len());
    let mut index = HashMap::with_capacity(keyed.len());
    for (i, (b, s)) in keyed.into_iter().enumerate() {
        index.insert(b.clone(), i);
        bits.push(b);
        states.push(s);
    }
    Ok((states, bits, index))
}

/// Smallest union-closure counterexample, or `None` when S3 holds.
///
/// Scans all unordered pairs and keeps the violating pair with the
/// smallest combined cardinality (ties resolved by canonical order), so
/// reports show the most debuggable witness.
pub(crate) fn union_counterexample(
    bits: &[StateBits],
    index: &HashMap<StateBits, usize>,
) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;
    for i in 0..bits.len() {
        for j in (i + 1)..bits.len() {
            let union = bits[i].union(&bits[j]);
            if index.contains_key(&union) {
                continue;
            }
            let size = bits[i].count() + bits[j].count();
            // Canonical order of (i, j) already breaks ties: pairs are
            // visited in ascending order.
            if best.map_or(true, |(s, _, _)| size < s) {
                best = Some((size, i, j));
            }
        }
    }
    best.map(|(_, i, j)| (i, j))
}

/// First inaccessible non-empty state in canonical order, or `None`.
pub(crate) fn accessibility_counterexample(
    bits: &[StateBits],
    index: &HashMap<StateBits, usize>,
) -> Option<usize> {
    bits.iter().position(|b| {
        !b.is_empty() && !b.iter_ones().any(|q| index.contains_key(&b.without(q)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(ids: &[&str]) -> Arc<Domain> {
        Arc::new(Domain::from_ids(ids.iter().copied()).unwrap())
    }

    fn st(ids: &[&str]) -> KnowledgeState {
        KnowledgeState::from_ids(ids.iter().copied())
    }

    /// ∅, {a}, {a,b}, {a,c}, {a,b,c} — the diamond over a < {b, c}.
    fn small_space() -> KnowledgeSpace {
        let d = domain(&["a", "b", "c"]);
        KnowledgeSpace::build(
            d,
            vec![
                st(&[]),
                st(&["a"]),
                st(&["a", "b"]),
                st(&["a", "c"]),
                st(&["a", "b", "c"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn build_orders_states_canonically() {
        let space = small_space();
        let rendered: Vec<String> = space.states().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["∅", "{a}", "{a, b}", "{a, c}", "{a, b, c}"]
        );
    }

    #[test]
    fn build_rejects_missing_empty_state() {
        let d = domain(&["a"]);
        let err = KnowledgeSpace::build(d, vec![st(&["a"])]).unwrap_err();
        assert!(matches!(err, SpaceError::AxiomViolation { axiom, .. } if axiom == "S1"));
    }

    #[test]
    fn build_rejects_missing_full_state() {
        let d = domain(&["a", "b"]);
        let err = KnowledgeSpace::build(d, vec![st(&[]), st(&["a"])]).unwrap_err();
        assert!(matches!(err, SpaceError::AxiomViolation { axiom, .. } if axiom == "S2"));
    }

    #[test]
    fn build_rejects_union_violation() {
        let d = domain(&["a", "b", "c"]);
        // {a} ∪ {b} = {a, b} missing.
        let err = KnowledgeSpace::build(
            d,
            vec![st(&[]), st(&["a"]), st(&["b"]), st(&["a", "b", "c"])],
        )
        .unwrap_err();
        match err {
            SpaceError::AxiomViolation { axiom, witness } => {
                assert_eq!(axiom, "S3");
                assert!(witness.contains("{a} ∪ {b}"));
            }
            other => panic!("expected S3 violation, got {other:?}"),
        }
    }

    #[test]
    fn build_rejects_foreign_items() {
        let d = domain(&["a"]);
        let err = KnowledgeSpace::build(d, vec![st(&[]), st(&["a"]), st(&["z"])]).unwrap_err();
        assert!(matches!(err, SpaceError::AxiomViolation { axiom, .. } if axiom == "subset"));
    }

    #[test]
    fn duplicate_states_collapse() {
        let d = domain(&["a"]);
        let space = KnowledgeSpace::build(d, vec![st(&[]), st(&["a"]), st(&["a"])]).unwrap();
        assert_eq!(space.len(), 2);
    }

    #[test]
    fn fringes() {
        let space = small_space();
        assert_eq!(space.outer_fringe(&st(&[])).unwrap(), vec!["a"]);
        assert_eq!(space.outer_fringe(&st(&["a"])).unwrap(), vec!["b", "c"]);
        assert_eq!(
            space.inner_fringe(&st(&["a", "b", "c"])).unwrap(),
            vec!["b", "c"]
        );
        assert_eq!(space.inner_fringe(&st(&["a", "b"])).unwrap(), vec!["b"]);
        assert!(space.inner_fringe(&st(&[])).unwrap().is_empty());
    }

    #[test]
    fn fringe_of_non_member_is_an_error() {
        let space = small_space();
        assert!(matches!(
            space.inner_fringe(&st(&["b"])),
            Err(SpaceError::UnknownState { .. })
        ));
    }

    #[test]
    fn atoms_of_small_space() {
        let space = small_space();
        let atoms = space.atoms();
        assert_eq!(atoms, vec![st(&["a"])]);
    }

    #[test]
    fn atoms_of_power_set_are_singletons() {
        let d = domain(&["a", "b"]);
        let space = KnowledgeSpace::build(
            d,
            vec![st(&[]), st(&["a"]), st(&["b"]), st(&["a", "b"])],
        )
        .unwrap();
        assert_eq!(space.atoms(), vec![st(&["a"]), st(&["b"])]);
    }

    #[test]
    fn gradation_has_all_levels() {
        let space = small_space();
        let levels = space.gradation();
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[0].len(), 1);
        assert_eq!(levels[1].len(), 1);
        assert_eq!(levels[2].len(), 2);
        assert_eq!(levels[3].len(), 1);
    }

    #[test]
    fn cover_edges_add_one_item() {
        let space = small_space();
        let edges = space.cover_edges();
        assert_eq!(edges.len(), 5);
        for edge in &edges {
            let lower = space.state_at(edge.lower);
            let upper = space.state_at(edge.upper);
            assert_eq!(upper.len(), lower.len() + 1);
            assert!(lower.is_proper_subset_of(upper));
            assert!(upper.contains(&edge.item));
            assert!(!lower.contains(&edge.item));
        }
    }

    #[test]
    fn learning_space_accepts_accessible_family() {
        let d = domain(&["a", "b", "c"]);
        let ls = LearningSpace::build(
            d,
            vec![
                st(&[]),
                st(&["a"]),
                st(&["a", "b"]),
                st(&["a", "c"]),
                st(&["a", "b", "c"]),
            ],
        );
        assert!(ls.is_ok());
    }

    #[test]
    fn learning_space_rejects_inaccessible_state() {
        let d = domain(&["a", "b"]);
        // {a, b} cannot shed one item and stay in the family.
        let err = LearningSpace::build(d, vec![st(&[]), st(&["a", "b"])]).unwrap_err();
        match err {
            SpaceError::InaccessibleState { state } => assert_eq!(state, "a, b"),
            other => panic!("expected inaccessible state, got {other:?}"),
        }
    }
}

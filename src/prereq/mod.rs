//! Prerequisite algebra: surmise relations and prerequisite DAGs.
//!
//! The two structures are dual views of the same pedagogy:
//!
//! - [`PrerequisiteGraph`]: direct prerequisites as a DAG, backed by
//!   `petgraph` with an id → node index map for O(1) lookups
//! - [`SurmiseRelation`]: the quasi-order obtained as the graph's
//!   transitive closure, with reflexive pairs included
//!
//! By Birkhoff's correspondence, the downsets of a surmise relation form a
//! knowledge space closed under both union and intersection.

pub mod closure;
pub mod downsets;

use std::collections::BTreeSet;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::bits::StateBits;
use crate::domain::{Domain, KnowledgeState};
use crate::error::{PrereqError, PrereqResult};

use closure::TopologicalOrders;

/// A directed acyclic graph of direct prerequisites over a domain.
///
/// An edge `(p, q)` means "p is a direct prerequisite of q". Construction
/// rejects unknown endpoints and any directed cycle (a self-loop is a cycle
/// of length one).
pub struct PrerequisiteGraph {
    domain: Arc<Domain>,
    edges: BTreeSet<(String, String)>,
    graph: DiGraph<usize, ()>,
}

impl PrerequisiteGraph {
    /// Build a prerequisite DAG from an edge set.
    pub fn new<I>(domain: Arc<Domain>, edges: I) -> PrereqResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut edge_set: BTreeSet<(String, String)> = BTreeSet::new();
        for (src, dst) in edges {
            if !domain.contains(&src) {
                return Err(PrereqError::UnknownItem { id: src });
            }
            if !domain.contains(&dst) {
                return Err(PrereqError::UnknownItem { id: dst });
            }
            if src == dst {
                return Err(PrereqError::CyclicPrerequisites {
                    cycle: vec![src.clone(), src],
                });
            }
            edge_set.insert((src, dst));
        }

        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..domain.len()).map(|i| graph.add_node(i)).collect();
        for (src, dst) in &edge_set {
            let s = domain.index_of(src).expect("endpoint validated above");
            let d = domain.index_of(dst).expect("endpoint validated above");
            graph.add_edge(nodes[s], nodes[d], ());
        }

        let built = Self {
            domain,
            edges: edge_set,
            graph,
        };
        if petgraph::algo::is_cyclic_directed(&built.graph) {
            let cycle = closure::find_cycle(&built.successor_indices())
                .expect("cyclic graph has an extractable cycle");
            let mut ids: Vec<String> = cycle
                .iter()
                .map(|&i| built.domain.item_at(i).id().to_owned())
                .collect();
            // Close the loop for display: a -> b -> a.
            if let Some(first) = ids.first().cloned() {
                ids.push(first);
            }
            return Err(PrereqError::CyclicPrerequisites { cycle: ids });
        }
        Ok(built)
    }

    /// The domain this graph is defined on.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// The direct-prerequisite edges, sorted.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Direct prerequisites of an item (its parents in the DAG), sorted.
    pub fn direct_prerequisites(&self, id: &str) -> PrereqResult<Vec<String>> {
        self.require_item(id)?;
        Ok(self
            .edges
            .iter()
            .filter(|(_, dst)| dst == id)
            .map(|(src, _)| src.clone())
            .collect())
    }

    /// Direct dependents of an item (its children in the DAG), sorted.
    pub fn direct_dependents(&self, id: &str) -> PrereqResult<Vec<String>> {
        self.require_item(id)?;
        let mut out: Vec<String> = self
            .edges
            .iter()
            .filter(|(src, _)| src == id)
            .map(|(_, dst)| dst.clone())
            .collect();
        out.sort();
        Ok(out)
    }

    /// Compute the transitive closure as a surmise relation.
    ///
    /// The result contains all reflexive pairs plus every `(p, q)` with a
    /// directed path `p →* q`.
    pub fn to_surmise_relation(&self) -> SurmiseRelation {
        let reach = closure::reachability(&self.successor_indices());
        let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
        for id in self.domain.ids() {
            pairs.insert((id.to_owned(), id.to_owned()));
        }
        for (src, bits) in reach.iter().enumerate() {
            for dst in bits.iter_ones() {
                pairs.insert((
                    self.domain.item_at(src).id().to_owned(),
                    self.domain.item_at(dst).id().to_owned(),
                ));
            }
        }
        SurmiseRelation::new(Arc::clone(&self.domain), pairs)
            .expect("closure of a DAG is a quasi-order")
    }

    /// The minimum-edge DAG inducing the same reachability.
    pub fn transitive_reduction(&self) -> PrereqResult<PrerequisiteGraph> {
        let succ = self.successor_indices();
        let reach = closure::reachability(&succ);
        let mut kept: Vec<(String, String)> = Vec::new();
        for (u, vs) in succ.iter().enumerate() {
            for &v in vs {
                // (u, v) is redundant when another successor of u already
                // reaches v.
                let redundant = vs.iter().any(|&w| w != v && reach[w].contains(v));
                if !redundant {
                    kept.push((
                        self.domain.item_at(u).id().to_owned(),
                        self.domain.item_at(v).id().to_owned(),
                    ));
                }
            }
        }
        PrerequisiteGraph::new(Arc::clone(&self.domain), kept)
    }

    /// Lazily enumerate every topological order of the DAG.
    ///
    /// Orders are produced lexicographically by item id; each prefix induces
    /// a downset. The iterator is lazy, so callers bound factorial blowup
    /// with `take`.
    pub fn topological_orders(&self) -> TopologicalOrders {
        TopologicalOrders::new(Arc::clone(&self.domain), self.successor_indices())
    }

    /// One longest directed path and its length in edges.
    ///
    /// With no edges, the witness is the single id-smallest item and the
    /// length is 0 (isolated items count as length-0 paths).
    pub fn longest_path(&self) -> (Vec<String>, usize) {
        let (indices, length) = closure::longest_path(&self.successor_indices());
        let ids = indices
            .into_iter()
            .map(|i| self.domain.item_at(i).id().to_owned())
            .collect();
        (ids, length)
    }

    /// Successor adjacency over item indices, each list ascending.
    pub(crate) fn successor_indices(&self) -> Vec<Vec<usize>> {
        let mut succ = vec![Vec::new(); self.domain.len()];
        for (src, dst) in &self.edges {
            let s = self.domain.index_of(src).expect("edge endpoints are items");
            let d = self.domain.index_of(dst).expect("edge endpoints are items");
            succ[s].push(d);
        }
        // BTreeSet iteration is sorted by (src, dst), so each list is
        // already ascending; the sort documents the invariant.
        for list in &mut succ {
            list.sort_unstable();
        }
        succ
    }

    /// Access the underlying petgraph structure.
    pub fn graph(&self) -> &DiGraph<usize, ()> {
        &self.graph
    }

    fn require_item(&self, id: &str) -> PrereqResult<()> {
        if self.domain.contains(id) {
            Ok(())
        } else {
            Err(PrereqError::UnknownItem { id: id.to_owned() })
        }
    }
}

impl std::fmt::Debug for PrerequisiteGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrerequisiteGraph")
            .field("items", &self.domain.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

/// A surmise relation: a reflexive, transitive quasi-order on a domain.
///
/// `(p, q)` in the relation means mastering q lets one surmise mastery of p;
/// equivalently, p is a prerequisite of q.
pub struct SurmiseRelation {
    domain: Arc<Domain>,
    pairs: BTreeSet<(String, String)>,
    /// Strict prerequisites per item index (self excluded).
    prereq_bits: Vec<StateBits>,
}

impl SurmiseRelation {
    /// Build a surmise relation from ordered pairs.
    ///
    /// Fails with [`PrereqError::NotAQuasiOrder`] when a reflexive pair is
    /// missing or the pair set is not transitively closed.
    pub fn new<I>(domain: Arc<Domain>, pairs: I) -> PrereqResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let pairs: BTreeSet<(String, String)> = pairs.into_iter().collect();
        for (a, b) in &pairs {
            if !domain.contains(a) {
                return Err(PrereqError::UnknownItem { id: a.clone() });
            }
            if !domain.contains(b) {
                return Err(PrereqError::UnknownItem { id: b.clone() });
            }
        }
        for id in domain.ids() {
            if !pairs.contains(&(id.to_owned(), id.to_owned())) {
                return Err(PrereqError::NotAQuasiOrder {
                    reason: format!("missing reflexive pair ({id}, {id})"),
                });
            }
        }
        for (a, b) in &pairs {
            for c in domain.ids() {
                if pairs.contains(&(b.clone(), c.to_owned()))
                    && !pairs.contains(&(a.clone(), c.to_owned()))
                {
                    return Err(PrereqError::NotAQuasiOrder {
                        reason: format!(
                            "({a}, {b}) and ({b}, {c}) present but ({a}, {c}) missing"
                        ),
                    });
                }
            }
        }

        let mut prereq_bits = vec![StateBits::empty(domain.len()); domain.len()];
        for (p, q) in &pairs {
            if p != q {
                let pi = domain.index_of(p).expect("pair endpoints are items");
                let qi = domain.index_of(q).expect("pair endpoints are items");
                prereq_bits[qi].insert(pi);
            }
        }
        Ok(Self {
            domain,
            pairs,
            prereq_bits,
        })
    }

    /// The domain this relation is defined on.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// All pairs of the relation, sorted, reflexive pairs included.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Number of pairs, reflexive pairs included.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// A quasi-order always carries its reflexive pairs.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Strict prerequisites of an item: `{p ≠ q : p ≼ q}`, sorted.
    pub fn prerequisites_of(&self, id: &str) -> PrereqResult<Vec<String>> {
        let idx = self.require_item(id)?;
        Ok(self.prereq_bits[idx]
            .iter_ones()
            .map(|i| self.domain.item_at(i).id().to_owned())
            .collect())
    }

    /// Strict dependents of an item: `{r ≠ q : q ≼ r}`, sorted.
    pub fn dependents_of(&self, id: &str) -> PrereqResult<Vec<String>> {
        self.require_item(id)?;
        Ok(self
            .domain
            .ids()
            .filter(|r| *r != id && self.pairs.contains(&(id.to_owned(), (*r).to_owned())))
            .map(str::to_owned)
            .collect())
    }

    /// Downset test: `q ∈ K` implies every prerequisite of q is in K.
    pub fn is_downset(&self, state: &KnowledgeState) -> PrereqResult<bool> {
        let mut bits = StateBits::empty(self.domain.len());
        for id in state.iter() {
            let idx = self
                .domain
                .index_of(id)
                .ok_or_else(|| PrereqError::UnknownItem { id: id.to_owned() })?;
            bits.insert(idx);
        }
        Ok(self.is_downset_bits(&bits))
    }

    pub(crate) fn is_downset_bits(&self, bits: &StateBits) -> bool {
        bits.iter_ones()
            .all(|q| self.prereq_bits[q].is_subset_of(bits))
    }

    /// Enumerate every downset of the relation (Birkhoff direction).
    ///
    /// The result always contains ∅ and Q, each downset exactly once, in
    /// canonical (cardinality, id-lexicographic) order.
    pub fn downset_family(&self) -> Vec<KnowledgeState> {
        downsets::enumerate(self.domain.len(), &self.prereq_bits)
            .into_iter()
            .map(|bits| self.domain.state_from_bits(&bits))
            .collect()
    }

    fn require_item(&self, id: &str) -> PrereqResult<usize> {
        self.domain
            .index_of(id)
            .ok_or_else(|| PrereqError::UnknownItem { id: id.to_owned() })
    }
}

impl std::fmt::Debug for SurmiseRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurmiseRelation")
            .field("items", &self.domain.len())
            .field("pairs", &self.pairs.len())
            .finish()
    }
}

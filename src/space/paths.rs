//! Learning-path enumeration.
//!
//! A learning path is a maximal chain ∅ = K₀ ⋖ K₁ ⋖ … ⋖ Kₙ = Q in which
//! every step adds exactly one item. Enumeration is depth-first from ∅,
//! branching on the outer fringe in item-id order, so output is
//! deterministic. The number of paths grows factorially in the worst case
//! (an antichain has |Q|! of them), so the caller supplies a cap and the
//! result says whether it was hit.

use crate::bits::StateBits;

use super::KnowledgeSpace;

/// Result of a capped path enumeration.
#[derive(Debug, Clone)]
pub struct PathEnumeration {
    /// Paths found, each as the sequence of acquired item ids.
    pub paths: Vec<Vec<String>>,
    /// True when the cap stopped the search before it was exhausted.
    pub truncated: bool,
}

impl PathEnumeration {
    /// Number of paths collected.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when no path was collected.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub(crate) fn enumerate(space: &KnowledgeSpace, max_paths: usize) -> PathEnumeration {
    let mut enumerator = Enumerator {
        space,
        max_paths,
        paths: Vec::new(),
        truncated: false,
    };
    if max_paths > 0 {
        let start = StateBits::empty(space.domain().len());
        let mut trail = Vec::with_capacity(space.domain().len());
        enumerator.descend(start, &mut trail);
    } else {
        enumerator.truncated = true;
    }
    PathEnumeration {
        paths: enumerator.paths,
        truncated: enumerator.truncated,
    }
}

struct Enumerator<'a> {
    space: &'a KnowledgeSpace,
    max_paths: usize,
    paths: Vec<Vec<String>>,
    truncated: bool,
}

impl Enumerator<'_> {
    fn descend(&mut self, current: StateBits, trail: &mut Vec<usize>) {
        if self.truncated {
            return;
        }
        if current.count() == self.space.domain().len() {
            if self.paths.len() == self.max_paths {
                self.truncated = true;
                return;
            }
            self.paths.push(
                trail
                    .iter()
                    .map(|&q| self.space.domain().item_at(q).id().to_owned())
                    .collect(),
            );
            return;
        }
        for q in self.space.outer_fringe_indices(&current) {
            trail.push(q);
            self.descend(current.with(q), trail);
            trail.pop();
            if self.truncated {
                return;
            }
        }
    }
}

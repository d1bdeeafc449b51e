//! Structured validation of knowledge-space and learning-space axioms.
//!
//! Validators never mutate or reject their inputs: they produce a report
//! of named checks with literature references, and `is_valid` is the
//! conjunction. Strict construction ([`crate::space::KnowledgeSpace::build`])
//! turns the first failure into an error instead.

use std::collections::HashMap;

use serde::Serialize;

use crate::bits::StateBits;
use crate::domain::{Domain, KnowledgeState};
use crate::space::{accessibility_counterexample, union_counterexample};

/// A single validation check result.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationCheck {
    /// Name of the checked property.
    pub name: String,
    /// Whether the property holds.
    pub passed: bool,
    /// Human-readable outcome, carrying a witness on failure.
    pub message: String,
    /// Bibliographic reference for the property.
    pub reference: String,
}

/// Aggregated report of validation checks.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// All checks, in the order they were run.
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    /// True iff every check passed.
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// The failing checks.
    pub fn failures(&self) -> Vec<&ValidationCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// "passed/total checks passed" one-liner.
    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        format!("{passed}/{} checks passed", self.checks.len())
    }
}

/// Validate the knowledge space axioms of (Q, 𝒦).
///
/// Checks non-emptiness, S1 (∅ ∈ 𝒦), S2 (Q ∈ 𝒦), the subset condition,
/// and S3 (closure under union). The S3 failure message carries the
/// smallest-cardinality counterexample pair.
pub fn validate_knowledge_space(domain: &Domain, states: &[KnowledgeState]) -> ValidationReport {
    let mut checks = Vec::new();
    let family = Family::index(domain, states);

    checks.push(ValidationCheck {
        name: "Non-emptiness".into(),
        passed: !states.is_empty(),
        message: if states.is_empty() {
            "𝒦 is empty".into()
        } else {
            "𝒦 is non-empty".into()
        },
        reference: "Doignon & Falmagne (1999), Definition 1.1.1".into(),
    });

    let has_empty = family.index.contains_key(&StateBits::empty(domain.len()));
    checks.push(ValidationCheck {
        name: "S1: Empty state".into(),
        passed: has_empty,
        message: if has_empty {
            "∅ ∈ 𝒦".into()
        } else {
            "∅ ∉ 𝒦 — axiom S1 violated".into()
        },
        reference: "Doignon & Falmagne (1999), Definition 1.1.1 (i)".into(),
    });

    let has_full = family.index.contains_key(&StateBits::full(domain.len()));
    checks.push(ValidationCheck {
        name: "S2: Full domain".into(),
        passed: has_full,
        message: if has_full {
            "Q ∈ 𝒦".into()
        } else {
            "Q ∉ 𝒦 — axiom S2 violated".into()
        },
        reference: "Doignon & Falmagne (1999), Definition 1.1.1 (ii)".into(),
    });

    checks.push(ValidationCheck {
        name: "States ⊆ Q".into(),
        passed: family.foreign.is_empty(),
        message: match family.foreign.first() {
            None => "all states are subsets of Q".into(),
            Some(state) => format!("state {state} contains items not in Q"),
        },
        reference: "Doignon & Falmagne (1999), Definition 1.1.1".into(),
    });

    let counterexample = union_counterexample(&family.bits, &family.index);
    checks.push(ValidationCheck {
        name: "S3: Closure under union".into(),
        passed: counterexample.is_none(),
        message: match counterexample {
            None => "𝒦 is closed under ∪".into(),
            Some((i, j)) => {
                let union = family.members[i].union(&family.members[j]);
                format!(
                    "not closed under ∪: {} ∪ {} = {union} ∉ 𝒦",
                    family.members[i], family.members[j]
                )
            }
        },
        reference: "Doignon & Falmagne (1999), Definition 1.1.1 (iii)".into(),
    });

    ValidationReport { checks }
}

/// Validate the learning space axioms: everything in
/// [`validate_knowledge_space`] plus accessibility.
pub fn validate_learning_space(domain: &Domain, states: &[KnowledgeState]) -> ValidationReport {
    let mut report = validate_knowledge_space(domain, states);
    let family = Family::index(domain, states);

    let counterexample = accessibility_counterexample(&family.bits, &family.index);
    report.checks.push(ValidationCheck {
        name: "Accessibility (antimatroid)".into(),
        passed: counterexample.is_none(),
        message: match counterexample {
            None => "every non-empty state has a removable item".into(),
            Some(i) => format!(
                "state {} has no item whose removal yields another state",
                family.members[i]
            ),
        },
        reference: "Falmagne & Doignon (2011), Definition 2.1.1".into(),
    });

    report
}

/// The subset of a raw family that lies inside the domain, indexed for the
/// structural checks, plus the states that do not.
struct Family {
    members: Vec<KnowledgeState>,
    bits: Vec<StateBits>,
    index: HashMap<StateBits, usize>,
    foreign: Vec<KnowledgeState>,
}

impl Family {
    fn index(domain: &Domain, states: &[KnowledgeState]) -> Self {
        let mut keyed: Vec<(StateBits, KnowledgeState)> = Vec::new();
        let mut foreign = Vec::new();
        let mut seen: HashMap<StateBits, ()> = HashMap::new();
        for state in states {
            match domain.state_bits(state) {
                Ok(bits) => {
                    if seen.insert(bits.clone(), ()).is_none() {
                        keyed.push((bits, state.clone()));
                    }
                }
                Err(_) => foreign.push(state.clone()),
            }
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut members = Vec::with_capacity(keyed.len());
        let mut bits = Vec::with_capacity(keyed.len());
        let mut index = HashMap::with_capacity(keyed.len());
        for (i, (b, s)) in keyed.into_iter().enumerate() {
            index.insert(b.clone(), i);
            bits.push(b);
            members.push(s);
        }
        Self {
            members,
            bits,
            index,
            foreign,
        }
    }
}

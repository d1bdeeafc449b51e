//! Markov learning model on a learning space.
//!
//! Learning is a discrete-time absorbing Markov chain on knowledge states:
//! from state K the learner acquires one outer-fringe item q with
//! probability λ_q / Σ λ_{q'}, and the full domain Q is the unique
//! absorbing state. Expected steps to mastery come from the fundamental
//! matrix of the chain, computed by solving (I − T)x = 𝟙 rather than
//! inverting.

pub mod optimize;

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;

use crate::domain::{Domain, KnowledgeState};
use crate::error::{LearnError, LearnResult, SpaceError};
use crate::space::LearningSpace;

/// Pivots below this magnitude make (I − T) numerically singular.
const PIVOT_FLOOR: f64 = 1e-12;

/// Per-item learning rates λ_q > 0.
///
/// Rates are relative propensities: only their ratios matter for the
/// transition probabilities.
pub struct LearningRate {
    domain: Arc<Domain>,
    rates: Vec<f64>,
}

impl LearningRate {
    /// Build rates from a per-item map keyed by id.
    ///
    /// The key set must equal the domain's id set and every rate must be a
    /// finite positive number.
    pub fn new(domain: Arc<Domain>, rates: BTreeMap<String, f64>) -> LearnResult<Self> {
        for id in rates.keys() {
            if !domain.contains(id) {
                return Err(crate::error::DomainError::UnknownItem { id: id.clone() }.into());
            }
        }
        let mut values = Vec::with_capacity(domain.len());
        for id in domain.ids() {
            let value = *rates
                .get(id)
                .ok_or_else(|| LearnError::MissingRate { id: id.to_owned() })?;
            if !(value.is_finite() && value > 0.0) {
                return Err(LearnError::ParameterOutOfRange {
                    id: id.to_owned(),
                    value,
                });
            }
            values.push(value);
        }
        Ok(Self {
            domain,
            rates: values,
        })
    }

    /// The same rate for every item.
    pub fn uniform(domain: Arc<Domain>, rate: f64) -> LearnResult<Self> {
        let map = domain
            .ids()
            .map(|id| (id.to_owned(), rate))
            .collect::<BTreeMap<_, _>>();
        Self::new(domain, map)
    }

    /// The domain these rates cover.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// λ for an item id.
    pub fn rate(&self, id: &str) -> Option<f64> {
        self.domain.index_of(id).map(|i| self.rates[i])
    }

    pub(crate) fn rate_at(&self, index: usize) -> f64 {
        self.rates[index]
    }
}

impl std::fmt::Debug for LearningRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningRate")
            .field("items", &self.domain.len())
            .finish()
    }
}

/// A simulated learning trajectory.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Visited states, starting state included.
    pub states: Vec<KnowledgeState>,
    /// False when the step cap stopped the walk before absorption at Q.
    pub reached_mastery: bool,
}

impl Trajectory {
    /// Number of learning steps taken.
    pub fn steps(&self) -> usize {
        self.states.len().saturating_sub(1)
    }
}

/// The absorbing Markov chain of a learning space plus rates.
pub struct LearningModel<'a> {
    space: &'a LearningSpace,
    rates: &'a LearningRate,
}

impl<'a> LearningModel<'a> {
    /// Pair a learning space with learning rates on the same domain.
    pub fn new(space: &'a LearningSpace, rates: &'a LearningRate) -> LearnResult<Self> {
        if !space.domain().same_items(rates.domain()) {
            return Err(LearnError::DomainMismatch);
        }
        Ok(Self { space, rates })
    }

    /// The underlying learning space.
    pub fn space(&self) -> &LearningSpace {
        self.space
    }

    /// Transition distribution from a state, in item-id order of the
    /// acquired item. The full state returns itself with probability 1.
    pub fn transition_probs(
        &self,
        state: &KnowledgeState,
    ) -> LearnResult<Vec<(KnowledgeState, f64)>> {
        let ks = self.space.space();
        let index = ks
            .index_of_state(state)
            .ok_or_else(|| SpaceError::UnknownState {
                state: state.ids().join(", "),
            })?;
        Ok(self.transition_probs_at(index))
    }

    fn transition_probs_at(&self, index: usize) -> Vec<(KnowledgeState, f64)> {
        let ks = self.space.space();
        let bits = ks.bits_at(index);
        if bits.count() == ks.domain().len() {
            return vec![(ks.state_at(index).clone(), 1.0)];
        }
        let fringe = ks.outer_fringe_indices(bits);
        let total: f64 = fringe.iter().map(|&q| self.rates.rate_at(q)).sum();
        fringe
            .iter()
            .map(|&q| {
                let upper = ks
                    .index_of_bits(&bits.with(q))
                    .expect("outer fringe targets are states");
                (ks.state_at(upper).clone(), self.rates.rate_at(q) / total)
            })
            .collect()
    }

    /// Full transition matrix over the space's canonical state order.
    ///
    /// Rows sum to 1; entries outside the covering relation are zero; the
    /// absorbing full state maps to itself.
    pub fn transition_matrix(&self) -> Vec<Vec<f64>> {
        let ks = self.space.space();
        let m = ks.len();
        let mut matrix = vec![vec![0.0; m]; m];
        for (i, row) in matrix.iter_mut().enumerate() {
            let bits = ks.bits_at(i);
            if bits.count() == ks.domain().len() {
                row[i] = 1.0;
                continue;
            }
            let fringe = ks.outer_fringe_indices(bits);
            let total: f64 = fringe.iter().map(|&q| self.rates.rate_at(q)).sum();
            for &q in &fringe {
                let j = ks
                    .index_of_bits(&bits.with(q))
                    .expect("outer fringe targets are states");
                row[j] = self.rates.rate_at(q) / total;
            }
        }
        matrix
    }

    /// Expected steps to mastery from every state, aligned with the
    /// space's canonical state order; Q maps to 0.
    ///
    /// Solves (I − T)x = 𝟙 over the transient sub-matrix with partially
    /// pivoted Gaussian elimination.
    pub fn expected_steps(&self) -> LearnResult<Vec<f64>> {
        let ks = self.space.space();
        let m = ks.len();
        let full = ks
            .index_of_bits(&crate::bits::StateBits::full(ks.domain().len()))
            .expect("a knowledge space contains Q");

        let transient: Vec<usize> = (0..m).filter(|&i| i != full).collect();
        let position: BTreeMap<usize, usize> = transient
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, pos))
            .collect();
        let t = transient.len();

        // I - T over the transient states.
        let mut a = vec![vec![0.0; t]; t];
        for (pos, &i) in transient.iter().enumerate() {
            a[pos][pos] = 1.0;
            for (target, p) in self.transition_probs_at(i) {
                let j = ks
                    .index_of_state(&target)
                    .expect("transition targets are states");
                if let Some(&tpos) = position.get(&j) {
                    a[pos][tpos] -= p;
                }
            }
        }
        let x = solve_linear(a, vec![1.0; t])?;

        let mut expected = vec![0.0; m];
        for (pos, &i) in transient.iter().enumerate() {
            expected[i] = x[pos];
        }
        Ok(expected)
    }

    /// Expected steps to mastery from one state.
    pub fn expected_steps_from(&self, state: &KnowledgeState) -> LearnResult<f64> {
        let ks = self.space.space();
        let index = ks
            .index_of_state(state)
            .ok_or_else(|| SpaceError::UnknownState {
                state: state.ids().join(", "),
            })?;
        Ok(self.expected_steps()?[index])
    }

    /// Walk the chain from `start` (default ∅) until absorption at Q or
    /// the step cap.
    pub fn simulate_trajectory<R: Rng>(
        &self,
        start: Option<&KnowledgeState>,
        max_steps: usize,
        rng: &mut R,
    ) -> LearnResult<Trajectory> {
        let ks = self.space.space();
        let empty = KnowledgeState::empty();
        let start = start.unwrap_or(&empty);
        let mut index = ks
            .index_of_state(start)
            .ok_or_else(|| SpaceError::UnknownState {
                state: start.ids().join(", "),
            })?;

        let n = ks.domain().len();
        let mut states = vec![ks.state_at(index).clone()];
        let mut reached_mastery = ks.bits_at(index).count() == n;
        for _ in 0..max_steps {
            if reached_mastery {
                break;
            }
            let bits = ks.bits_at(index);
            let fringe = ks.outer_fringe_indices(bits);
            let total: f64 = fringe.iter().map(|&q| self.rates.rate_at(q)).sum();
            let mut draw = rng.gen::<f64>() * total;
            let mut chosen = *fringe.last().expect("non-full state has an outer fringe");
            for &q in &fringe {
                draw -= self.rates.rate_at(q);
                if draw <= 0.0 {
                    chosen = q;
                    break;
                }
            }
            index = ks
                .index_of_bits(&bits.with(chosen))
                .expect("outer fringe targets are states");
            states.push(ks.state_at(index).clone());
            reached_mastery = ks.bits_at(index).count() == n;
        }
        Ok(Trajectory {
            states,
            reached_mastery,
        })
    }
}

impl std::fmt::Debug for LearningModel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningModel")
            .field("states", &self.space.len())
            .finish()
    }
}

/// Solve `a · x = b` with partially pivoted Gaussian elimination.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> LearnResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("column range is non-empty");
        if a[pivot][col].abs() < PIVOT_FLOOR {
            return Err(LearnError::SingularFundamentalMatrix);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor != 0.0 {
                for k in col..n {
                    a[row][k] -= factor * a[col][k];
                }
                b[row] -= factor * b[col];
            }
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}

//! Probabilistic assessment under the Basic Local Independence Model.
//!
//! The BLIM attaches to every item q a slip probability β_q (mastered but
//! answered wrong) and a lucky-guess probability η_q (not mastered but
//! answered right). Responses are locally independent given the true state,
//! so a belief distribution over states updates one Bayesian factor per
//! observation.
//!
//! For state K and item q:
//!
//! ```text
//! P(correct | q ∈ K) = 1 - β_q        P(correct | q ∉ K) = η_q
//! ```

pub mod session;
pub mod simulate;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bits::StateBits;
use crate::domain::{Domain, KnowledgeState};
use crate::error::{AssessError, AssessResult};

/// Belief updates switch to log space above this many states to keep
/// repeated small factors from underflowing.
const LOG_SPACE_THRESHOLD: usize = 64;

/// Probability sums must match 1 within this tolerance.
const PROB_SUM_TOLERANCE: f64 = 1e-6;

/// Per-item slip (β) and lucky-guess (η) probabilities, both in [0, 0.5).
pub struct BlimParams {
    domain: Arc<Domain>,
    beta: Vec<f64>,
    eta: Vec<f64>,
}

impl BlimParams {
    /// Build parameters from per-item maps keyed by id.
    ///
    /// The key set of each map must equal the domain's id set, and every
    /// value must lie in [0, 0.5).
    pub fn new(
        domain: Arc<Domain>,
        beta: BTreeMap<String, f64>,
        eta: BTreeMap<String, f64>,
    ) -> AssessResult<Self> {
        let beta = Self::collect("beta", &domain, beta)?;
        let eta = Self::collect("eta", &domain, eta)?;
        Ok(Self { domain, beta, eta })
    }

    /// Uniform parameters: the same β and η for every item.
    pub fn uniform(domain: Arc<Domain>, beta: f64, eta: f64) -> AssessResult<Self> {
        let beta_map = domain
            .ids()
            .map(|id| (id.to_owned(), beta))
            .collect::<BTreeMap<_, _>>();
        let eta_map = domain
            .ids()
            .map(|id| (id.to_owned(), eta))
            .collect::<BTreeMap<_, _>>();
        Self::new(domain, beta_map, eta_map)
    }

    fn collect(
        param: &'static str,
        domain: &Arc<Domain>,
        map: BTreeMap<String, f64>,
    ) -> AssessResult<Vec<f64>> {
        for id in map.keys() {
            if !domain.contains(id) {
                return Err(crate::error::DomainError::UnknownItem { id: id.clone() }.into());
            }
        }
        let mut values = Vec::with_capacity(domain.len());
        for id in domain.ids() {
            let value = *map
                .get(id)
                .ok_or_else(|| AssessError::MissingParameter {
                    param,
                    id: id.to_owned(),
                })?;
            if !(0.0..0.5).contains(&value) {
                return Err(AssessError::ParameterOutOfRange {
                    param,
                    id: id.to_owned(),
                    value,
                });
            }
            values.push(value);
        }
        Ok(values)
    }

    /// The domain these parameters cover.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// β for an item id.
    pub fn beta(&self, id: &str) -> Option<f64> {
        self.domain.index_of(id).map(|i| self.beta[i])
    }

    /// η for an item id.
    pub fn eta(&self, id: &str) -> Option<f64> {
        self.domain.index_of(id).map(|i| self.eta[i])
    }

    /// P(correct response to the item at `index` | true state `bits`).
    pub(crate) fn p_correct_at(&self, index: usize, bits: &StateBits) -> f64 {
        if bits.contains(index) {
            1.0 - self.beta[index]
        } else {
            self.eta[index]
        }
    }

    /// P(response `correct` to the item at `index` | true state `bits`).
    pub(crate) fn likelihood_at(&self, index: usize, bits: &StateBits, correct: bool) -> f64 {
        let p = self.p_correct_at(index, bits);
        if correct {
            p
        } else {
            1.0 - p
        }
    }
}

impl std::fmt::Debug for BlimParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlimParams")
            .field("items", &self.domain.len())
            .finish()
    }
}

/// A probability distribution π over an ordered sequence of states.
///
/// Immutable: a Bayesian update yields a new `BeliefState`.
#[derive(Clone)]
pub struct BeliefState {
    domain: Arc<Domain>,
    states: Vec<KnowledgeState>,
    bits: Vec<StateBits>,
    probs: Vec<f64>,
}

impl BeliefState {
    /// Build a belief over the given states with explicit probabilities.
    ///
    /// States are reordered canonically; probabilities follow their state.
    /// Fails unless the vector is non-negative and sums to 1 within 1e-6.
    pub fn new(
        domain: Arc<Domain>,
        states: Vec<KnowledgeState>,
        probs: Vec<f64>,
    ) -> AssessResult<Self> {
        if states.is_empty() {
            return Err(AssessError::InvalidBelief {
                reason: "no states".into(),
            });
        }
        if states.len() != probs.len() {
            return Err(AssessError::InvalidBelief {
                reason: format!("{} states but {} probabilities", states.len(), probs.len()),
            });
        }
        if let Some(p) = probs.iter().find(|p| **p < 0.0 || !p.is_finite()) {
            return Err(AssessError::InvalidBelief {
                reason: format!("negative or non-finite probability {p}"),
            });
        }
        let total: f64 = probs.iter().sum();
        if (total - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(AssessError::InvalidBelief {
                reason: format!("probabilities sum to {total}"),
            });
        }

        let mut keyed: Vec<(StateBits, KnowledgeState, f64)> = Vec::with_capacity(states.len());
        for (state, p) in states.into_iter().zip(probs) {
            let bits = domain.state_bits(&state)?;
            keyed.push((bits, state, p));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut states = Vec::with_capacity(keyed.len());
        let mut bits = Vec::with_capacity(keyed.len());
        let mut probs = Vec::with_capacity(keyed.len());
        for (b, s, p) in keyed {
            bits.push(b);
            states.push(s);
            probs.push(p);
        }
        Ok(Self {
            domain,
            states,
            bits,
            probs,
        })
    }

    /// Uniform prior over the given states.
    pub fn uniform(domain: Arc<Domain>, states: Vec<KnowledgeState>) -> AssessResult<Self> {
        let n = states.len();
        if n == 0 {
            return Err(AssessError::InvalidBelief {
                reason: "no states".into(),
            });
        }
        let probs = vec![1.0 / n as f64; n];
        Self::new(domain, states, probs)
    }

    /// The states, in canonical order.
    pub fn states(&self) -> &[KnowledgeState] {
        &self.states
    }

    /// The probability vector, aligned with [`BeliefState::states`].
    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    /// Number of states carrying belief mass.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// A belief always covers at least one state.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Shannon entropy H(π) in bits, with 0·log 0 = 0.
    pub fn entropy(&self) -> f64 {
        self.probs
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.log2())
            .sum()
    }

    /// Maximum a posteriori state; ties resolve to the canonically
    /// smallest state.
    pub fn map_state(&self) -> &KnowledgeState {
        let mut best = 0;
        for i in 1..self.probs.len() {
            if self.probs[i] > self.probs[best] {
                best = i;
            }
        }
        &self.states[best]
    }

    /// π(K) for a given state, 0 when K carries no mass.
    pub fn probability_of(&self, state: &KnowledgeState) -> f64 {
        match self.domain.state_bits(state) {
            Ok(bits) => self
                .bits
                .iter()
                .position(|b| *b == bits)
                .map_or(0.0, |i| self.probs[i]),
            Err(_) => 0.0,
        }
    }

    /// Bayesian update on observing a response to one item.
    ///
    /// Multiplies each π(K) by the response likelihood and renormalises.
    /// Performed in log space above 64 states. A zero normaliser (possible
    /// only with β or η equal to 0) is an inconsistent observation.
    pub fn update(
        &self,
        params: &BlimParams,
        item_id: &str,
        correct: bool,
    ) -> AssessResult<BeliefState> {
        let index = self
            .domain
            .index_of(item_id)
            .ok_or_else(|| crate::error::DomainError::UnknownItem {
                id: item_id.to_owned(),
            })?;

        let probs = if self.len() > LOG_SPACE_THRESHOLD {
            self.update_log_space(params, index, correct)
        } else {
            self.update_linear(params, index, correct)
        };
        let probs = probs.ok_or_else(|| AssessError::InconsistentObservation {
            id: item_id.to_owned(),
        })?;

        Ok(Self {
            domain: Arc::clone(&self.domain),
            states: self.states.clone(),
            bits: self.bits.clone(),
            probs,
        })
    }

    fn update_linear(&self, params: &BlimParams, index: usize, correct: bool) -> Option<Vec<f64>> {
        let mut posterior: Vec<f64> = self
            .probs
            .iter()
            .zip(&self.bits)
            .map(|(p, bits)| p * params.likelihood_at(index, bits, correct))
            .collect();
        let total: f64 = posterior.iter().sum();
        if total <= 0.0 {
            return None;
        }
        for p in &mut posterior {
            *p /= total;
        }
        Some(posterior)
    }

    fn update_log_space(
        &self,
        params: &BlimParams,
        index: usize,
        correct: bool,
    ) -> Option<Vec<f64>> {
        let log_posterior: Vec<f64> = self
            .probs
            .iter()
            .zip(&self.bits)
            .map(|(p, bits)| {
                let like = params.likelihood_at(index, bits, correct);
                if *p > 0.0 && like > 0.0 {
                    p.ln() + like.ln()
                } else {
                    f64::NEG_INFINITY
                }
            })
            .collect();
        let max = log_posterior.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return None;
        }
        let unnormalised: Vec<f64> = log_posterior.iter().map(|lp| (lp - max).exp()).collect();
        let total: f64 = unnormalised.iter().sum();
        Some(unnormalised.into_iter().map(|p| p / total).collect())
    }

    /// Marginal probability of a correct response to `item_id` under π.
    pub fn p_correct_marginal(&self, params: &BlimParams, item_id: &str) -> AssessResult<f64> {
        let index = self
            .domain
            .index_of(item_id)
            .ok_or_else(|| crate::error::DomainError::UnknownItem {
                id: item_id.to_owned(),
            })?;
        Ok(self
            .probs
            .iter()
            .zip(&self.bits)
            .map(|(p, bits)| p * params.p_correct_at(index, bits))
            .sum())
    }

    /// Expected entropy reduction from asking `item_id`:
    ///
    /// I(q; π) = H(π) − p₁·H(π | correct) − p₀·H(π | incorrect).
    pub fn information_gain(&self, params: &BlimParams, item_id: &str) -> AssessResult<f64> {
        let p_correct = self.p_correct_marginal(params, item_id)?;
        let p_incorrect = 1.0 - p_correct;

        let mut expected = 0.0;
        if p_correct > 0.0 {
            expected += p_correct * self.update(params, item_id, true)?.entropy();
        }
        if p_incorrect > 0.0 {
            expected += p_incorrect * self.update(params, item_id, false)?.entropy();
        }
        Ok(self.entropy() - expected)
    }

    pub(crate) fn bits(&self) -> &[StateBits] {
        &self.bits
    }
}

impl std::fmt::Debug for BeliefState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeliefState")
            .field("states", &self.states.len())
            .field("entropy", &self.entropy())
            .finish()
    }
}

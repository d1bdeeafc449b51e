//! Optimal teaching and learning-rate tuning.
//!
//! Teaching plans solve the Bellman equation V*(Q) = 0,
//! V*(K) = 1 + min over the outer fringe of V*(K ∪ {q}), by backward
//! induction over cardinality-descending states. Rate tuning maximises the
//! Markov-chain log-likelihood of observed trajectories by fixed-point
//! iteration.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{Domain, KnowledgeState};
use crate::error::{LearnError, LearnResult, SpaceError};
use crate::space::LearningSpace;

use super::LearningRate;

/// One step of a teaching plan.
#[derive(Debug, Clone, Serialize)]
pub struct TeachingStep {
    /// The item taught at this step.
    pub item_id: String,
    /// State before the step, as sorted ids.
    pub from_ids: Vec<String>,
    /// State after the step, as sorted ids.
    pub to_ids: Vec<String>,
    /// Expected steps remaining before this step, V*(from).
    pub expected_remaining: f64,
}

/// An optimal teaching sequence from a start state to mastery.
#[derive(Debug, Clone, Serialize)]
pub struct TeachingPlan {
    /// Steps in teaching order.
    pub steps: Vec<TeachingStep>,
    /// V*(start): length of the plan.
    pub total_expected_steps: f64,
}

/// Compute an optimal teaching plan by value iteration.
///
/// Among items with equal value, a higher learning rate wins; remaining
/// ties resolve in item-id order, so plans are deterministic.
pub fn optimal_teaching_sequence(
    space: &LearningSpace,
    rates: Option<&LearningRate>,
    start: Option<&KnowledgeState>,
) -> LearnResult<TeachingPlan> {
    if let Some(rates) = rates {
        if !space.domain().same_items(rates.domain()) {
            return Err(LearnError::DomainMismatch);
        }
    }
    let ks = space.space();
    let empty = KnowledgeState::empty();
    let start = start.unwrap_or(&empty);
    let start_index = ks
        .index_of_state(start)
        .ok_or_else(|| SpaceError::UnknownState {
            state: start.ids().join(", "),
        })?;

    let m = ks.len();
    let n = ks.domain().len();
    let mut value = vec![0.0f64; m];
    let mut policy: Vec<Option<usize>> = vec![None; m];

    // Backward induction: canonical order is ascending cardinality, so the
    // reverse sweep sees every successor before its predecessors.
    for i in (0..m).rev() {
        let bits = ks.bits_at(i);
        if bits.count() == n {
            continue;
        }
        let mut best: Option<(usize, f64, f64)> = None;
        for q in ks.outer_fringe_indices(bits) {
            let upper = ks
                .index_of_bits(&bits.with(q))
                .expect("outer fringe targets are states");
            let candidate = 1.0 + value[upper];
            let rate = rates.map_or(0.0, |r| r.rate_at(q));
            let take = match best {
                None => true,
                Some((_, best_value, best_rate)) => {
                    candidate < best_value || (candidate == best_value && rate > best_rate)
                }
            };
            if take {
                best = Some((q, candidate, rate));
            }
        }
        let (item, v, _) =
            best.expect("every non-full state in a learning space has an outer fringe");
        value[i] = v;
        policy[i] = Some(item);
    }

    // Follow the greedy policy from the start state.
    let mut steps = Vec::new();
    let mut current = start_index;
    while let Some(item) = policy[current] {
        let bits = ks.bits_at(current);
        let next = ks
            .index_of_bits(&bits.with(item))
            .expect("policy follows cover edges");
        steps.push(TeachingStep {
            item_id: ks.domain().item_at(item).id().to_owned(),
            from_ids: ks.state_at(current).ids(),
            to_ids: ks.state_at(next).ids(),
            expected_remaining: value[current],
        });
        current = next;
    }

    Ok(TeachingPlan {
        steps,
        total_expected_steps: value[start_index],
    })
}

/// Observed learning trajectories for rate tuning.
///
/// Each trajectory is a state sequence whose consecutive pairs are covers:
/// every step adds exactly one item.
#[derive(Debug)]
pub struct TrajectoryData {
    domain: Arc<Domain>,
    trajectories: Vec<Vec<KnowledgeState>>,
}

impl TrajectoryData {
    /// Validate and wrap observed trajectories.
    pub fn new(
        domain: Arc<Domain>,
        trajectories: Vec<Vec<KnowledgeState>>,
    ) -> LearnResult<Self> {
        for (index, trajectory) in trajectories.iter().enumerate() {
            for state in trajectory {
                domain.state_bits(state)?;
            }
            for (step, pair) in trajectory.windows(2).enumerate() {
                let added = pair[1].difference(&pair[0]);
                if !pair[0].is_subset_of(&pair[1]) || added.len() != 1 {
                    return Err(LearnError::NotACoverStep {
                        index,
                        step,
                        reason: format!("{} -> {}", pair[0], pair[1]),
                    });
                }
            }
        }
        Ok(Self {
            domain,
            trajectories,
        })
    }

    /// The domain the trajectories move over.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Number of trajectories.
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    /// True when no trajectory was provided.
    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }
}

/// Knobs for rate tuning.
#[derive(Debug, Clone)]
pub struct TuneConfig {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Convergence threshold on the log-likelihood change.
    pub tolerance: f64,
    /// Starting rate for every item.
    pub initial_rate: f64,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-6,
            initial_rate: 1.0,
        }
    }
}

/// Result of rate tuning.
pub struct TunedRates {
    /// Fitted rates, normalised to mean 1.
    pub rates: LearningRate,
    /// Final trajectory log-likelihood.
    pub log_likelihood: f64,
    /// Iterations actually run.
    pub iterations: usize,
    /// Whether the tolerance was reached before the iteration cap.
    pub converged: bool,
}

/// Fit per-item rates to observed trajectories by maximum likelihood.
///
/// Maximises Σ log(λ_q / Σ_{q' ∈ K^O} λ_{q'}) over all observed
/// transitions with the fixed-point update
/// λ_q ← n_q / Σ_{K^O ∋ q} (1 / Σ λ), starting from uniform rates. The
/// reported rates are normalised to mean 1.
pub fn tune_learning_rates(
    space: &LearningSpace,
    data: &TrajectoryData,
    config: &TuneConfig,
) -> LearnResult<TunedRates> {
    if !space.domain().same_items(data.domain()) {
        return Err(LearnError::DomainMismatch);
    }
    let ks = space.space();
    let n = ks.domain().len();

    // Collapse trajectories into transitions: (outer fringe, acquired).
    // Transitions whose source state is outside the space carry no
    // information about the chain and are skipped.
    let mut transitions: Vec<(Vec<usize>, usize)> = Vec::new();
    for trajectory in &data.trajectories {
        for pair in trajectory.windows(2) {
            let Some(index) = ks.index_of_state(&pair[0]) else {
                continue;
            };
            let fringe = ks.outer_fringe_indices(ks.bits_at(index));
            let added = pair[1].difference(&pair[0]);
            let acquired = added
                .iter()
                .next()
                .and_then(|id| ks.domain().index_of(id))
                .expect("cover steps add one domain item");
            if fringe.contains(&acquired) {
                transitions.push((fringe, acquired));
            }
        }
    }

    let mut acquire_count = vec![0.0f64; n];
    for (_, acquired) in &transitions {
        acquire_count[*acquired] += 1.0;
    }

    let mut rates = vec![config.initial_rate; n];
    let mut prev_ll = f64::NEG_INFINITY;
    let mut ll = 0.0;
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 1..=config.max_iterations {
        iterations = iteration;
        let mut exposure = vec![0.0f64; n];
        ll = 0.0;
        for (fringe, acquired) in &transitions {
            let total: f64 = fringe.iter().map(|&q| rates[q]).sum();
            ll += (rates[*acquired] / total).max(1e-300).ln();
            let inverse = 1.0 / total;
            for &q in fringe {
                exposure[q] += inverse;
            }
        }
        if iteration > 1 && (ll - prev_ll).abs() < config.tolerance {
            converged = true;
            break;
        }
        prev_ll = ll;
        for q in 0..n {
            rates[q] = if exposure[q] > 0.0 {
                (acquire_count[q] / exposure[q]).max(1e-10)
            } else {
                config.initial_rate
            };
        }
    }

    // Rate scale is unidentifiable; report with mean 1.
    let mean: f64 = rates.iter().sum::<f64>() / n as f64;
    let map = ks
        .domain()
        .ids()
        .enumerate()
        .map(|(q, id)| (id.to_owned(), (rates[q] / mean).max(1e-10)))
        .collect();
    let rates = LearningRate::new(Arc::clone(ks.domain()), map)?;

    tracing::debug!(
        iterations,
        converged,
        log_likelihood = ll,
        "rate tuning finished"
    );
    Ok(TunedRates {
        rates,
        log_likelihood: ll,
        iterations,
        converged,
    })
}

//! BLIM parameter estimation via Expectation-Maximization.
//!
//! Given observed response patterns and a state family, the EM loop
//! alternates posterior responsibilities (E-step, in log space via
//! log-sum-exp) with closed-form updates of π, β, and η (M-step). The
//! log-likelihood is non-decreasing; a drop beyond tolerance is numerical
//! breakdown and aborts the fit. Multi-restart calibration repeats the fit
//! from seeded random initialisations and keeps the best restart, flagging
//! identifiability from the across-restart spread.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::Rng;

use crate::assess::{BeliefState, BlimParams};
use crate::bits::StateBits;
use crate::domain::{Domain, KnowledgeState};
use crate::error::{AssessError, EstimateError, EstimateResult};

/// Parameters are clamped into [PARAM_FLOOR, 0.5 - PARAM_FLOOR] during
/// iteration so logarithms stay finite and the model identifiable.
const PARAM_FLOOR: f64 = 1e-6;

/// Probability floor for pattern probabilities in G².
const PROB_FLOOR: f64 = 1e-15;

/// A collection of observed response patterns over a domain.
///
/// Each pattern maps every item id of the domain to a boolean (true =
/// correct). Stored row-major over the id-sorted item order.
pub struct ResponseData {
    domain: Arc<Domain>,
    rows: Vec<Vec<bool>>,
}

impl ResponseData {
    /// Build from per-learner maps. Every map's key set must equal the
    /// domain's id set, and at least one pattern is required.
    pub fn new(
        domain: Arc<Domain>,
        patterns: Vec<BTreeMap<String, bool>>,
    ) -> EstimateResult<Self> {
        if patterns.is_empty() {
            return Err(EstimateError::EmptyResponseData);
        }
        let mut rows = Vec::with_capacity(patterns.len());
        for (index, pattern) in patterns.iter().enumerate() {
            for key in pattern.keys() {
                if !domain.contains(key) {
                    return Err(EstimateError::PatternMismatch {
                        index,
                        reason: format!("unknown item {key:?}"),
                    });
                }
            }
            let mut row = Vec::with_capacity(domain.len());
            for id in domain.ids() {
                let value = pattern.get(id).ok_or_else(|| EstimateError::PatternMismatch {
                    index,
                    reason: format!("missing item {id:?}"),
                })?;
                row.push(*value);
            }
            rows.push(row);
        }
        Ok(Self { domain, rows })
    }

    /// The domain the patterns cover.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Number of patterns (learners).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Construction guarantees at least one pattern.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// One learner's responses in id-sorted item order.
    pub fn row(&self, index: usize) -> &[bool] {
        &self.rows[index]
    }

    /// Fraction of incorrect responses to an item, by id.
    pub fn error_rate(&self, id: &str) -> Option<f64> {
        let col = self.domain.index_of(id)?;
        let wrong = self.rows.iter().filter(|row| !row[col]).count();
        Some(wrong as f64 / self.rows.len() as f64)
    }
}

impl std::fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseData")
            .field("patterns", &self.rows.len())
            .field("items", &self.domain.len())
            .finish()
    }
}

/// Knobs for a single EM fit.
#[derive(Debug, Clone)]
pub struct EmConfig {
    /// Iteration cap; exceeding it returns an unconverged estimate.
    pub max_iterations: usize,
    /// Convergence threshold on the log-likelihood change.
    pub tolerance: f64,
    /// Initial slip probability for every item.
    pub initial_beta: f64,
    /// Initial guess probability for every item.
    pub initial_eta: f64,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-6,
            initial_beta: 0.1,
            initial_eta: 0.1,
        }
    }
}

/// Result of an EM fit.
pub struct BlimEstimate {
    /// Fitted slip/guess parameters.
    pub params: BlimParams,
    /// Estimated state distribution π̂.
    pub belief: BeliefState,
    /// Final log-likelihood of the data under the fit.
    pub log_likelihood: f64,
    /// Iterations actually run.
    pub iterations: usize,
    /// Whether the tolerance was reached before the iteration cap.
    pub converged: bool,
}

impl std::fmt::Debug for BlimEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlimEstimate")
            .field("log_likelihood", &self.log_likelihood)
            .field("iterations", &self.iterations)
            .field("converged", &self.converged)
            .finish()
    }
}

/// Fit BLIM parameters to response data with EM.
///
/// Hitting the iteration cap returns a partial result with
/// `converged == false` rather than an error; a decreasing log-likelihood
/// returns [`EstimateError::EmDiverged`].
pub fn em_fit(
    domain: &Arc<Domain>,
    states: &[KnowledgeState],
    data: &ResponseData,
    config: &EmConfig,
) -> EstimateResult<BlimEstimate> {
    if !data.domain().same_items(domain) {
        return Err(AssessError::DomainMismatch.into());
    }
    let n_items = domain.len();
    let n_learners = data.len();

    // Canonically ordered membership bits; the belief is built over the
    // same order at the end.
    let mut keyed: Vec<(StateBits, KnowledgeState)> = states
        .iter()
        .map(|s| Ok((domain.state_bits(s)?, s.clone())))
        .collect::<Result<_, crate::error::DomainError>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    let membership: Vec<StateBits> = keyed.iter().map(|(b, _)| b.clone()).collect();
    let ordered_states: Vec<KnowledgeState> = keyed.into_iter().map(|(_, s)| s).collect();
    let n_states = membership.len();

    let clamp = |v: f64| v.clamp(PARAM_FLOOR, 0.5 - PARAM_FLOOR);
    let mut beta = vec![clamp(config.initial_beta); n_items];
    let mut eta = vec![clamp(config.initial_eta); n_items];
    let mut pi = vec![1.0 / n_states as f64; n_states];

    let mut prev_ll = f64::NEG_INFINITY;
    let mut ll = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 1..=config.max_iterations {
        iterations = iteration;

        // E-step: responsibilities w[j][k] = P(K_k | R_j, θ).
        let log_b: Vec<f64> = beta.iter().map(|b| b.ln()).collect();
        let log_1mb: Vec<f64> = beta.iter().map(|b| (1.0 - b).ln()).collect();
        let log_e: Vec<f64> = eta.iter().map(|e| e.ln()).collect();
        let log_1me: Vec<f64> = eta.iter().map(|e| (1.0 - e).ln()).collect();
        let log_pi: Vec<f64> = pi.iter().map(|p| p.max(PROB_FLOOR).ln()).collect();

        let mut w = vec![vec![0.0; n_states]; n_learners];
        ll = 0.0;
        for (j, row) in data.rows.iter().enumerate() {
            // log P(R_j | K) = Σ_q out-of-state term, corrected per member.
            let mut base = 0.0;
            let mut diff = vec![0.0; n_items];
            for q in 0..n_items {
                let (log_in, log_out) = if row[q] {
                    (log_1mb[q], log_e[q])
                } else {
                    (log_b[q], log_1me[q])
                };
                base += log_out;
                diff[q] = log_in - log_out;
            }
            let log_joint: Vec<f64> = membership
                .iter()
                .enumerate()
                .map(|(k, bits)| {
                    base + bits.iter_ones().map(|q| diff[q]).sum::<f64>() + log_pi[k]
                })
                .collect();
            let log_z = log_sum_exp(&log_joint);
            ll += log_z;
            for (k, lj) in log_joint.iter().enumerate() {
                w[j][k] = (lj - log_z).exp();
            }
        }

        if iteration > 1 {
            if ll < prev_ll - config.tolerance {
                return Err(EstimateError::EmDiverged {
                    iteration,
                    previous: prev_ll,
                    current: ll,
                });
            }
            if (ll - prev_ll).abs() < config.tolerance {
                converged = true;
                break;
            }
        }
        prev_ll = ll;
        tracing::trace!(iteration, log_likelihood = ll, "em iteration");

        // M-step: π, then β and η from in-state responsibility mass.
        let mut w_in = vec![vec![0.0; n_items]; n_learners];
        for (j, w_j) in w.iter().enumerate() {
            for (k, bits) in membership.iter().enumerate() {
                let weight = w_j[k];
                if weight > 0.0 {
                    for q in bits.iter_ones() {
                        w_in[j][q] += weight;
                    }
                }
            }
        }
        for (k, p) in pi.iter_mut().enumerate() {
            *p = w.iter().map(|w_j| w_j[k]).sum::<f64>() / n_learners as f64;
        }
        let pi_total: f64 = pi.iter().map(|p| p.max(PROB_FLOOR)).sum();
        for p in &mut pi {
            *p = p.max(PROB_FLOOR) / pi_total;
        }
        for q in 0..n_items {
            let mut beta_num = 0.0;
            let mut beta_den = 0.0;
            let mut eta_num = 0.0;
            let mut eta_den = 0.0;
            for (j, row) in data.rows.iter().enumerate() {
                let in_mass = w_in[j][q];
                let out_mass = 1.0 - in_mass;
                if !row[q] {
                    beta_num += in_mass;
                } else {
                    eta_num += out_mass;
                }
                beta_den += in_mass;
                eta_den += out_mass;
            }
            beta[q] = if beta_den > PARAM_FLOOR {
                clamp(beta_num / beta_den)
            } else {
                PARAM_FLOOR
            };
            eta[q] = if eta_den > PARAM_FLOOR {
                clamp(eta_num / eta_den)
            } else {
                PARAM_FLOOR
            };
        }
    }

    let beta_map: BTreeMap<String, f64> = domain
        .ids()
        .enumerate()
        .map(|(q, id)| (id.to_owned(), beta[q]))
        .collect();
    let eta_map: BTreeMap<String, f64> = domain
        .ids()
        .enumerate()
        .map(|(q, id)| (id.to_owned(), eta[q]))
        .collect();
    let params = BlimParams::new(Arc::clone(domain), beta_map, eta_map)?;

    let pi_total: f64 = pi.iter().sum();
    let pi: Vec<f64> = pi.iter().map(|p| p / pi_total).collect();
    let belief = BeliefState::new(Arc::clone(domain), ordered_states, pi)?;

    tracing::debug!(
        iterations,
        converged,
        log_likelihood = ll,
        "em fit finished"
    );
    Ok(BlimEstimate {
        params,
        belief,
        log_likelihood: ll,
        iterations,
        converged,
    })
}

/// G² (likelihood-ratio) goodness-of-fit statistic for a fitted BLIM.
#[derive(Debug, Clone)]
pub struct GoodnessOfFit {
    /// G² = 2 Σ_R N_R log(N_R / (N·P̂(R))); lower is better.
    pub g_squared: f64,
    /// (distinct patterns − 1) − (|𝒦| − 1 + 2n), floored at 0.
    pub degrees_of_freedom: usize,
    /// Number of distinct observed patterns.
    pub n_patterns: usize,
    /// Number of observations.
    pub n_observations: usize,
}

/// Compute G² for an estimate against the data it was fitted on.
pub fn goodness_of_fit(
    data: &ResponseData,
    estimate: &BlimEstimate,
) -> EstimateResult<GoodnessOfFit> {
    if !data.domain().same_items(estimate.params.domain()) {
        return Err(AssessError::DomainMismatch.into());
    }
    let n_obs = data.len();
    let n_items = data.domain().len();

    let mut counts: HashMap<&[bool], usize> = HashMap::new();
    for row in &data.rows {
        *counts.entry(row.as_slice()).or_insert(0) += 1;
    }

    let mut g_squared = 0.0;
    for (row, count) in &counts {
        let predicted = pattern_probability(row, estimate).max(PROB_FLOOR);
        let observed = *count as f64 / n_obs as f64;
        g_squared += 2.0 * *count as f64 * (observed / predicted).ln();
    }

    let n_states = estimate.belief.len();
    let free_parameters = (n_states - 1) + 2 * n_items;
    let degrees_of_freedom = (counts.len() - 1).saturating_sub(free_parameters);

    Ok(GoodnessOfFit {
        g_squared,
        degrees_of_freedom,
        n_patterns: counts.len(),
        n_observations: n_obs,
    })
}

/// P̂(R) = Σ_K π̂(K) · P(R | K) for one response row.
fn pattern_probability(row: &[bool], estimate: &BlimEstimate) -> f64 {
    estimate
        .belief
        .probabilities()
        .iter()
        .zip(estimate.belief.bits())
        .map(|(pi_k, bits)| {
            if *pi_k < PROB_FLOOR {
                return 0.0;
            }
            let log_p: f64 = row
                .iter()
                .enumerate()
                .map(|(q, r)| estimate.params.likelihood_at(q, bits, *r).max(PROB_FLOOR).ln())
                .sum();
            pi_k * log_p.exp()
        })
        .sum()
}

/// Knobs for multi-restart calibration.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Number of EM restarts from random initialisations.
    pub restarts: usize,
    /// Identifiability threshold on across-restart standard deviations.
    pub identifiability_tol: f64,
    /// Per-restart EM configuration; initial β/η are overridden per run.
    pub em: EmConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            restarts: 5,
            identifiability_tol: 0.1,
            em: EmConfig::default(),
        }
    }
}

/// Calibrated parameters for one item.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ItemCalibration {
    /// The item id.
    pub item_id: String,
    /// Fitted slip probability.
    pub beta: f64,
    /// Fitted guess probability.
    pub eta: f64,
}

/// Result of multi-restart calibration.
pub struct CalibrationResult {
    /// The best-likelihood estimate across restarts.
    pub estimate: BlimEstimate,
    /// Per-item fitted parameters of the best restart, in id order.
    pub item_calibrations: Vec<ItemCalibration>,
    /// Restarts attempted.
    pub restarts: usize,
    /// True iff the across-restart standard deviation of every β and η is
    /// below the threshold (Heller & Wickelmaier, 2013).
    pub identifiable: bool,
}

/// Run `restarts` EM fits from random initialisations and keep the best.
///
/// A restart that diverges is dropped; the calibration fails only when
/// every restart does. The caller's RNG drives the initialisations, so a
/// seeded calibration is reproducible.
pub fn calibrate_parameters<R: Rng>(
    domain: &Arc<Domain>,
    states: &[KnowledgeState],
    data: &ResponseData,
    config: &CalibrationConfig,
    rng: &mut R,
) -> EstimateResult<CalibrationResult> {
    let mut best: Option<BlimEstimate> = None;
    let mut all_beta: Vec<Vec<f64>> = Vec::new();
    let mut all_eta: Vec<Vec<f64>> = Vec::new();

    for restart in 0..config.restarts {
        let em = EmConfig {
            initial_beta: rng.gen_range(0.05..0.2),
            initial_eta: rng.gen_range(0.05..0.2),
            ..config.em.clone()
        };
        let estimate = match em_fit(domain, states, data, &em) {
            Ok(estimate) => estimate,
            Err(EstimateError::EmDiverged { .. }) => {
                tracing::warn!(restart, "em restart diverged, dropping");
                continue;
            }
            Err(other) => return Err(other),
        };

        all_beta.push(
            domain
                .ids()
                .map(|id| estimate.params.beta(id).expect("params cover the domain"))
                .collect(),
        );
        all_eta.push(
            domain
                .ids()
                .map(|id| estimate.params.eta(id).expect("params cover the domain"))
                .collect(),
        );

        let better = best
            .as_ref()
            .map_or(true, |b| estimate.log_likelihood > b.log_likelihood);
        if better {
            best = Some(estimate);
        }
    }

    let estimate = best.ok_or(EstimateError::NoRestartSucceeded {
        restarts: config.restarts,
    })?;

    let identifiable = (0..domain.len()).all(|q| {
        std_dev(all_beta.iter().map(|b| b[q])) <= config.identifiability_tol
            && std_dev(all_eta.iter().map(|e| e[q])) <= config.identifiability_tol
    });

    let item_calibrations = domain
        .ids()
        .map(|id| ItemCalibration {
            item_id: id.to_owned(),
            beta: estimate.params.beta(id).expect("params cover the domain"),
            eta: estimate.params.eta(id).expect("params cover the domain"),
        })
        .collect();

    Ok(CalibrationResult {
        estimate,
        item_calibrations,
        restarts: config.restarts,
        identifiable,
    })
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn std_dev(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::assess::simulate::simulate_responses;

    fn chain_domain() -> Arc<Domain> {
        Arc::new(Domain::from_ids(["a", "b", "c"]).unwrap())
    }

    fn chain_states() -> Vec<KnowledgeState> {
        vec![
            KnowledgeState::empty(),
            KnowledgeState::from_ids(["a"]),
            KnowledgeState::from_ids(["a", "b"]),
            KnowledgeState::from_ids(["a", "b", "c"]),
        ]
    }

    fn pattern(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    fn simulated_data(n: usize, beta: f64, eta: f64, seed: u64) -> ResponseData {
        let domain = chain_domain();
        let states = chain_states();
        let params = BlimParams::uniform(domain.clone(), beta, eta).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut patterns = Vec::with_capacity(n);
        for i in 0..n {
            let truth = &states[i % states.len()];
            patterns.push(simulate_responses(truth, &params, &mut rng).unwrap());
        }
        ResponseData::new(domain, patterns).unwrap()
    }

    #[test]
    fn response_data_validates_patterns() {
        let d = chain_domain();
        assert!(matches!(
            ResponseData::new(d.clone(), vec![]),
            Err(EstimateError::EmptyResponseData)
        ));
        let missing = pattern(&[("a", true), ("b", false)]);
        assert!(matches!(
            ResponseData::new(d.clone(), vec![missing]),
            Err(EstimateError::PatternMismatch { index: 0, .. })
        ));
        let foreign = pattern(&[("a", true), ("b", false), ("c", true), ("z", true)]);
        assert!(matches!(
            ResponseData::new(d, vec![foreign]),
            Err(EstimateError::PatternMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn error_rate_counts_incorrect_responses() {
        let d = chain_domain();
        let data = ResponseData::new(
            d,
            vec![
                pattern(&[("a", true), ("b", false), ("c", false)]),
                pattern(&[("a", true), ("b", true), ("c", false)]),
            ],
        )
        .unwrap();
        assert_eq!(data.error_rate("a"), Some(0.0));
        assert_eq!(data.error_rate("b"), Some(0.5));
        assert_eq!(data.error_rate("c"), Some(1.0));
        assert_eq!(data.error_rate("z"), None);
    }

    #[test]
    fn em_converges_on_simulated_data() {
        let domain = chain_domain();
        let data = simulated_data(200, 0.1, 0.1, 11);
        let estimate = em_fit(&domain, &chain_states(), &data, &EmConfig::default()).unwrap();
        assert!(estimate.converged);
        assert!(estimate.log_likelihood.is_finite());
        let pi_sum: f64 = estimate.belief.probabilities().iter().sum();
        assert!((pi_sum - 1.0).abs() < 1e-9);
        for id in ["a", "b", "c"] {
            let beta = estimate.params.beta(id).unwrap();
            let eta = estimate.params.eta(id).unwrap();
            assert!((PARAM_FLOOR..0.5).contains(&beta));
            assert!((PARAM_FLOOR..0.5).contains(&eta));
        }
    }

    #[test]
    fn em_log_likelihood_never_decreases() {
        // Run the same fit twice with growing iteration caps; the final
        // log-likelihood must be monotone in the cap.
        let domain = chain_domain();
        let data = simulated_data(100, 0.15, 0.1, 5);
        let mut last = f64::NEG_INFINITY;
        for cap in [1, 2, 5, 20, 100] {
            let config = EmConfig {
                max_iterations: cap,
                ..EmConfig::default()
            };
            let estimate = em_fit(&domain, &chain_states(), &data, &config).unwrap();
            assert!(
                estimate.log_likelihood >= last - 1e-9,
                "ll dropped from {last} to {} at cap {cap}",
                estimate.log_likelihood
            );
            last = estimate.log_likelihood;
        }
    }

    #[test]
    fn iteration_cap_yields_unconverged_partial_result() {
        let domain = chain_domain();
        let data = simulated_data(100, 0.1, 0.1, 3);
        let config = EmConfig {
            max_iterations: 1,
            ..EmConfig::default()
        };
        let estimate = em_fit(&domain, &chain_states(), &data, &config).unwrap();
        assert!(!estimate.converged);
        assert_eq!(estimate.iterations, 1);
    }

    #[test]
    fn goodness_of_fit_on_good_model_is_small() {
        let domain = chain_domain();
        let data = simulated_data(300, 0.1, 0.1, 17);
        let estimate = em_fit(&domain, &chain_states(), &data, &EmConfig::default()).unwrap();
        let fit = goodness_of_fit(&data, &estimate).unwrap();
        assert_eq!(fit.n_observations, 300);
        assert!(fit.n_patterns >= 4);
        assert!(fit.g_squared >= 0.0 || fit.g_squared.abs() < 1e-6);
        // 3 items: at most 8 distinct patterns; 4 states + 6 item
        // parameters always dominate, so dof floors at 0.
        assert_eq!(fit.degrees_of_freedom, 0);
    }

    #[test]
    fn calibration_keeps_best_restart() {
        let domain = chain_domain();
        let data = simulated_data(150, 0.1, 0.1, 23);
        let mut rng = StdRng::seed_from_u64(1);
        let result = calibrate_parameters(
            &domain,
            &chain_states(),
            &data,
            &CalibrationConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(result.restarts, 5);
        assert_eq!(result.item_calibrations.len(), 3);
        // The kept estimate beats a single fixed-init fit or matches it.
        let single = em_fit(&domain, &chain_states(), &data, &EmConfig::default()).unwrap();
        assert!(result.estimate.log_likelihood >= single.log_likelihood - 1e-6);
        assert!(result.identifiable);
    }

    #[test]
    fn calibration_is_reproducible_under_a_seed() {
        let domain = chain_domain();
        let data = simulated_data(80, 0.1, 0.1, 29);
        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            calibrate_parameters(
                &domain,
                &chain_states(),
                &data,
                &CalibrationConfig::default(),
                &mut rng,
            )
            .unwrap()
            .estimate
            .log_likelihood
        };
        assert_eq!(run(9).to_bits(), run(9).to_bits());
    }
}

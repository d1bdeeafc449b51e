//! Stochastic response simulation.

use std::collections::BTreeMap;

use rand::Rng;

use crate::domain::KnowledgeState;
use crate::error::AssessResult;

use super::BlimParams;

/// Draw one response per item given a learner's true state.
///
/// For each item q, a correct answer is drawn with probability
/// `P(correct | q, K_true)` under the BLIM. The caller supplies the RNG, so
/// seeded runs are reproducible.
pub fn simulate_responses<R: Rng>(
    true_state: &KnowledgeState,
    params: &BlimParams,
    rng: &mut R,
) -> AssessResult<BTreeMap<String, bool>> {
    let domain = params.domain();
    let bits = domain.state_bits(true_state)?;
    let mut responses = BTreeMap::new();
    for (index, item) in domain.iter().enumerate() {
        let p = params.p_correct_at(index, &bits);
        responses.insert(item.id().to_owned(), rng.gen::<f64>() < p);
    }
    Ok(responses)
}

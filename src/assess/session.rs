//! Adaptive assessment sessions.
//!
//! A session is a small state machine over a belief distribution:
//!
//! ```text
//! Open ──select_item──▸ Open      (pure query)
//! Open ──observe(q,r)──▸ Open     (belief updated, q marked asked)
//! Open ──all asked / entropy ≤ threshold──▸ Complete
//! Open ──protocol error──▸ Failed (terminal)
//! ```
//!
//! Protocol misuse (unknown item, repeat observation, inconsistent
//! observation) moves the session to `Failed` and surfaces a typed error;
//! observations against an already-terminal session error without changing
//! it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::Domain;
use crate::error::{AssessError, AssessResult};
use crate::space::KnowledgeSpace;

use super::{BeliefState, BlimParams};

/// Default entropy threshold (bits) below which a session completes.
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 0.1;

/// Lifecycle of an assessment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepting observations.
    Open,
    /// Finished: all items asked or the belief is concentrated enough.
    Complete,
    /// Terminal after a protocol error.
    Failed,
}

impl SessionPhase {
    fn name(self) -> &'static str {
        match self {
            SessionPhase::Open => "open",
            SessionPhase::Complete => "complete",
            SessionPhase::Failed => "failed",
        }
    }
}

/// Record of a single observed question.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentStep {
    /// The item asked.
    pub item_id: String,
    /// Whether the response was correct.
    pub correct: bool,
    /// Belief entropy before the update, in bits.
    pub entropy_before: f64,
    /// Belief entropy after the update, in bits.
    pub entropy_after: f64,
    /// MAP state estimate after the update, as sorted ids.
    pub map_ids: Vec<String>,
}

/// Final report of a session.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentSummary {
    /// Number of questions observed.
    pub total_questions: usize,
    /// Ordered step log.
    pub steps: Vec<AssessmentStep>,
    /// MAP estimate of the learner's state, as sorted ids.
    pub final_state_ids: Vec<String>,
    /// 1 − H(π)/log₂|𝒦|, in [0, 1]; 1 means the belief is a point mass.
    pub confidence: f64,
    /// Items in the MAP estimate.
    pub mastered: Vec<String>,
    /// Domain items outside the MAP estimate.
    pub not_mastered: Vec<String>,
}

/// An adaptive assessment session over a knowledge space.
pub struct AssessmentSession {
    domain: Arc<Domain>,
    params: BlimParams,
    belief: BeliefState,
    asked: BTreeSet<String>,
    steps: Vec<AssessmentStep>,
    phase: SessionPhase,
    entropy_threshold: f64,
}

impl AssessmentSession {
    /// Open a session with a uniform prior over the space's states.
    pub fn start(space: &KnowledgeSpace, params: BlimParams) -> AssessResult<Self> {
        if !params.domain().same_items(space.domain()) {
            return Err(AssessError::DomainMismatch);
        }
        let domain = Arc::clone(space.domain());
        let belief = BeliefState::uniform(Arc::clone(&domain), space.states().to_vec())?;
        tracing::debug!(
            items = domain.len(),
            states = space.len(),
            "assessment session opened"
        );
        Ok(Self {
            domain,
            params,
            belief,
            asked: BTreeSet::new(),
            steps: Vec::new(),
            phase: SessionPhase::Open,
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
        })
    }

    /// Override the entropy threshold at which the session completes.
    pub fn with_entropy_threshold(mut self, threshold: f64) -> Self {
        self.entropy_threshold = threshold;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True once the session reached `Complete`.
    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Complete
    }

    /// Current belief distribution.
    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }

    /// Ids asked so far, sorted.
    pub fn asked(&self) -> impl Iterator<Item = &str> {
        self.asked.iter().map(String::as_str)
    }

    /// Ids not yet asked, sorted.
    pub fn remaining(&self) -> Vec<&str> {
        self.domain
            .ids()
            .filter(|id| !self.asked.contains(*id))
            .collect()
    }

    /// Pick the not-yet-asked item with maximal information gain.
    ///
    /// Ties break in item-id order. Pure: the session is unchanged.
    pub fn select_item(&self) -> AssessResult<String> {
        if self.phase != SessionPhase::Open {
            return Err(AssessError::SessionClosed {
                phase: self.phase.name(),
            });
        }
        let mut best: Option<(String, f64)> = None;
        for id in self.remaining() {
            let gain = self.belief.information_gain(&self.params, id)?;
            let better = match &best {
                None => true,
                Some((_, best_gain)) => gain > *best_gain,
            };
            if better {
                best = Some((id.to_owned(), gain));
            }
        }
        best.map(|(id, _)| id).ok_or(AssessError::NoRemainingItems)
    }

    /// Record an observed response and update the belief.
    ///
    /// Completes the session when every item has been asked or the belief
    /// entropy falls to the threshold.
    pub fn observe(&mut self, item_id: &str, correct: bool) -> AssessResult<&AssessmentStep> {
        self.apply_observation(item_id, correct)?;
        self.refresh_completion();
        Ok(self.steps.last().expect("observation was just recorded"))
    }

    /// Fold a complete (or partial) response map through the update in
    /// item-id order.
    ///
    /// Semantically equivalent to observing each response in sequence; the
    /// completion criterion is evaluated once at the end, so the final
    /// belief is independent of item order.
    pub fn run_batch(&mut self, responses: &BTreeMap<String, bool>) -> AssessResult<()> {
        for (item_id, correct) in responses {
            self.apply_observation(item_id, *correct)?;
        }
        self.refresh_completion();
        Ok(())
    }

    /// Drive the session adaptively: select, ask the responder, observe.
    ///
    /// Stops on completion or after `max_questions` observations.
    pub fn run_adaptive<F>(
        &mut self,
        mut respond: F,
        max_questions: Option<usize>,
    ) -> AssessResult<()>
    where
        F: FnMut(&str) -> bool,
    {
        let cap = max_questions.unwrap_or(self.domain.len());
        let mut asked = 0;
        while self.phase == SessionPhase::Open && asked < cap {
            let item_id = self.select_item()?;
            let correct = respond(&item_id);
            self.observe(&item_id, correct)?;
            asked += 1;
        }
        Ok(())
    }

    /// Produce the summary for the session as it stands.
    pub fn summary(&self) -> AssessmentSummary {
        let estimate = self.belief.map_state();
        let final_state_ids = estimate.ids();
        let confidence = if self.belief.len() > 1 {
            1.0 - self.belief.entropy() / (self.belief.len() as f64).log2()
        } else {
            1.0
        };
        let not_mastered = self
            .domain
            .ids()
            .filter(|id| !estimate.contains(*id))
            .map(str::to_owned)
            .collect();
        AssessmentSummary {
            total_questions: self.steps.len(),
            steps: self.steps.clone(),
            final_state_ids: final_state_ids.clone(),
            confidence,
            mastered: final_state_ids,
            not_mastered,
        }
    }

    fn apply_observation(&mut self, item_id: &str, correct: bool) -> AssessResult<()> {
        if self.phase != SessionPhase::Open {
            return Err(AssessError::SessionClosed {
                phase: self.phase.name(),
            });
        }
        if !self.domain.contains(item_id) {
            self.phase = SessionPhase::Failed;
            return Err(crate::error::DomainError::UnknownItem {
                id: item_id.to_owned(),
            }
            .into());
        }
        if self.asked.contains(item_id) {
            self.phase = SessionPhase::Failed;
            return Err(AssessError::AlreadyAsked {
                id: item_id.to_owned(),
            });
        }
        let entropy_before = self.belief.entropy();
        let updated = match self.belief.update(&self.params, item_id, correct) {
            Ok(updated) => updated,
            Err(err) => {
                self.phase = SessionPhase::Failed;
                return Err(err);
            }
        };
        let entropy_after = updated.entropy();
        let map_ids = updated.map_state().ids();
        tracing::debug!(
            item = item_id,
            correct,
            entropy_before,
            entropy_after,
            "observation applied"
        );
        self.belief = updated;
        self.asked.insert(item_id.to_owned());
        self.steps.push(AssessmentStep {
            item_id: item_id.to_owned(),
            correct,
            entropy_before,
            entropy_after,
            map_ids,
        });
        Ok(())
    }

    fn refresh_completion(&mut self) {
        if self.phase != SessionPhase::Open {
            return;
        }
        let all_asked = self.asked.len() == self.domain.len();
        if all_asked || self.belief.entropy() <= self.entropy_threshold {
            self.phase = SessionPhase::Complete;
            tracing::debug!(
                questions = self.steps.len(),
                entropy = self.belief.entropy(),
                "assessment session complete"
            );
        }
    }
}

impl std::fmt::Debug for AssessmentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessmentSession")
            .field("phase", &self.phase.name())
            .field("asked", &self.asked.len())
            .field("entropy", &self.belief.entropy())
            .finish()
    }
}

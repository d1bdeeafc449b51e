//! Item difficulty estimation.
//!
//! Three per-item measures, each normalised to [0, 1], averaged over
//! whichever are available:
//!
//! - *structural*: transitive prerequisite count relative to the maximum,
//! - *empirical*: fraction of incorrect responses in a dataset,
//! - *BLIM*: β + (1 − η) clamped to [0, 1] after fitting.

use serde::Serialize;

use crate::assess::BlimParams;
use crate::error::{MathesisError, MathesisResult};
use crate::estimate::ResponseData;
use crate::prereq::PrerequisiteGraph;

/// Difficulty estimate for one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDifficulty {
    /// The item id.
    pub item_id: String,
    /// Number of transitive prerequisites.
    pub structural_depth: usize,
    /// Structural difficulty in [0, 1].
    pub structural: f64,
    /// Error fraction in the response data, when data was given.
    pub empirical: Option<f64>,
    /// β + (1 − η) clamped to [0, 1], when parameters were given.
    pub blim: Option<f64>,
    /// Average of the available measures.
    pub combined: f64,
}

/// Difficulty estimates for a whole domain.
#[derive(Debug, Clone, Serialize)]
pub struct DifficultyReport {
    /// Per-item estimates, in id order.
    pub items: Vec<ItemDifficulty>,
    /// Which sources contributed, e.g. `"structural+empirical"`.
    pub method: String,
}

/// Estimate item difficulty from the prerequisite structure and optional
/// response data and fitted BLIM parameters.
pub fn estimate_item_difficulty(
    graph: &PrerequisiteGraph,
    data: Option<&ResponseData>,
    params: Option<&BlimParams>,
) -> MathesisResult<DifficultyReport> {
    let domain = graph.domain();
    if let Some(data) = data {
        if !data.domain().same_items(domain) {
            return Err(MathesisError::Assess(
                crate::error::AssessError::DomainMismatch,
            ));
        }
    }
    if let Some(params) = params {
        if !params.domain().same_items(domain) {
            return Err(MathesisError::Assess(
                crate::error::AssessError::DomainMismatch,
            ));
        }
    }

    let relation = graph.to_surmise_relation();
    let depths: Vec<usize> = domain
        .ids()
        .map(|id| {
            relation
                .prerequisites_of(id)
                .map(|p| p.len())
                .unwrap_or_default()
        })
        .collect();
    let max_depth = depths.iter().copied().max().unwrap_or(0).max(1);

    let mut items = Vec::with_capacity(domain.len());
    for (index, id) in domain.ids().enumerate() {
        let structural = depths[index] as f64 / max_depth as f64;

        let empirical = data.and_then(|d| d.error_rate(id));
        let blim = params.map(|p| {
            let beta = p.beta(id).expect("params cover the domain");
            let eta = p.eta(id).expect("params cover the domain");
            (beta + (1.0 - eta)).clamp(0.0, 1.0)
        });

        let mut sources = vec![structural];
        sources.extend(empirical);
        sources.extend(blim);
        let combined = sources.iter().sum::<f64>() / sources.len() as f64;

        items.push(ItemDifficulty {
            item_id: id.to_owned(),
            structural_depth: depths[index],
            structural,
            empirical,
            blim,
            combined,
        });
    }

    let mut method = vec!["structural"];
    if data.is_some() {
        method.push("empirical");
    }
    if params.is_some() {
        method.push("blim");
    }

    Ok(DifficultyReport {
        items,
        method: method.join("+"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::domain::Domain;

    fn chain_graph() -> PrerequisiteGraph {
        let d = Arc::new(Domain::from_ids(["a", "b", "c"]).unwrap());
        PrerequisiteGraph::new(
            d,
            vec![
                ("a".to_owned(), "b".to_owned()),
                ("b".to_owned(), "c".to_owned()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn structural_difficulty_scales_with_depth() {
        let report = estimate_item_difficulty(&chain_graph(), None, None).unwrap();
        assert_eq!(report.method, "structural");
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.items[0].structural_depth, 0);
        assert_eq!(report.items[1].structural_depth, 1);
        assert_eq!(report.items[2].structural_depth, 2);
        assert!(report.items[0].structural < report.items[1].structural);
        assert!((report.items[2].structural - 1.0).abs() < 1e-12);
        // Only structural available: combined equals structural.
        assert_eq!(report.items[1].combined, report.items[1].structural);
    }

    #[test]
    fn empirical_difficulty_uses_error_rate() {
        let graph = chain_graph();
        let d = graph.domain().clone();
        let patterns = vec![
            [("a", true), ("b", false), ("c", false)],
            [("a", true), ("b", true), ("c", false)],
        ]
        .into_iter()
        .map(|p| {
            p.into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect::<BTreeMap<_, _>>()
        })
        .collect();
        let data = ResponseData::new(d, patterns).unwrap();
        let report = estimate_item_difficulty(&graph, Some(&data), None).unwrap();
        assert_eq!(report.method, "structural+empirical");
        assert_eq!(report.items[0].empirical, Some(0.0));
        assert_eq!(report.items[1].empirical, Some(0.5));
        assert_eq!(report.items[2].empirical, Some(1.0));
    }

    #[test]
    fn blim_difficulty_is_clamped_average_input() {
        let graph = chain_graph();
        let d = graph.domain().clone();
        let params = BlimParams::uniform(d, 0.2, 0.1).unwrap();
        let report = estimate_item_difficulty(&graph, None, Some(&params)).unwrap();
        assert_eq!(report.method, "structural+blim");
        for item in &report.items {
            // 0.2 + (1 - 0.1) = 1.1, clamped to 1.
            assert_eq!(item.blim, Some(1.0));
            assert!((0.0..=1.0).contains(&item.combined));
        }
    }

    #[test]
    fn flat_graph_normalises_by_one() {
        let d = Arc::new(Domain::from_ids(["a", "b"]).unwrap());
        let graph = PrerequisiteGraph::new(d, Vec::new()).unwrap();
        let report = estimate_item_difficulty(&graph, None, None).unwrap();
        for item in &report.items {
            assert_eq!(item.structural, 0.0);
            assert_eq!(item.combined, 0.0);
        }
    }
}

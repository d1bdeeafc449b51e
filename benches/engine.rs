//! Benchmarks for the combinatorial and probabilistic hot paths.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;

use mathesis::assess::{BeliefState, BlimParams};
use mathesis::domain::{Domain, KnowledgeState};
use mathesis::learn::{LearningModel, LearningRate};
use mathesis::prereq::PrerequisiteGraph;
use mathesis::space::LearningSpace;

/// Layered DAG over `n` items: item i depends on item i - 2.
fn layered_graph(n: usize) -> PrerequisiteGraph {
    let ids: Vec<String> = (0..n).map(|i| format!("q{i:02}")).collect();
    let domain = Arc::new(Domain::from_ids(ids.clone()).unwrap());
    let edges: Vec<(String, String)> = (2..n)
        .map(|i| (ids[i - 2].clone(), ids[i].clone()))
        .collect();
    PrerequisiteGraph::new(domain, edges).unwrap()
}

fn antichain_space(n: usize) -> LearningSpace {
    let ids: Vec<String> = (0..n).map(|i| format!("q{i}")).collect();
    let domain = Arc::new(Domain::from_ids(ids.clone()).unwrap());
    let mut states = Vec::with_capacity(1 << n);
    for mask in 0u32..(1 << n) {
        states.push(KnowledgeState::from_ids(
            ids.iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, id)| id.clone()),
        ));
    }
    LearningSpace::build(domain, states).unwrap()
}

fn bench_downset_enumeration(c: &mut Criterion) {
    let graph = layered_graph(14);
    let relation = graph.to_surmise_relation();
    c.bench_function("downsets_14_layered", |b| {
        b.iter(|| black_box(relation.downset_family().len()))
    });
}

fn bench_learning_paths(c: &mut Criterion) {
    let space = antichain_space(7);
    c.bench_function("paths_antichain_7_capped_1000", |b| {
        b.iter(|| black_box(space.learning_paths(1000).len()))
    });
}

fn bench_belief_update(c: &mut Criterion) {
    let space = antichain_space(10);
    let domain = space.domain().clone();
    let params = BlimParams::uniform(domain.clone(), 0.1, 0.1).unwrap();
    let belief = BeliefState::uniform(domain, space.states().to_vec()).unwrap();
    c.bench_function("belief_update_1024_states", |b| {
        b.iter(|| black_box(belief.update(&params, "q4", true).unwrap().entropy()))
    });
}

fn bench_expected_steps(c: &mut Criterion) {
    let graph = layered_graph(10);
    let family = graph.to_surmise_relation().downset_family();
    let space = LearningSpace::build(graph.domain().clone(), family).unwrap();
    let rates = LearningRate::uniform(graph.domain().clone(), 1.0).unwrap();
    c.bench_function("expected_steps_10_layered", |b| {
        b.iter(|| {
            let model = LearningModel::new(&space, &rates).unwrap();
            black_box(model.expected_steps().unwrap())
        })
    });
}

fn bench_trajectory_simulation(c: &mut Criterion) {
    let graph = layered_graph(12);
    let family = graph.to_surmise_relation().downset_family();
    let space = LearningSpace::build(graph.domain().clone(), family).unwrap();
    let rates = LearningRate::uniform(graph.domain().clone(), 1.0).unwrap();
    let model = LearningModel::new(&space, &rates).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    c.bench_function("trajectory_12_layered", |b| {
        b.iter(|| black_box(model.simulate_trajectory(None, 1000, &mut rng).unwrap().steps()))
    });
}

criterion_group!(
    benches,
    bench_downset_enumeration,
    bench_learning_paths,
    bench_belief_update,
    bench_expected_steps,
    bench_trajectory_simulation
);
criterion_main!(benches);

//! Export types and diagram emitters.
//!
//! Flat, id-resolved representations of the structures a renderer needs —
//! Hasse covers, prerequisite edges, trajectories — plus plain-string
//! emitters for Graphviz DOT, Mermaid, and JSON. Everything is ordered
//! deterministically, so exports are stable across runs.

use serde::Serialize;

use crate::course::CourseCore;
use crate::domain::KnowledgeState;
use crate::error::MathesisResult;
use crate::prereq::PrerequisiteGraph;
use crate::space::KnowledgeSpace;

/// One Hasse-diagram edge: a covering pair with the acquired item.
#[derive(Debug, Clone, Serialize)]
pub struct HasseCover {
    /// Lower state as sorted ids.
    pub lower: Vec<String>,
    /// Upper state as sorted ids.
    pub upper: Vec<String>,
    /// The single item the upper state adds.
    pub item_added: String,
}

/// A direct prerequisite edge.
#[derive(Debug, Clone, Serialize)]
pub struct PrerequisiteEdge {
    /// Prerequisite item id.
    pub source: String,
    /// Dependent item id.
    pub target: String,
}

/// A trajectory resolved for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryExport {
    /// Visited states as sorted id lists, start included.
    pub states: Vec<Vec<String>>,
    /// Item acquired at each step; one entry per transition.
    pub acquired: Vec<String>,
}

/// JSON course export payload.
#[derive(Debug, Clone, Serialize)]
struct CourseExport {
    name: String,
    description: String,
    domain: CourseDomainExport,
    prerequisites: CoursePrereqExport,
    states: CourseStatesExport,
}

#[derive(Debug, Clone, Serialize)]
struct CourseDomainExport {
    items: Vec<CourseItemExport>,
    count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct CourseItemExport {
    id: String,
    label: String,
}

#[derive(Debug, Clone, Serialize)]
struct CoursePrereqExport {
    edges: Vec<(String, String)>,
    count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct CourseStatesExport {
    sets: Vec<Vec<String>>,
    count: usize,
}

/// The covering relation of a space, resolved for rendering.
pub fn hasse_covers(space: &KnowledgeSpace) -> Vec<HasseCover> {
    space
        .cover_edges()
        .into_iter()
        .map(|edge| HasseCover {
            lower: space.state_at(edge.lower).ids(),
            upper: space.state_at(edge.upper).ids(),
            item_added: edge.item,
        })
        .collect()
}

/// The direct prerequisite edges, sorted.
pub fn prerequisite_edges(graph: &PrerequisiteGraph) -> Vec<PrerequisiteEdge> {
    graph
        .edges()
        .map(|(source, target)| PrerequisiteEdge {
            source: source.to_owned(),
            target: target.to_owned(),
        })
        .collect()
}

/// Resolve a state sequence into an export trajectory.
///
/// Steps that add more than one item (or none) carry an empty acquired id.
pub fn trajectory_export(states: &[KnowledgeState]) -> TrajectoryExport {
    let acquired = states
        .windows(2)
        .map(|pair| {
            let added = pair[1].difference(&pair[0]);
            if added.len() == 1 {
                added.ids().remove(0)
            } else {
                String::new()
            }
        })
        .collect();
    TrajectoryExport {
        states: states.iter().map(KnowledgeState::ids).collect(),
        acquired,
    }
}

/// Graphviz DOT for the Hasse diagram of a space.
///
/// States are ranked bottom-up by cardinality; edges are labelled with
/// the acquired item.
pub fn hasse_dot(space: &KnowledgeSpace) -> String {
    let mut lines = vec![
        "digraph Hasse {".to_owned(),
        "  rankdir=BT;".to_owned(),
        "  node [shape=box, style=rounded, fontname=\"Helvetica\"];".to_owned(),
        "  edge [arrowsize=0.7];".to_owned(),
    ];

    for level in space.gradation() {
        if level.is_empty() {
            continue;
        }
        let rank: Vec<String> = level
            .iter()
            .map(|s| format!("\"{}\"", state_dot_id(s)))
            .collect();
        lines.push(format!("  {{ rank=same; {} }}", rank.join(" ")));
    }

    for state in space.states() {
        lines.push(format!(
            "  \"{}\" [label=\"{}\"];",
            state_dot_id(state),
            state_label(state)
        ));
    }

    for cover in hasse_covers(space) {
        lines.push(format!(
            "  \"{}\" -> \"{}\" [label=\"+{}\"];",
            ids_dot_id(&cover.lower),
            ids_dot_id(&cover.upper),
            cover.item_added
        ));
    }

    lines.push("}".to_owned());
    lines.join("\n")
}

/// Mermaid flowchart for the Hasse diagram, for Markdown embedding.
pub fn hasse_mermaid(space: &KnowledgeSpace) -> String {
    let mut lines = vec!["graph BT".to_owned()];
    for state in space.states() {
        lines.push(format!(
            "  {}[{}]",
            state_dot_id(state),
            state_label(state)
        ));
    }
    for cover in hasse_covers(space) {
        lines.push(format!(
            "  {} -->|+{}| {}",
            ids_dot_id(&cover.lower),
            cover.item_added,
            ids_dot_id(&cover.upper)
        ));
    }
    lines.join("\n")
}

/// Graphviz DOT for a prerequisite graph.
pub fn prerequisites_dot(graph: &PrerequisiteGraph) -> String {
    let mut lines = vec![
        "digraph Prerequisites {".to_owned(),
        "  rankdir=LR;".to_owned(),
        "  node [shape=box, style=rounded, fontname=\"Helvetica\"];".to_owned(),
        "  edge [arrowsize=0.7];".to_owned(),
    ];
    for id in graph.domain().ids() {
        lines.push(format!("  \"{id}\";"));
    }
    for (source, target) in graph.edges() {
        lines.push(format!("  \"{source}\" -> \"{target}\";"));
    }
    lines.push("}".to_owned());
    lines.join("\n")
}

/// Graphviz DOT for a learning trajectory.
pub fn trajectory_dot(states: &[KnowledgeState]) -> String {
    let mut lines = vec![
        "digraph Trajectory {".to_owned(),
        "  rankdir=LR;".to_owned(),
        "  node [shape=box, style=rounded, fontname=\"Helvetica\"];".to_owned(),
        "  edge [arrowsize=0.7];".to_owned(),
    ];
    for (i, state) in states.iter().enumerate() {
        let style = if i + 1 == states.len() {
            ", style=\"rounded,bold\""
        } else {
            ""
        };
        lines.push(format!("  \"t{i}\" [label=\"{}\"{style}];", state_label(state)));
    }
    let export = trajectory_export(states);
    for (i, item) in export.acquired.iter().enumerate() {
        if item.is_empty() {
            lines.push(format!("  \"t{i}\" -> \"t{}\";", i + 1));
        } else {
            lines.push(format!("  \"t{i}\" -> \"t{}\" [label=\"+{item}\"];", i + 1));
        }
    }
    lines.push("}".to_owned());
    lines.join("\n")
}

/// JSON export of a parsed course: domain, prerequisites, states.
pub fn course_json(course: &CourseCore) -> MathesisResult<String> {
    let export = CourseExport {
        name: course.name().to_owned(),
        description: course.description().to_owned(),
        domain: CourseDomainExport {
            items: course
                .domain()
                .iter()
                .map(|item| CourseItemExport {
                    id: item.id().to_owned(),
                    label: item.label().to_owned(),
                })
                .collect(),
            count: course.domain().len(),
        },
        prerequisites: CoursePrereqExport {
            edges: course
                .graph()
                .edges()
                .map(|(a, b)| (a.to_owned(), b.to_owned()))
                .collect(),
            count: course.graph().edge_count(),
        },
        states: CourseStatesExport {
            sets: course.states().iter().map(KnowledgeState::ids).collect(),
            count: course.states().len(),
        },
    };
    serde_json::to_string_pretty(&export).map_err(|err| {
        crate::error::CourseError::Serialise {
            message: err.to_string(),
        }
        .into()
    })
}

fn state_label(state: &KnowledgeState) -> String {
    if state.is_empty() {
        "∅".to_owned()
    } else {
        format!("{{{}}}", state.ids().join(", "))
    }
}

fn state_dot_id(state: &KnowledgeState) -> String {
    ids_dot_id(&state.ids())
}

fn ids_dot_id(ids: &[String]) -> String {
    if ids.is_empty() {
        "s_empty".to_owned()
    } else {
        format!("s_{}", ids.join("_"))
    }
}

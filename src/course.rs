//! Declarative course definitions.
//!
//! A course file is YAML:
//!
//! ```yaml
//! domain:
//!   name: "Fractions"
//!   description: "Optional"
//!   items:
//!     - id: add
//!       label: "Adding fractions"
//! prerequisites:
//!   edges:
//!     - [add, mul]
//! ```
//!
//! Parsing builds the [`CourseCore`] aggregate bottom-up: domain, then the
//! prerequisite DAG, then its surmise relation, then the Birkhoff state
//! family. Every component holds the shared domain; nothing refers back to
//! the aggregate.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::{Domain, Item, KnowledgeState};
use crate::error::{CourseError, CourseResult};
use crate::prereq::{PrerequisiteGraph, SurmiseRelation};
use crate::space::{KnowledgeSpace, LearningSpace};

/// One item entry of the YAML schema.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSchema {
    /// Stable item id.
    pub id: String,
    /// Optional display label.
    #[serde(default)]
    pub label: String,
}

/// The `domain` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainSchema {
    /// Course name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: String,
    /// The items; must be non-empty with unique ids.
    pub items: Vec<ItemSchema>,
}

/// The `prerequisites` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrerequisitesSchema {
    /// Direct-prerequisite edges as `[source, target]` pairs.
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

/// Top-level course schema.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseSchema {
    /// The domain section.
    pub domain: DomainSchema,
    /// The optional prerequisites section.
    #[serde(default)]
    pub prerequisites: PrerequisitesSchema,
}

/// A parsed, validated course: domain, prerequisite structures, and the
/// derived state family, built bottom-up and owned together.
pub struct CourseCore {
    name: String,
    description: String,
    domain: Arc<Domain>,
    graph: PrerequisiteGraph,
    relation: SurmiseRelation,
    states: Vec<KnowledgeState>,
}

impl CourseCore {
    /// Build the aggregate from a deserialised schema.
    pub fn from_schema(schema: CourseSchema) -> CourseResult<Self> {
        let items = schema
            .domain
            .items
            .into_iter()
            .map(|item| Ok(Item::new(item.id)?.with_label(item.label)))
            .collect::<CourseResult<Vec<_>>>()?;
        let domain = Arc::new(Domain::new(items)?);
        let graph = PrerequisiteGraph::new(Arc::clone(&domain), schema.prerequisites.edges)?;
        let relation = graph.to_surmise_relation();
        let states = relation.downset_family();
        tracing::debug!(
            name = %schema.domain.name,
            items = domain.len(),
            states = states.len(),
            "course built"
        );
        Ok(Self {
            name: schema.domain.name,
            description: schema.domain.description,
            domain,
            graph,
            relation,
            states,
        })
    }

    /// Parse a YAML string.
    pub fn parse_str(content: &str) -> CourseResult<Self> {
        let schema: CourseSchema =
            serde_yaml::from_str(content).map_err(|source| CourseError::Yaml { source })?;
        Self::from_schema(schema)
    }

    /// Read and parse a course file.
    pub fn parse_file(path: impl AsRef<Path>) -> CourseResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CourseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_str(&content)
    }

    /// Course name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Course description (possibly empty).
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The shared domain.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// The prerequisite DAG.
    pub fn graph(&self) -> &PrerequisiteGraph {
        &self.graph
    }

    /// The surmise relation (transitive closure of the DAG).
    pub fn relation(&self) -> &SurmiseRelation {
        &self.relation
    }

    /// The Birkhoff state family, in canonical order.
    pub fn states(&self) -> &[KnowledgeState] {
        &self.states
    }

    /// Build the knowledge space over the derived states.
    pub fn to_knowledge_space(&self) -> CourseResult<KnowledgeSpace> {
        Ok(KnowledgeSpace::build(
            Arc::clone(&self.domain),
            self.states.iter().cloned(),
        )?)
    }

    /// Build the learning space over the derived states.
    ///
    /// Downset families of a DAG closure are always learning spaces, so
    /// this succeeds for any parsed course.
    pub fn to_learning_space(&self) -> CourseResult<LearningSpace> {
        Ok(LearningSpace::build(
            Arc::clone(&self.domain),
            self.states.iter().cloned(),
        )?)
    }
}

impl std::fmt::Debug for CourseCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseCore")
            .field("name", &self.name)
            .field("items", &self.domain.len())
            .field("edges", &self.graph.edge_count())
            .field("states", &self.states.len())
            .finish()
    }
}

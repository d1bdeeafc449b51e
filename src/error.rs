//! Rich diagnostic error types for the mathesis engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the mathesis engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum MathesisError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prereq(#[from] PrereqError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Space(#[from] SpaceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Assess(#[from] AssessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Estimate(#[from] EstimateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Course(#[from] CourseError),
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DomainError {
    #[error("invalid item id: {id:?}")]
    #[diagnostic(
        code(mathesis::domain::invalid_item),
        help(
            "Item ids must be non-empty and contain at least one \
             non-whitespace character. Use a short stable identifier \
             such as \"fractions\" or \"q12\"."
        )
    )]
    InvalidItem { id: String },

    #[error("duplicate item id: {id:?}")]
    #[diagnostic(
        code(mathesis::domain::duplicate_item_id),
        help(
            "Each item in a domain must have a unique id. Rename one of \
             the items, or remove the duplicate entry."
        )
    )]
    DuplicateItemId { id: String },

    #[error("domain has zero items")]
    #[diagnostic(
        code(mathesis::domain::empty_domain),
        help("A domain must contain at least one item.")
    )]
    EmptyDomain,

    #[error("unknown item: {id:?}")]
    #[diagnostic(
        code(mathesis::domain::unknown_item),
        help(
            "The referenced id is not an item of this domain. Check the \
             spelling, or add the item to the domain first."
        )
    )]
    UnknownItem { id: String },
}

// ---------------------------------------------------------------------------
// Prerequisite algebra errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PrereqError {
    #[error("cyclic prerequisites: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(mathesis::prereq::cyclic),
        help(
            "Prerequisite edges must form a directed acyclic graph. The \
             listed items form a cycle (a self-loop counts as a cycle of \
             length one); remove at least one edge on it."
        )
    )]
    CyclicPrerequisites { cycle: Vec<String> },

    #[error("edge endpoint {id:?} is not in the domain")]
    #[diagnostic(
        code(mathesis::prereq::unknown_item),
        help("Every prerequisite edge must connect two items of the domain.")
    )]
    UnknownItem { id: String },

    #[error("not a quasi-order: {reason}")]
    #[diagnostic(
        code(mathesis::prereq::not_a_quasi_order),
        help(
            "A surmise relation must be reflexive (every (q, q) pair \
             present) and transitively closed. Build it from a \
             prerequisite graph with `to_surmise_relation()` to get the \
             closure for free."
        )
    )]
    NotAQuasiOrder { reason: String },
}

// ---------------------------------------------------------------------------
// Space engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SpaceError {
    #[error("axiom {axiom} violated: {witness}")]
    #[diagnostic(
        code(mathesis::space::axiom_violation),
        help(
            "A knowledge space must contain the empty state (S1) and the \
             full domain (S2), every state must be a subset of the \
             domain, and the family must be closed under union (S3). \
             Run `validate_knowledge_space` for a full report."
        )
    )]
    AxiomViolation { axiom: String, witness: String },

    #[error("inaccessible state {{{state}}}")]
    #[diagnostic(
        code(mathesis::space::inaccessible_state),
        help(
            "In a learning space, every non-empty state must contain an \
             item whose removal yields another state of the family. Add \
             the missing intermediate state or drop this one."
        )
    )]
    InaccessibleState { state: String },

    #[error("state {{{state}}} is not a member of this space")]
    #[diagnostic(
        code(mathesis::space::unknown_state),
        help(
            "Fringe and transition queries only accept states that belong \
             to the family. Check membership with `contains` first."
        )
    )]
    UnknownState { state: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),
}

// ---------------------------------------------------------------------------
// Assessment errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AssessError {
    #[error("{param} for item {id:?} out of range: {value}")]
    #[diagnostic(
        code(mathesis::assess::parameter_out_of_range),
        help(
            "Slip and guess probabilities must lie in [0, 0.5). Values at \
             or above 0.5 make the response model uninterpretable (an \
             incorrect answer would be evidence of mastery)."
        )
    )]
    ParameterOutOfRange {
        param: &'static str,
        id: String,
        value: f64,
    },

    #[error("missing {param} parameter for item {id:?}")]
    #[diagnostic(
        code(mathesis::assess::missing_parameter),
        help("BLIM parameters must cover every item of the domain exactly once.")
    )]
    MissingParameter { param: &'static str, id: String },

    #[error("belief distribution is not a probability vector: {reason}")]
    #[diagnostic(
        code(mathesis::assess::invalid_belief),
        help(
            "Belief probabilities must be non-negative and sum to 1 \
             (tolerance 1e-6), with one entry per state."
        )
    )]
    InvalidBelief { reason: String },

    #[error("observation of item {id:?} is inconsistent with every state")]
    #[diagnostic(
        code(mathesis::assess::inconsistent_observation),
        help(
            "All states assign probability zero to this response. This can \
             only happen with beta or eta equal to 0; use small positive \
             parameters if responses may be noisy."
        )
    )]
    InconsistentObservation { id: String },

    #[error("item {id:?} was already asked in this session")]
    #[diagnostic(
        code(mathesis::assess::already_asked),
        help("Each item may be observed at most once per session.")
    )]
    AlreadyAsked { id: String },

    #[error("no remaining items to ask")]
    #[diagnostic(
        code(mathesis::assess::no_remaining_items),
        help("Every item of the domain has been asked; read the session summary instead.")
    )]
    NoRemainingItems,

    #[error("parameters and state family are defined on different domains")]
    #[diagnostic(
        code(mathesis::assess::domain_mismatch),
        help("Build the BLIM parameters from the same domain as the space being assessed.")
    )]
    DomainMismatch,

    #[error("session is {phase} and accepts no further observations")]
    #[diagnostic(
        code(mathesis::assess::session_closed),
        help(
            "Observations are only accepted while the session is open. \
             Start a new session to assess again."
        )
    )]
    SessionClosed { phase: &'static str },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),
}

// ---------------------------------------------------------------------------
// Estimation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EstimateError {
    #[error("response data contains no patterns")]
    #[diagnostic(
        code(mathesis::estimate::empty_response_data),
        help("At least one response pattern is required to fit the model.")
    )]
    EmptyResponseData,

    #[error("response pattern {index} does not cover the domain: {reason}")]
    #[diagnostic(
        code(mathesis::estimate::pattern_mismatch),
        help(
            "Every response pattern must map each item id of the domain \
             to a boolean, with no extra keys."
        )
    )]
    PatternMismatch { index: usize, reason: String },

    #[error(
        "EM diverged at iteration {iteration}: log-likelihood fell from {previous} to {current}"
    )]
    #[diagnostic(
        code(mathesis::estimate::em_diverged),
        help(
            "EM guarantees a non-decreasing log-likelihood, so a drop \
             beyond tolerance indicates numerical breakdown. This fit \
             attempt is abandoned; in a multi-restart calibration other \
             restarts still proceed."
        )
    )]
    EmDiverged {
        iteration: usize,
        previous: f64,
        current: f64,
    },

    #[error("all {restarts} calibration restarts failed")]
    #[diagnostic(
        code(mathesis::estimate::no_restart_succeeded),
        help(
            "Every EM restart diverged. Check the response data for \
             degenerate patterns, or loosen the tolerance."
        )
    )]
    NoRestartSucceeded { restarts: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Assess(#[from] AssessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),
}

// ---------------------------------------------------------------------------
// Learning model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error("learning rate for item {id:?} must be positive, got {value}")]
    #[diagnostic(
        code(mathesis::learn::parameter_out_of_range),
        help("Rates are relative propensities; every item needs a rate > 0.")
    )]
    ParameterOutOfRange { id: String, value: f64 },

    #[error("missing learning rate for item {id:?}")]
    #[diagnostic(
        code(mathesis::learn::missing_rate),
        help("Learning rates must cover every item of the domain exactly once.")
    )]
    MissingRate { id: String },

    #[error("learning space and rates are defined on different domains")]
    #[diagnostic(
        code(mathesis::learn::domain_mismatch),
        help("Build the rates from the same domain as the learning space.")
    )]
    DomainMismatch,

    #[error("fundamental matrix is singular: (I - T) is not invertible")]
    #[diagnostic(
        code(mathesis::learn::singular_fundamental_matrix),
        help(
            "Some transient state cannot reach the absorbing full state, \
             so expected steps are undefined. This indicates a state \
             family that is not a learning space."
        )
    )]
    SingularFundamentalMatrix,

    #[error("trajectory {index} step {step} is not a covering step: {reason}")]
    #[diagnostic(
        code(mathesis::learn::not_a_cover_step),
        help(
            "Observed trajectories must move along the covering relation: \
             each step adds exactly one item to the previous state."
        )
    )]
    NotACoverStep {
        index: usize,
        step: usize,
        reason: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Space(#[from] SpaceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),
}

// ---------------------------------------------------------------------------
// Course definition errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CourseError {
    #[error("failed to read course file {path}")]
    #[diagnostic(
        code(mathesis::course::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid course YAML: {source}")]
    #[diagnostic(
        code(mathesis::course::yaml),
        help(
            "A course file needs a `domain` mapping with `name` and a \
             non-empty `items` list, and optionally a `prerequisites` \
             mapping with an `edges` list of [source, target] pairs."
        )
    )]
    Yaml {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialise course export: {message}")]
    #[diagnostic(
        code(mathesis::course::serialise),
        help("This indicates a bug in the export types; please report it.")
    )]
    Serialise { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prereq(#[from] PrereqError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Space(#[from] SpaceError),
}

/// Convenience alias for functions returning mathesis results.
pub type MathesisResult<T> = std::result::Result<T, MathesisError>;

/// Result type for domain operations.
pub type DomainResult<T> = std::result::Result<T, DomainError>;

/// Result type for prerequisite algebra operations.
pub type PrereqResult<T> = std::result::Result<T, PrereqError>;

/// Result type for space engine operations.
pub type SpaceResult<T> = std::result::Result<T, SpaceError>;

/// Result type for assessment operations.
pub type AssessResult<T> = std::result::Result<T, AssessError>;

/// Result type for estimation operations.
pub type EstimateResult<T> = std::result::Result<T, EstimateError>;

/// Result type for learning model operations.
pub type LearnResult<T> = std::result::Result<T, LearnError>;

/// Result type for course definition operations.
pub type CourseResult<T> = std::result::Result<T, CourseError>;

//! # mathesis
//!
//! A Knowledge Space Theory (KST) engine: given a finite set of learning
//! items and a prerequisite structure, mathesis constructs the family of
//! admissible knowledge states, validates its axioms, enumerates learning
//! paths, runs adaptive assessment, fits probabilistic response models,
//! and simulates and optimises learning trajectories.
//!
//! ## Architecture
//!
//! - **Value types** (`domain`): items, knowledge states, domains
//! - **Prerequisite algebra** (`prereq`): DAGs (petgraph-backed), surmise
//!   relations, transitive closure/reduction, Birkhoff downsets
//! - **Space engine** (`space`): knowledge/learning spaces, fringes,
//!   atoms, covering relation, learning paths
//! - **Assessment** (`assess`): BLIM belief updates, entropy-driven item
//!   selection, adaptive sessions
//! - **Estimation** (`estimate`): EM fitting, G² fit statistics,
//!   multi-restart calibration
//! - **Learning model** (`learn`): absorbing Markov chains, expected
//!   steps, optimal teaching, rate tuning
//!
//! ## Library usage
//!
//! ```no_run
//! use mathesis::course::CourseCore;
//!
//! let course = CourseCore::parse_file("course.kst.yaml").unwrap();
//! let space = course.to_learning_space().unwrap();
//! let paths = space.learning_paths(100);
//! println!("{} learning paths", paths.len());
//! ```

pub mod assess;
pub mod bits;
pub mod course;
pub mod difficulty;
pub mod domain;
pub mod error;
pub mod estimate;
pub mod export;
pub mod learn;
pub mod prereq;
pub mod space;
pub mod validate;

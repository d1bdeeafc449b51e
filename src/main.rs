//! mathesis CLI: Knowledge Space Theory course tools.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mathesis::assess::session::AssessmentSession;
use mathesis::assess::simulate::simulate_responses;
use mathesis::assess::BlimParams;
use mathesis::course::CourseCore;
use mathesis::difficulty::estimate_item_difficulty;
use mathesis::export;
use mathesis::learn::optimize::optimal_teaching_sequence;
use mathesis::learn::{LearningModel, LearningRate};
use mathesis::validate::validate_learning_space;

/// Hard ceiling on path enumeration; the per-invocation `--max` only
/// limits what is displayed.
const PATH_ENUMERATION_CAP: usize = 10_000;

#[derive(Parser)]
#[command(name = "mathesis", version, about = "Knowledge Space Theory engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a course overview: items, states, paths, critical path.
    Info {
        /// Path to a .kst.yaml course file.
        file: PathBuf,
    },

    /// Run the formal axiom validation and report every check.
    Validate {
        /// Path to a .kst.yaml course file.
        file: PathBuf,
    },

    /// Enumerate learning paths from ∅ to Q.
    Paths {
        /// Path to a .kst.yaml course file.
        file: PathBuf,

        /// Maximum paths to display.
        #[arg(long, default_value = "10")]
        max: usize,
    },

    /// Simulate a learner cohort: assessment accuracy and trajectories.
    Simulate {
        /// Path to a .kst.yaml course file.
        file: PathBuf,

        /// Number of learners to simulate.
        #[arg(long, default_value = "100")]
        learners: usize,

        /// Slip probability for every item.
        #[arg(long, default_value = "0.1")]
        beta: f64,

        /// Lucky-guess probability for every item.
        #[arg(long, default_value = "0.1")]
        eta: f64,

        /// Random seed for reproducibility.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Export the course as DOT, Mermaid, or JSON.
    Export {
        /// Path to a .kst.yaml course file.
        file: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value = "dot")]
        format: ExportFormat,

        /// Diagram type.
        #[arg(long = "type", value_enum, default_value = "hasse")]
        diagram: DiagramType,
    },

    /// Run an interactive terminal assessment (y/n answers on stdin).
    Assess {
        /// Path to a .kst.yaml course file.
        file: PathBuf,

        /// Slip probability for every item.
        #[arg(long, default_value = "0.1")]
        beta: f64,

        /// Lucky-guess probability for every item.
        #[arg(long, default_value = "0.1")]
        eta: f64,

        /// Stop once belief entropy (bits) falls to this threshold.
        #[arg(long, default_value = "0.1")]
        threshold: f64,
    },

    /// Compute an optimal teaching plan and an item difficulty report.
    Optimize {
        /// Path to a .kst.yaml course file.
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Dot,
    Json,
    Mermaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DiagramType {
    Hasse,
    Prerequisites,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { file } => cmd_info(&file),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Paths { file, max } => cmd_paths(&file, max),
        Commands::Simulate {
            file,
            learners,
            beta,
            eta,
            seed,
        } => cmd_simulate(&file, learners, beta, eta, seed),
        Commands::Export {
            file,
            format,
            diagram,
        } => cmd_export(&file, format, diagram),
        Commands::Assess {
            file,
            beta,
            eta,
            threshold,
        } => cmd_assess(&file, beta, eta, threshold),
        Commands::Optimize { file } => cmd_optimize(&file),
    }
}

fn cmd_info(file: &PathBuf) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    println!("Course: {}", course.name());
    if !course.description().is_empty() {
        println!("Description: {}", course.description());
    }
    println!("Items: {}", course.domain().len());
    println!("States: {}", course.states().len());
    println!("Prerequisites: {}", course.graph().edge_count());

    let (critical, length) = course.graph().longest_path();
    println!("Critical path: {}", critical.join(" -> "));
    println!("Critical path length: {length}");

    let space = course.to_learning_space()?;
    let paths = space.learning_paths(PATH_ENUMERATION_CAP);
    let suffix = if paths.truncated { "+" } else { "" };
    println!("Learning paths: {}{suffix}", paths.len());
    Ok(())
}

fn cmd_validate(file: &PathBuf) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    let report = validate_learning_space(course.domain(), course.states());
    println!("Validation: {}", report.summary());
    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!("  [{status}] {}: {}", check.name, check.message);
    }
    if !report.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_paths(file: &PathBuf, max: usize) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    let space = course.to_learning_space()?;
    let result = space.learning_paths(PATH_ENUMERATION_CAP);
    if result.truncated {
        println!("Learning paths: {}+ (enumeration capped)", result.len());
    } else {
        println!("Learning paths: {}", result.len());
    }
    println!();
    for (i, path) in result.paths.iter().take(max).enumerate() {
        println!("  {}. {}", i + 1, path.join(" -> "));
    }
    if result.len() > max {
        println!("  ... and {} more (use --max to show more)", result.len() - max);
    }
    Ok(())
}

fn cmd_simulate(
    file: &PathBuf,
    learners: usize,
    beta: f64,
    eta: f64,
    seed: Option<u64>,
) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let space = course.to_learning_space()?;
    let params = BlimParams::uniform(course.domain().clone(), beta, eta)?;

    println!("Simulating {learners} learners on '{}'", course.name());
    println!("Parameters: beta={beta}, eta={eta}, seed={seed:?}");
    println!();

    let mut identified = 0usize;
    for _ in 0..learners {
        let truth = &course.states()[rng.gen_range(0..course.states().len())];
        let responses = simulate_responses(truth, &params, &mut rng)?;
        let blim = BlimParams::uniform(course.domain().clone(), beta, eta)?;
        let mut session =
            AssessmentSession::start(space.space(), blim)?.with_entropy_threshold(0.0);
        session.run_batch(&responses)?;
        if session.belief().map_state() == truth {
            identified += 1;
        }
    }
    let accuracy = identified as f64 / learners as f64 * 100.0;
    println!("=== Assessment ===");
    println!("Identified: {identified}/{learners} ({accuracy:.1}%)");
    println!("Questions per learner: {}", course.domain().len());
    println!();

    let rates = LearningRate::uniform(course.domain().clone(), 1.0)?;
    let model = LearningModel::new(&space, &rates)?;
    let expected = model.expected_steps_from(&course.domain().empty_state())?;
    let mut lengths = Vec::with_capacity(learners);
    for _ in 0..learners {
        let walk = model.simulate_trajectory(None, 1000, &mut rng)?;
        lengths.push(walk.steps() as f64);
    }
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    let variance =
        lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    println!("=== Trajectories ===");
    println!("Expected steps to mastery: {expected:.1}");
    println!("Simulated avg steps: {mean:.1} (std={:.1})", variance.sqrt());
    Ok(())
}

fn cmd_export(file: &PathBuf, format: ExportFormat, diagram: DiagramType) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    match (format, diagram) {
        (ExportFormat::Json, _) => println!("{}", export::course_json(&course)?),
        (ExportFormat::Dot, DiagramType::Prerequisites) => {
            println!("{}", export::prerequisites_dot(course.graph()));
        }
        (ExportFormat::Mermaid, DiagramType::Prerequisites) => {
            miette::bail!("mermaid output is not supported for prerequisite graphs");
        }
        (ExportFormat::Dot, DiagramType::Hasse) => {
            let space = course.to_knowledge_space()?;
            println!("{}", export::hasse_dot(&space));
        }
        (ExportFormat::Mermaid, DiagramType::Hasse) => {
            let space = course.to_knowledge_space()?;
            println!("{}", export::hasse_mermaid(&space));
        }
    }
    Ok(())
}

fn cmd_assess(file: &PathBuf, beta: f64, eta: f64, threshold: f64) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    let space = course.to_learning_space()?;
    let params = BlimParams::uniform(course.domain().clone(), beta, eta)?;
    let mut session =
        AssessmentSession::start(space.space(), params)?.with_entropy_threshold(threshold);

    println!("Interactive assessment: {}", course.name());
    println!(
        "Domain: {} items, {} states",
        course.domain().len(),
        course.states().len()
    );
    println!("Answer y (yes/correct) or n (no/incorrect) for each item.");
    println!();

    let stdin = std::io::stdin();
    while !session.is_complete() {
        let item_id = match session.select_item() {
            Ok(item_id) => item_id,
            Err(_) => break,
        };
        let label = course
            .domain()
            .item(&item_id)
            .map(|item| item.label().to_owned())
            .unwrap_or_else(|| item_id.clone());
        print!("  Q: Can the learner demonstrate '{label}'? (y/n) ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let mut answer = String::new();
        if stdin.read_line(&mut answer).is_err() {
            break;
        }
        let correct = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
        let step = session.observe(&item_id, correct)?;
        let outcome = if correct { "correct" } else { "incorrect" };
        println!(
            "     -> {outcome}, entropy: {:.3} -> {:.3}",
            step.entropy_before, step.entropy_after
        );
    }

    let summary = session.summary();
    println!();
    println!("=== Assessment complete ===");
    println!("Questions asked: {}", summary.total_questions);
    println!("Confidence: {:.1}%", summary.confidence * 100.0);
    println!("Mastered: {}", summary.mastered.join(", "));
    println!("Not mastered: {}", summary.not_mastered.join(", "));
    Ok(())
}

fn cmd_optimize(file: &PathBuf) -> Result<()> {
    let course = CourseCore::parse_file(file)?;
    let space = course.to_learning_space()?;

    let plan = optimal_teaching_sequence(&space, None, None)?;
    println!("=== Optimal teaching plan ===");
    println!("Expected steps from scratch: {}", plan.total_expected_steps);
    for (i, step) in plan.steps.iter().enumerate() {
        println!(
            "  {}. teach '{}' ({} remaining after)",
            i + 1,
            step.item_id,
            step.expected_remaining - 1.0
        );
    }
    println!();

    let report = estimate_item_difficulty(course.graph(), None, None)?;
    println!("=== Item difficulty ({}) ===", report.method);
    for item in &report.items {
        println!(
            "  {:<12} depth={:<2} difficulty={:.2}",
            item.item_id, item.structural_depth, item.combined
        );
    }
    Ok(())
}

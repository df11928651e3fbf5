//! persona-engine replay binary.
//!
//! Feeds captured extractor output (or a built-in sample batch) through the
//! full pipeline and prints the reconciled profile. Useful for inspecting how
//! a profile evolves over repeated analysis rounds without any live
//! extraction backend.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin analyze -- --profile bot-1 --fixture captured.json
//! cargo run --bin analyze -- --profile bot-1 --rounds 5 --top 3
//! cargo run --bin analyze -- --profile bot-1 --config engine.yaml \
//!     --fixture captured.json --transcript chat.txt
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use persona_engine::extraction::{FixtureExtractor, StaticExtractor, TraitExtractor};
use persona_engine::{status, AnalysisOutcome, EngineConfig, PersonalityEngine};

const USAGE: &str = "\
Usage: analyze --profile <ID> [OPTIONS]

Replays extractor output through the personality engine and prints the
reconciled profile.

Options:
  --profile <ID>       Profile to reconcile into (required)
  --fixture <PATH>     JSON file of captured candidate traits; without it,
                       a built-in sample batch is replayed
  --transcript <PATH>  Transcript file handed to the extractor
  --config <PATH>      YAML engine configuration file
  --rounds <N>         Number of analysis rounds to run (default: 1)
  --top <N>            Number of top traits to print (default: 10)
  -h, --help           Show this help
";

struct Args {
    profile: String,
    fixture: Option<PathBuf>,
    transcript: Option<PathBuf>,
    config: Option<PathBuf>,
    rounds: usize,
    top: usize,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut profile: Option<String> = None;
    let mut fixture: Option<PathBuf> = None;
    let mut transcript: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut rounds: usize = 1;
    let mut top: usize = 10;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .with_context(|| format!("{flag} requires a value\n\n{USAGE}"))
        };
        match arg.as_str() {
            "--profile" => profile = Some(value("--profile")?),
            "--fixture" => fixture = Some(PathBuf::from(value("--fixture")?)),
            "--transcript" => transcript = Some(PathBuf::from(value("--transcript")?)),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--rounds" => {
                rounds = value("--rounds")?
                    .parse()
                    .context("--rounds must be a positive integer")?
            }
            "--top" => {
                top = value("--top")?
                    .parse()
                    .context("--top must be a positive integer")?
            }
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument '{other}'\n\n{USAGE}"),
        }
    }

    let profile = profile.with_context(|| format!("--profile is required\n\n{USAGE}"))?;
    if rounds == 0 {
        anyhow::bail!("--rounds must be at least 1");
    }
    Ok(Args {
        profile,
        fixture,
        transcript,
        config,
        rounds,
        top,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let extractor: Arc<dyn TraitExtractor> = match &args.fixture {
        Some(path) => Arc::new(FixtureExtractor::new(path)),
        None => Arc::new(StaticExtractor::sample()),
    };

    let transcript = match &args.transcript {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read transcript from {}", path.display()))?,
        None => String::new(),
    };

    let engine = PersonalityEngine::new(config, extractor)?;

    for round in 1..=args.rounds {
        let report = engine.analyze(&args.profile, &transcript).await?;
        let summary = match report.outcome {
            AnalysisOutcome::Applied { created, updated } => {
                format!("applied ({created} created, {updated} updated)")
            }
            AnalysisOutcome::DuplicateSkipped => "duplicate batch skipped".to_string(),
            AnalysisOutcome::NoUsableTraits => "no usable traits".to_string(),
        };
        println!(
            "round {round}/{total}: {summary}, {seen} candidate(s) seen, {rej} rejected",
            total = args.rounds,
            seen = report.candidates_seen,
            rej = report.rejected.len(),
        );
        for reason in &report.rejected {
            println!("  rejected: {reason}");
        }
        if let Some(reason) = &report.extractor_degraded {
            println!("  extractor degraded: {reason}");
        }
    }

    let snapshot = engine.snapshot(&args.profile);
    println!(
        "\nProfile '{}' v{} ({} trait(s)):",
        snapshot.profile_id(),
        snapshot.version(),
        snapshot.len()
    );
    for record in snapshot.top_traits(args.top) {
        let description = if record.description.is_empty() {
            String::new()
        } else {
            format!("  {}", record.description)
        };
        println!(
            "  {:<24} {:.3}  ({} observation(s)){}",
            record.display_name, record.strength, record.observation_count, description
        );
    }

    let status = status::current();
    println!(
        "\nEngine status: {}",
        serde_json::to_string_pretty(&status)?
    );
    Ok(())
}

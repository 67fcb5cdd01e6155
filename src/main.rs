// =============================================================================
// selftune - replay entry point
// =============================================================================
//
// Replays a JSON bar file through the decision core with a paper venue and
// prints the run summary (performance report, final parameters, last
// correlation analysis) as JSON on stdout.
//
//   selftune <bars.json>
//
// Environment:
//   SELFTUNE_BARS           bar file when no argument is given
//   SELFTUNE_CONFIG         engine config (default engine_config.json)
//   SELFTUNE_REPLAY_CONFIG  indicator periods + paper venue settings
//   SELFTUNE_SAVE_CONFIG    write the engine config with tuned parameters here
//   RUST_LOG                log filter (default info)
// =============================================================================

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use selftune::config::{EngineConfig, ParametersConfig};
use selftune::replay::{self, ReplayConfig};

fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("selftune replay starting");

    // ── 2. Config ────────────────────────────────────────────────────────
    let config_path =
        std::env::var("SELFTUNE_CONFIG").unwrap_or_else(|_| "engine_config.json".into());
    let engine_config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load engine config, using defaults");
        EngineConfig::default()
    });

    let replay_config = match std::env::var("SELFTUNE_REPLAY_CONFIG") {
        Ok(path) => ReplayConfig::load(&path)?,
        Err(_) => ReplayConfig::default(),
    };

    // ── 3. Bars ──────────────────────────────────────────────────────────
    let bars_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SELFTUNE_BARS").ok())
        .context("usage: selftune <bars.json> (or set SELFTUNE_BARS)")?;
    let bars = replay::load_bars(&bars_path)?;

    // ── 4. Replay ────────────────────────────────────────────────────────
    let summary = replay::run(engine_config.clone(), &replay_config, bars)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("failed to serialise summary")?
    );

    // ── 5. Persist tuned parameters ──────────────────────────────────────
    if let Ok(out) = std::env::var("SELFTUNE_SAVE_CONFIG") {
        let tuned = EngineConfig {
            parameters: ParametersConfig::from_set(&summary.final_parameters),
            ..engine_config
        };
        tuned.save(&out)?;
        info!(path = %out, "tuned engine config saved");
    }

    Ok(())
}

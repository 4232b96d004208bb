// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use streamwood::config::{load_and_validate_config, Config};
use streamwood::errors::ScenarioError;
use streamwood::scenarios::{run_scenario, selected_scenarios};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status when the watchdog abandoned a scenario
const WATCHDOG_EXIT_CODE: i32 = 2;

fn is_config_path(arg: &str) -> bool {
    matches!(
        Path::new(arg).extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml" | "toml")
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        println!("Usage: streamwood [config.yaml|config.toml] [scenario ...]");
        println!("Runs every scenario when none is named.");
        return Ok(());
    }

    let config = match args.first() {
        Some(first) if is_config_path(first) => {
            let path = args.remove(0);
            load_and_validate_config(&path)
                .with_context(|| format!("Failed to load configuration from {}", path))?
        }
        _ => Config::default(),
    };

    let scenarios = selected_scenarios(&config.harness, &args)?;
    println!("Streamwood reconfiguration scenarios");
    println!("════════════════════════════════════");

    let mut failures = 0;
    for scenario in scenarios {
        println!();
        match run_scenario(scenario, &config).await {
            Ok(report) => println!("{}", report),
            Err(ScenarioError::Watchdog(error)) => {
                eprintln!("Failed: {} ({})", error, scenario);
                std::process::exit(WATCHDOG_EXIT_CODE);
            }
            Err(error) => {
                eprintln!("❌ Scenario {} failed: {}", scenario, error);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} scenario(s) failed", failures);
    }
    Ok(())
}

//! `loopwright run` — drive one request through the agent loop.
//!
//! Subscribes to the event bus and prints observations as they are
//! recorded, so long runs show live progress. Ctrl+C cancels the run
//! through the runner's cancellation token; an in-flight tool call is
//! recorded as a cancelled failure before the run terminates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loopwright_agent::{GraphRunner, RunLimits};
use loopwright_core::event::{EventBus, RunEvent};
use loopwright_core::provider::Provider;
use loopwright_core::session::{Observation, Outcome};
use loopwright_providers::{OpenAiCompatProvider, ScriptedProvider};

/// Flag-level overrides of the configured run limits.
pub struct Overrides {
    pub max_iterations: Option<u32>,
    pub retry_budget: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub offline: bool,
}

pub async fn run(
    config_path: Option<PathBuf>,
    request: String,
    overrides: Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let limits = RunLimits {
        max_iterations: overrides
            .max_iterations
            .unwrap_or(config.limits.max_iterations),
        retry_budget: overrides.retry_budget.unwrap_or(config.limits.retry_budget),
        planning_retries: config.limits.planning_retries,
        tool_timeout: Duration::from_secs(
            overrides.timeout_secs.unwrap_or(config.limits.tool_timeout_secs),
        ),
        model_timeout: Duration::from_secs(config.limits.model_timeout_secs),
    };

    let provider: Arc<dyn Provider> = if overrides.offline {
        Arc::new(ScriptedProvider::empty())
    } else {
        let Some(api_key) = config.api_key.clone() else {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    LOOPWRIGHT_API_KEY = 'sk-...'");
            eprintln!("    OPENAI_API_KEY     = 'sk-...'");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!(
                "    {}",
                loopwright_config::AppConfig::config_dir()
                    .join("config.toml")
                    .display()
            );
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        };
        Arc::new(OpenAiCompatProvider::new(
            config.provider.clone(),
            config.base_url.clone(),
            api_key,
            config.limits.model_timeout_secs,
        )?)
    };

    let registry = Arc::new(loopwright_tools::default_registry(&config.tools)?);
    let event_bus = Arc::new(EventBus::default());

    // Live progress: print observations and recovery attempts as they land.
    let mut events = event_bus.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                RunEvent::ObservationRecorded { observation, .. } => {
                    print_observation(observation);
                }
                RunEvent::RecoveryAttempted {
                    attempt, tool_name, ..
                } => {
                    eprintln!("  [recovery] attempt {attempt} for '{tool_name}'");
                }
                _ => {}
            }
        }
    });

    let runner = GraphRunner::new(provider, registry, event_bus, &config.model)
        .with_temperature(config.temperature)
        .with_limits(limits);

    // Ctrl+C aborts the run cleanly.
    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("  Cancelling...");
            cancel.cancel();
        }
    });

    let result = runner.run(&request).await;
    progress.abort();

    match result {
        Ok(report) => {
            println!();
            println!("{}", report.reply);
            Ok(())
        }
        Err(run_error) => {
            eprintln!();
            eprintln!("  Run failed: {}", run_error.error);
            if !run_error.scratchpad.is_empty() {
                eprintln!("  Steps taken:");
                for observation in &run_error.scratchpad {
                    print_observation(observation);
                }
            }
            Err(Box::new(run_error))
        }
    }
}

fn print_observation(observation: &Observation) {
    match &observation.outcome {
        Outcome::Success { value } => {
            eprintln!("  [ok]   {} -> {}", observation.step.tool_name, truncate(&value.to_string()));
        }
        Outcome::Failure { kind, message } => {
            eprintln!(
                "  [fail] {} ({:?}): {}",
                observation.step.tool_name,
                kind,
                truncate(message)
            );
        }
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(LIMIT).collect();
        format!("{prefix}…")
    }
}

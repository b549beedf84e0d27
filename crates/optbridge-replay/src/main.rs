// # optbridge-replay - Scenario Replay
//
// Runs a recorded storefront scenario through the purchase-option bridge and
// prints every event the bridge dispatched, one JSON object per line.
//
// This binary is a THIN integration layer: all observation, extraction and
// event synthesis lives in optbridge-core. The binary only:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Loads the scenario and runs it against an in-memory document
// 4. Writes the collected output to stdout
//
// ## Configuration
//
// - `BRIDGE_SCENARIO`: Path to the scenario JSON file (required)
// - `BRIDGE_CONFIG`: Path to a bridge configuration JSON file (optional)
// - `BRIDGE_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
// - `BRIDGE_DISCOVERY_MAX_ATTEMPTS`: Override the discovery attempt budget
// - `BRIDGE_DISCOVERY_INTERVAL_MS`: Override the discovery retry interval
// - `BRIDGE_MONITOR`: Also print monitoring events when set to 1 or true
//
// Logs go to stderr so stdout stays machine-readable.
//
// ## Example
//
// ```bash
// export BRIDGE_SCENARIO=crates/optbridge-replay/scenarios/subscription_switch.json
// export BRIDGE_DISCOVERY_INTERVAL_MS=50
//
// optbridge-replay | jq .envelope.name
// ```

mod scenario;

use anyhow::{Context, Result};
use optbridge_core::BridgeConfig;
use std::env;
use std::io::Write;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use scenario::{Scenario, run_scenario};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ReplayExitCode {
    /// Scenario replayed completely
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Scenario failed while running
    RuntimeError = 2,
}

impl From<ReplayExitCode> for ExitCode {
    fn from(code: ReplayExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    scenario_path: String,
    config_path: Option<String>,
    log_level: String,
    max_attempts: Option<u32>,
    retry_interval_ms: Option<u64>,
    monitor: bool,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            scenario_path: env::var("BRIDGE_SCENARIO").unwrap_or_default(),
            config_path: env::var("BRIDGE_CONFIG").ok().filter(|p| !p.is_empty()),
            log_level: env::var("BRIDGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            max_attempts: parse_var("BRIDGE_DISCOVERY_MAX_ATTEMPTS")?,
            retry_interval_ms: parse_var("BRIDGE_DISCOVERY_INTERVAL_MS")?,
            monitor: env::var("BRIDGE_MONITOR")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.scenario_path.is_empty() {
            anyhow::bail!(
                "BRIDGE_SCENARIO is required. \
                Set it via: export BRIDGE_SCENARIO=path/to/scenario.json"
            );
        }

        if !std::path::Path::new(&self.scenario_path).is_file() {
            anyhow::bail!("BRIDGE_SCENARIO does not exist: {}", self.scenario_path);
        }

        if let Some(max_attempts) = self.max_attempts
            && (max_attempts == 0 || max_attempts > 1000)
        {
            anyhow::bail!(
                "BRIDGE_DISCOVERY_MAX_ATTEMPTS must be between 1 and 1000. Got: {}",
                max_attempts
            );
        }

        if let Some(interval) = self.retry_interval_ms
            && (!(1..=60_000).contains(&interval))
        {
            anyhow::bail!(
                "BRIDGE_DISCOVERY_INTERVAL_MS must be between 1 and 60000. Got: {}",
                interval
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "BRIDGE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the bridge configuration, applying environment overrides
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config_path {
            Some(path) => BridgeConfig::from_file(path)
                .with_context(|| format!("failed to load BRIDGE_CONFIG {}", path))?,
            None => BridgeConfig::default(),
        };

        if let Some(max_attempts) = self.max_attempts {
            config.discovery.max_attempts = max_attempts;
        }
        if let Some(interval) = self.retry_interval_ms {
            config.discovery.retry_interval_ms = interval;
        }

        config.validate()?;
        Ok(config)
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a positive integer. Got: {}", name, raw)),
        _ => Ok(None),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ReplayExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
        return ReplayExitCode::ConfigError.into();
    }

    let bridge_config = match config.bridge_config() {
        Ok(bridge_config) => bridge_config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ReplayExitCode::ConfigError.into();
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ReplayExitCode::ConfigError.into();
        }
    };

    match runtime.block_on(replay(&config, bridge_config)) {
        Ok(()) => {
            info!("Replay finished");
            ReplayExitCode::CleanShutdown.into()
        }
        Err(e) => {
            error!("Replay failed: {:#}", e);
            ReplayExitCode::RuntimeError.into()
        }
    }
}

async fn replay(config: &Config, bridge_config: BridgeConfig) -> Result<()> {
    let scenario = Scenario::load(&config.scenario_path).await?;
    info!(
        scenario = %config.scenario_path,
        steps = scenario.steps.len(),
        "Replaying scenario"
    );

    let lines = run_scenario(&scenario, bridge_config, config.monitor).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in &lines {
        serde_json::to_writer(&mut out, line)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

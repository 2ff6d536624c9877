//! Startup configuration from command-line flags and environment.
//!
//! | source                          | meaning                                  |
//! |---------------------------------|------------------------------------------|
//! | `ALPHAGENOME_API_KEY`           | engine credential (required)             |
//! | `GENOME_GATEWAY_ENGINE`         | engine program (required without flag)   |
//! | `GENOME_GATEWAY_TIMEOUT_SECS`   | per-invocation timeout (default: none)   |
//! | `--engine <program>`            | overrides `GENOME_GATEWAY_ENGINE`        |
//! | `--engine-arg <arg>`            | leading engine argument, repeatable      |
//! | `--timeout-secs <n>`            | overrides `GENOME_GATEWAY_TIMEOUT_SECS`  |
//! | `--workers <n>`                 | default batch worker bound (1-10)        |
//! | `--organism <name>`             | default organism                         |
//!
//! Flags also accept the `--flag=value` form.
//!
//! There is no default engine. The configured program is launched once per
//! call with the `--engine-arg` values first, then the operation name and its
//! kebab-case flags; list-valued flags arrive as JSON text. It must read the
//! credential from `ALPHAGENOME_API_KEY`, read one JSON object of bulky inputs
//! from stdin, and write a single result envelope to stdout.

use std::time::Duration;

use crate::engine::{Credential, EngineCommand, ProcessEngine, CREDENTIAL_ENV};
use crate::error::ConfigError;
use crate::genome::{MAX_WORKERS, MIN_WORKERS};
use crate::tools::Defaults;

pub const ENGINE_ENV: &str = "GENOME_GATEWAY_ENGINE";
pub const TIMEOUT_ENV: &str = "GENOME_GATEWAY_TIMEOUT_SECS";

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub engine: EngineCommand,
    pub credential: Credential,
    pub timeout: Option<Duration>,
    pub defaults: Defaults,
}

impl GatewayConfig {
    /// Load from the process arguments and environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(std::env::args().skip(1), |name| std::env::var(name).ok())
    }

    /// Load from explicit arguments (without the program name) and an
    /// environment lookup.
    pub fn from_sources(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let credential = env(CREDENTIAL_ENV)
            .map(|raw| raw.trim().to_owned())
            .filter(|key| !key.is_empty())
            .map(Credential::new)
            .ok_or(ConfigError::MissingCredential {
                var: CREDENTIAL_ENV,
            })?;

        let flags = Flags::parse(args)?;

        let program = flags
            .engine
            .or_else(|| env(ENGINE_ENV).filter(|p| !p.trim().is_empty()))
            .ok_or(ConfigError::MissingEngine { var: ENGINE_ENV })?;
        let args = flags.engine_args;
        let resolved = which::which(&program).map_err(|e| ConfigError::EngineNotFound {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let timeout = match flags.timeout_secs {
            Some(raw) => Some(parse_timeout("--timeout-secs", &raw)?),
            None => env(TIMEOUT_ENV)
                .map(|raw| parse_timeout(TIMEOUT_ENV, &raw))
                .transpose()?,
        };

        let mut defaults = Defaults::default();
        if let Some(raw) = flags.workers {
            defaults.workers = parse_workers(&raw)?;
        }
        if let Some(raw) = flags.organism {
            let organism = raw.trim().to_ascii_lowercase();
            if organism.is_empty() {
                return Err(invalid("--organism", "must not be empty"));
            }
            defaults.organism = organism;
        }

        Ok(Self {
            engine: EngineCommand {
                program: resolved,
                args,
            },
            credential,
            timeout,
            defaults,
        })
    }

    /// The engine bridge described by this configuration.
    pub fn engine(&self) -> ProcessEngine {
        ProcessEngine::new(self.engine.clone(), self.credential.clone()).with_timeout(self.timeout)
    }
}

#[derive(Debug, Default)]
struct Flags {
    engine: Option<String>,
    engine_args: Vec<String>,
    timeout_secs: Option<String>,
    workers: Option<String>,
    organism: Option<String>,
}

impl Flags {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let mut flags = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
                None => (arg, None),
            };
            let mut value = || {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| invalid(&name, "missing value"))
            };
            match name.as_str() {
                "--engine" => flags.engine = Some(value()?),
                "--engine-arg" => flags.engine_args.push(value()?),
                "--timeout-secs" => flags.timeout_secs = Some(value()?),
                "--workers" => flags.workers = Some(value()?),
                "--organism" => flags.organism = Some(value()?),
                _ => return Err(invalid(&name, "unknown flag")),
            }
        }
        Ok(flags)
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

fn parse_timeout(name: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(invalid(
            name,
            format!("expected a positive number of seconds, got '{raw}'"),
        )),
    }
}

fn parse_workers(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if (MIN_WORKERS..=MAX_WORKERS).contains(&n) => Ok(n),
        _ => Err(invalid(
            "--workers",
            format!("expected {MIN_WORKERS}-{MAX_WORKERS}, got '{raw}'"),
        )),
    }
}

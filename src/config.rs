// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Dispatcher sizing, front-end selection, Telegram credentials and metrics listener

use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use vacbot_core::limits;
use vacbot_core::{DispatcherConfig, PoolConfig, ShutdownTimeouts};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    #[serde(default)]
    pub frontend: FrontendSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ─── DispatcherSettings ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Baseline worker count
    #[serde(default = "limits::default_min_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_max_workers_multiplier")]
    pub max_workers_multiplier: usize,
    #[serde(default = "default_worker_idle_timeout_secs")]
    pub worker_idle_timeout_secs: u64,
    /// Memory assumed per queued task when deriving the queue bound
    #[serde(default = "default_task_memory_budget_bytes")]
    pub task_memory_budget_bytes: u64,
    /// Explicit queue bound; derived from available memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queued_tasks: Option<usize>,
    #[serde(default = "default_graceful_drain_timeout_secs")]
    pub graceful_drain_timeout_secs: u64,
    #[serde(default = "default_forced_cancel_timeout_secs")]
    pub forced_cancel_timeout_secs: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            worker_threads: limits::default_min_workers(),
            max_workers_multiplier: default_max_workers_multiplier(),
            worker_idle_timeout_secs: default_worker_idle_timeout_secs(),
            task_memory_budget_bytes: default_task_memory_budget_bytes(),
            max_queued_tasks: None,
            graceful_drain_timeout_secs: default_graceful_drain_timeout_secs(),
            forced_cancel_timeout_secs: default_forced_cancel_timeout_secs(),
        }
    }
}

impl DispatcherSettings {
    /// Queue bound to use: the explicit override, or what fits in available memory
    pub fn resolved_max_queued_tasks(&self) -> usize {
        self.max_queued_tasks.unwrap_or_else(|| {
            limits::max_queued_tasks(limits::available_memory(), self.task_memory_budget_bytes)
        })
    }

    /// Engine configuration derived from these settings
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        let pool = PoolConfig::new(self.worker_threads)
            .with_max_workers(self.worker_threads.saturating_mul(self.max_workers_multiplier))
            .with_worker_idle_timeout(Duration::from_secs(self.worker_idle_timeout_secs))
            .with_max_queued_tasks(self.resolved_max_queued_tasks());

        DispatcherConfig::default()
            .with_pool(pool)
            .with_shutdown_timeouts(ShutdownTimeouts {
                graceful_drain: Duration::from_secs(self.graceful_drain_timeout_secs),
                forced_cancel: Duration::from_secs(self.forced_cancel_timeout_secs),
            })
    }
}

fn default_max_workers_multiplier() -> usize {
    limits::DEFAULT_MAX_WORKERS_MULTIPLIER
}

fn default_worker_idle_timeout_secs() -> u64 {
    60
}

fn default_task_memory_budget_bytes() -> u64 {
    limits::DEFAULT_TASK_MEMORY_BUDGET
}

fn default_graceful_drain_timeout_secs() -> u64 {
    60
}

fn default_forced_cancel_timeout_secs() -> u64 {
    30
}

// ─── FrontendSettings ───────────────────────────────────────────

/// Which front-end the bot talks through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontendKind {
    #[default]
    Terminal,
    Telegram,
}

impl FromStr for FrontendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminal" | "cli" => Ok(Self::Terminal),
            "telegram" => Ok(Self::Telegram),
            other => anyhow::bail!("Unknown frontend '{}', expected 'terminal' or 'telegram'", other),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontendSettings {
    #[serde(default)]
    pub kind: FrontendKind,
}

// ─── TelegramConfig ─────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub allowed_users: Vec<i64>,
    #[serde(default)]
    pub allowed_chats: Vec<i64>,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("allowed_chats", &self.allowed_chats)
            .finish()
    }
}

// ─── MetricsConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address of the Prometheus scrape endpoint; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. VACBOT_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/vacbot/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("VACBOT_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the first config file found, with environment
    /// variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from `path` when given (it must exist), otherwise
    /// search the default locations
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(explicit) => Some(explicit.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut config = if let Some(config_path) = config_path {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("VACBOT_WORKER_THREADS") {
            self.dispatcher.worker_threads = val.parse().with_context(|| {
                format!("VACBOT_WORKER_THREADS must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("VACBOT_FRONTEND") {
            self.frontend.kind = val.parse()?;
        }
        if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
            match self.telegram {
                Some(ref mut telegram) => telegram.bot_token = val,
                None => {
                    self.telegram = Some(TelegramConfig {
                        bot_token: val,
                        allowed_users: Vec::new(),
                        allowed_chats: Vec::new(),
                    })
                }
            }
        }
        if let Ok(val) = std::env::var("VACBOT_METRICS_LISTEN") {
            self.metrics.listen = Some(val.parse().with_context(|| {
                format!(
                    "VACBOT_METRICS_LISTEN must be a socket address like 127.0.0.1:9090, got: {}",
                    val
                )
            })?);
        }
        Ok(())
    }

    /// Check value ranges and that the selected front-end is configured
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.worker_threads < 1 {
            anyhow::bail!("dispatcher.worker_threads must be at least 1");
        }
        if self.dispatcher.max_workers_multiplier < 1 {
            anyhow::bail!("dispatcher.max_workers_multiplier must be at least 1");
        }
        if self.dispatcher.task_memory_budget_bytes < 1 {
            anyhow::bail!("dispatcher.task_memory_budget_bytes must be at least 1");
        }

        if self.frontend.kind == FrontendKind::Telegram {
            match self.telegram {
                Some(ref telegram) if !telegram.bot_token.trim().is_empty() => {}
                _ => anyhow::bail!(
                    "telegram.bot_token is required when frontend.kind = \"telegram\" (set in config.toml or TELEGRAM_BOT_TOKEN env var)"
                ),
            }
        }

        Ok(())
    }
}

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::heal::healer::HealerConfig;
use crate::heal::prompt::DEFAULT_MARKUP_BUDGET;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "resilient-selectors",
    version,
    about = "Stable locator generation, UI drift detection and selector self-healing"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Ollama API endpoint
    #[arg(long, global = true)]
    pub ollama_endpoint: Option<String>,

    /// Ollama model name
    #[arg(long, global = true)]
    pub ollama_model: Option<String>,

    /// Snapshot directory (overrides config file)
    #[arg(long, global = true)]
    pub snapshot_dir: Option<String>,

    /// Path to config file (default: resilient-selectors.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print interactive elements and their ranked locators as JSON
    Extract {
        /// HTML file to read
        #[arg(long)]
        file: String,
    },

    /// Print landmark regions of a page
    Sections {
        #[arg(long)]
        file: String,
    },

    /// Print forms and their labelled fields
    Forms {
        #[arg(long)]
        file: String,
    },

    /// Structural diff of two HTML files
    Diff {
        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,
    },

    /// Manage stored page snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },

    /// Propose replacement locators for a broken selector
    Heal {
        /// The selector that no longer resolves
        #[arg(long)]
        selector: String,

        /// What the element is supposed to be
        #[arg(long)]
        description: Option<String>,

        /// Heal against the latest stored snapshot of this URL
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,

        /// Heal against an HTML file instead of a stored snapshot
        #[arg(long)]
        file: Option<String>,

        /// Previous HTML file for diff context (with --file)
        #[arg(long, requires = "file")]
        previous: Option<String>,
    },

    /// Heal every failure in a JSON file against stored snapshots
    HealBatch {
        /// JSON array of selector failures
        #[arg(long)]
        failures: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Capture an HTML file as a new snapshot of a URL
    Save {
        #[arg(long)]
        url: String,

        #[arg(long)]
        file: String,

        #[arg(long)]
        test_file: Option<String>,
    },

    /// List snapshots for a URL, newest first
    List {
        #[arg(long)]
        url: String,
    },

    /// Show the latest (or n-th previous) snapshot of a URL
    Latest {
        #[arg(long)]
        url: String,

        /// 0 = latest, 1 = the one before it, ...
        #[arg(long, default_value_t = 0)]
        previous: usize,
    },

    /// Line diff of two snapshots
    Compare {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// Delete snapshots older than the retention window
    Cleanup {
        /// Retention in days (default: from config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Delete one snapshot
    Delete {
        #[arg(long)]
        id: String,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `resilient-selectors.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub heal: HealConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealConfig {
    #[serde(default = "default_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_markup_budget")]
    pub markup_budget: usize,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            model_timeout_secs: default_timeout_secs(),
            markup_budget: default_markup_budget(),
            max_candidates: default_max_candidates(),
            min_confidence: default_min_confidence(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl HealConfig {
    pub fn to_healer_config(&self) -> HealerConfig {
        HealerConfig {
            model_timeout: Duration::from_secs(self.model_timeout_secs),
            markup_budget: self.markup_budget,
            max_candidates: self.max_candidates,
            min_confidence: self.min_confidence,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OllamaConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

// Serde default helpers
fn default_snapshot_dir() -> String { ".snapshots".to_string() }
fn default_retention_days() -> u32 { 30 }
fn default_timeout_secs() -> u64 { 30 }
fn default_markup_budget() -> usize { DEFAULT_MARKUP_BUDGET }
fn default_max_candidates() -> usize { 5 }
fn default_min_confidence() -> f32 { 0.7 }
fn default_max_output_tokens() -> u32 { 2048 }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or("resilient-selectors.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = config_path, error = %e, "ignoring malformed config file");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

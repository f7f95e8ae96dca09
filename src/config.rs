//! Loading the local question bank and file-serving options from TOML.
//!
//! See `BankConfig` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::QuestionSet;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BankConfig {
  #[serde(default)]
  pub questionsets: Vec<QuestionSet>,
  #[serde(default)]
  pub files: FilesConfig,
}

/// Where previously uploaded answer files are served from; the file-upload
/// answer box resolves stored tokens against this base.
#[derive(Clone, Debug, Deserialize)]
pub struct FilesConfig {
  #[serde(default = "default_file_base_url")]
  pub base_url: String,
}

impl Default for FilesConfig {
  fn default() -> Self {
    Self { base_url: default_file_base_url() }
  }
}

fn default_file_base_url() -> String {
  "/files".into()
}

/// Attempt to load `BankConfig` from BANK_CONFIG_PATH. On any parsing/IO
/// error, returns None.
pub fn load_bank_config_from_env() -> Option<BankConfig> {
  let path = std::env::var("BANK_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<BankConfig>(&s) {
      Ok(cfg) => {
        info!(target: "assess_backend", %path, sets = cfg.questionsets.len(), "Loaded question bank (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "assess_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "assess_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

//! Settings from `config.yaml` in the user config dir, overridden by
//! environment variables.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::actions::Sender;
use crate::gateway::rest::RestGateway;
use crate::gateway::sqlite::SqliteGateway;
use crate::gateway::Gateway;
use crate::view::EmptyPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "sqlite" => Ok(Backend::Local),
            "remote" | "supabase" | "rest" => Ok(Backend::Remote),
            other => Err(anyhow!("Unknown backend '{}' (expected local or remote)", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub database_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    /// Zero disables polling for remote subscriptions.
    pub poll_interval_secs: u64,
    pub empty_policy: EmptyPolicy,
    pub sender_name: String,
    pub organization: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            supabase_url: None,
            supabase_anon_key: None,
            database_path: None,
            request_timeout_secs: 15,
            poll_interval_secs: 10,
            empty_policy: EmptyPolicy::Fallback,
            sender_name: "Dr. Muddu Surendra Nehru MD".to_string(),
            organization: "Homa Health".to_string(),
        }
    }
}

impl Config {
    /// Config file (if any) plus environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_file() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn default_file() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "outreach")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn default_database_path() -> PathBuf {
        // Use XDG data directory or fallback
        match directories::ProjectDirs::from("", "", "outreach") {
            Some(dirs) => dirs.data_dir().join("outreach.db"),
            None => PathBuf::from("outreach.db"),
        }
    }

    /// Environment overrides; `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(*k))
                .find(|v| !v.trim().is_empty())
        };
        if let Some(url) = first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = first(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(backend) = first(&["OUTREACH_BACKEND"]) {
            self.backend = backend.parse()?;
        }
        if let Some(path) = first(&["OUTREACH_DB"]) {
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Self::default_database_path)
    }

    pub fn sender(&self) -> Sender {
        Sender {
            name: self.sender_name.clone(),
            organization: self.organization.clone(),
        }
    }

    pub fn remote_gateway(&self) -> Result<RestGateway> {
        let url = self.supabase_url.as_deref().ok_or_else(|| {
            anyhow!("Remote backend needs a database URL. Set SUPABASE_URL or supabase_url in config.yaml")
        })?;
        let key = self.supabase_anon_key.as_deref().ok_or_else(|| {
            anyhow!("Remote backend needs an API key. Set SUPABASE_ANON_KEY or supabase_anon_key in config.yaml")
        })?;
        let mut gateway = RestGateway::new(url, key, Duration::from_secs(self.request_timeout_secs))
            .context("Failed to build HTTP client")?;
        if self.poll_interval_secs > 0 {
            gateway = gateway.with_poll_interval(Duration::from_secs(self.poll_interval_secs));
        }
        Ok(gateway)
    }

    pub fn local_gateway(&self) -> Result<SqliteGateway> {
        let path = self.database_path();
        SqliteGateway::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))
    }

    /// Gateway for the configured backend. The local database must have
    /// been initialized with `outreach init`.
    pub fn gateway(&self) -> Result<Arc<dyn Gateway>> {
        match self.backend {
            Backend::Remote => Ok(Arc::new(self.remote_gateway()?)),
            Backend::Local => {
                let db = self.local_gateway()?;
                if !db.is_initialized()? {
                    return Err(anyhow!("Database not initialized. Run 'outreach init' first."));
                }
                Ok(Arc::new(db))
            }
        }
    }
}

use crate::error::AppError;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "token-meter";

pub const KEY_BASE_URL: &str = "BASE_URL";
pub const KEY_API_SERVER: &str = "API_SERVER";
pub const KEY_SHOW_BALANCE: &str = "SHOW_BALANCE";
pub const KEY_SHOW_DETAIL: &str = "SHOW_DETAIL";
pub const KEY_SHOW_GITHUB_ICON: &str = "SHOW_GITHUB_ICON";

pub const RECOGNIZED_KEYS: [&str; 5] = [
    KEY_BASE_URL,
    KEY_API_SERVER,
    KEY_SHOW_BALANCE,
    KEY_SHOW_DETAIL,
    KEY_SHOW_GITHUB_ICON,
];

pub const DEFAULT_QUOTA_PER_UNIT: f64 = 500_000.0;
pub const DEFAULT_EXPORT_FILENAME: &str = "data.csv";
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Names older deployments used for the same settings.
pub fn legacy_alias(key: &str) -> Option<&'static str> {
    match key {
        KEY_BASE_URL => Some("REACT_APP_BASE_URL"),
        KEY_API_SERVER => Some("REACT_APP_SERVER"),
        KEY_SHOW_BALANCE => Some("REACT_APP_SHOW_BALANCE"),
        KEY_SHOW_DETAIL => Some("REACT_APP_SHOW_DETAIL"),
        KEY_SHOW_GITHUB_ICON => Some("REACT_APP_SHOW_ICONGITHUB"),
        _ => None,
    }
}

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("TOKEN_METER_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "tokenmeter", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".token-meter"))
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn logs_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("logs"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn default_env_config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("env-config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    fs::create_dir_all(logs_dir()?)?;
    Ok(())
}

/// Presentation and transport policy persisted in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub quota_per_unit: f64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub export_filename: String,
    pub export_dir: Option<PathBuf>,
    pub page_size: usize,
    pub env_config_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            quota_per_unit: DEFAULT_QUOTA_PER_UNIT,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            export_filename: DEFAULT_EXPORT_FILENAME.into(),
            export_dir: None,
            page_size: DEFAULT_PAGE_SIZE,
            env_config_path: None,
        }
    }
}

impl AppSettings {
    pub fn env_config_path(&self) -> Result<PathBuf, AppError> {
        match &self.env_config_path {
            Some(path) => Ok(path.clone()),
            None => default_env_config_path(),
        }
    }

    pub fn export_dir(&self) -> Result<PathBuf, AppError> {
        if let Some(dir) = &self.export_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = UserDirs::new().and_then(|u| u.download_dir().map(Path::to_path_buf)) {
            return Ok(dir);
        }
        data_dir()
    }
}

fn normalize_settings(settings: &mut AppSettings) -> bool {
    let defaults = AppSettings::default();
    let mut changed = false;

    if !settings.quota_per_unit.is_finite() || settings.quota_per_unit <= 0.0 {
        settings.quota_per_unit = defaults.quota_per_unit;
        changed = true;
    }
    if settings.page_size == 0 {
        settings.page_size = defaults.page_size;
        changed = true;
    }
    if settings.request_timeout_secs == 0 {
        settings.request_timeout_secs = defaults.request_timeout_secs;
        changed = true;
    }
    if settings.connect_timeout_secs == 0 {
        settings.connect_timeout_secs = defaults.connect_timeout_secs;
        changed = true;
    }
    let trimmed = settings.export_filename.trim();
    if trimmed.is_empty() {
        settings.export_filename = defaults.export_filename;
        changed = true;
    } else if trimmed != settings.export_filename {
        settings.export_filename = trimmed.to_string();
        changed = true;
    }

    changed
}

pub fn load_settings() -> Result<AppSettings, AppError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AppSettings::default());
    }

    let raw = fs::read_to_string(&path)?;
    let mut parsed: AppSettings = toml::from_str(&raw)?;
    if normalize_settings(&mut parsed) {
        save_settings(&parsed)?;
    }
    Ok(parsed)
}

pub fn save_settings(settings: &AppSettings) -> Result<(), AppError> {
    ensure_dirs()?;
    let raw = toml::to_string_pretty(settings)?;
    fs::write(config_path()?, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    if !config_path()?.exists() {
        save_settings(&AppSettings::default())?;
    }
    Ok(())
}

/// Resolves environment-style keys from two immutable layers: the runtime
/// override artifact first, then the process environment captured at startup.
/// Keys that come up empty in both layers are retried under their legacy alias.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    runtime: HashMap<String, String>,
    fallback: HashMap<String, String>,
}

impl ConfigResolver {
    pub fn new(runtime: HashMap<String, String>, fallback: HashMap<String, String>) -> Self {
        Self { runtime, fallback }
    }

    pub fn from_environment(artifact: &Path) -> Self {
        let runtime = read_env_artifact(artifact);
        Self::new(runtime, env_layer(std::env::vars_os()))
    }

    fn read_value(&self, key: &str) -> Option<&str> {
        [&self.runtime, &self.fallback]
            .into_iter()
            .filter_map(|layer| layer.get(key))
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }

    pub fn resolve(&self, key: &str) -> String {
        if let Some(value) = self.read_value(key) {
            return value.to_string();
        }
        legacy_alias(key)
            .and_then(|alias| self.read_value(alias))
            .unwrap_or_default()
            .to_string()
    }

    /// Anything other than the literal `"true"` reads as off.
    pub fn toggle(&self, key: &str) -> bool {
        self.resolve(key) == "true"
    }
}

/// Process environment as a lookup layer. Pairs that are not valid UTF-8
/// cannot name a recognized key and are skipped.
fn env_layer(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn read_env_artifact(path: &Path) -> HashMap<String, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return HashMap::new(),
    };
    match parse_env_artifact(&raw) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable env artifact");
            HashMap::new()
        }
    }
}

fn parse_env_artifact(raw: &str) -> Result<HashMap<String, String>, AppError> {
    let table: toml::Table = toml::from_str(raw)?;
    let mut out = HashMap::new();
    for (key, value) in table {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Integer(i) => i.to_string(),
            _ => continue,
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// The runtime-injectable override artifact written by `env-prepare`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvArtifact {
    #[serde(rename = "BASE_URL")]
    pub base_url: String,
    #[serde(rename = "API_SERVER")]
    pub api_server: String,
    #[serde(rename = "SHOW_BALANCE")]
    pub show_balance: String,
    #[serde(rename = "SHOW_DETAIL")]
    pub show_detail: String,
    #[serde(rename = "SHOW_GITHUB_ICON")]
    pub show_github_icon: String,
}

impl Default for EnvArtifact {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_server: String::new(),
            show_balance: "true".into(),
            show_detail: "true".into(),
            show_github_icon: "true".into(),
        }
    }
}

impl EnvArtifact {
    fn apply(&mut self, key: &str, value: String) {
        if value.is_empty() {
            return;
        }
        match key {
            KEY_BASE_URL => self.base_url = value,
            KEY_API_SERVER => self.api_server = value,
            KEY_SHOW_BALANCE => self.show_balance = value,
            KEY_SHOW_DETAIL => self.show_detail = value,
            KEY_SHOW_GITHUB_ICON => self.show_github_icon = value,
            _ => {}
        }
    }
}

/// Builds the override artifact from a dotenv file, keeping only recognized
/// keys and filling the rest from defaults. A missing file yields defaults.
pub fn prepare_env_artifact(env_file: &Path) -> Result<EnvArtifact, AppError> {
    let mut artifact = EnvArtifact::default();
    if !env_file.exists() {
        return Ok(artifact);
    }

    for item in dotenvy::from_path_iter(env_file)? {
        let (key, value) = item?;
        artifact.apply(key.trim(), value.trim().to_string());
    }
    Ok(artifact)
}

pub fn write_env_artifact(artifact: &EnvArtifact, out: &Path) -> Result<(), AppError> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(artifact)?;
    let content = format!(
        "# Runtime overrides; regenerate with `token-meter env-prepare` or replace at deploy time.\n{body}"
    );
    fs::write(out, content)?;
    Ok(())
}

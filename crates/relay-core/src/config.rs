//! Configuration for stock-relay
//!
//! Host, port, tunnel name and file locations used to be conventions repeated
//! across independent scripts. They now live in one [`RelayConfig`] that is
//! loaded once, validated once and passed to every component.
//!
//! Supports a user-level (`~/.config/stock-relay/config.json`) and a
//! project-level (`./stock-relay.json`) file. Both are optional; the project
//! file is deep-merged over the user file, and missing keys fall back to the
//! defaults below.
//!
//! # Example
//!
//! ```json
//! {
//!   "server": { "port": 8001 },
//!   "tunnel": { "name": "stock-analysis", "hostname": "stocks.example.com" },
//!   "environment": { "variant": "uv" },
//!   "launch": { "readiness": { "probe": "http", "path": "/sse" } }
//! }
//! ```

use crate::error::{RelayError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Project-level configuration file name
pub const PROJECT_CONFIG_FILE: &str = "stock-relay.json";

/// Packages written to a missing manifest, in this order
pub const DEFAULT_PACKAGES: &[&str] = &[
    "mcp[cli]",
    "yfinance",
    "pandas",
    "numpy",
    "matplotlib",
    "seaborn",
    "statsmodels",
];

/// How the server's execution environment is prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Pre-bootstrapped virtualenv, interpreter invoked directly
    #[default]
    Venv,
    /// `uv` resolves and runs in one step
    Uv,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Venv => write!(f, "venv"),
            Self::Uv => write!(f, "uv"),
        }
    }
}

/// Readiness probe kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// TCP connect to host:port
    #[default]
    Tcp,
    /// HTTP GET, any response counts as ready
    Http,
    /// Grace period only
    None,
}

/// What happens to the children when the wait ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// SIGTERM both, then SIGKILL after the grace period
    #[default]
    Terminate,
    /// Leave both running; the operator kills them manually
    Detach,
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub tunnel: TunnelConfig,
    pub environment: EnvironmentConfig,
    pub launch: LaunchConfig,
}

/// Analysis server invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Server entry point, relative to the working directory
    pub script: PathBuf,
    /// Value of `--transport`
    pub transport: String,
    /// Appended after the fixed flags
    pub extra_args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8001,
            script: PathBuf::from("server.py"),
            transport: "sse".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Tunnel client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TunnelConfig {
    /// Human-readable tunnel name used for create/run
    pub name: String,
    /// Tunnel client executable
    pub binary: String,
    /// Configuration file read by the tunnel client
    pub config_file: PathBuf,
    /// Public hostname, only used in the DNS guidance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            name: "stock-analysis".to_string(),
            binary: "cloudflared".to_string(),
            config_file: PathBuf::from("config.yml"),
            hostname: None,
        }
    }
}

/// Isolated environment and manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentConfig {
    pub variant: Variant,
    pub dir: PathBuf,
    pub manifest: PathBuf,
    /// Interpreter used to create a venv
    pub python: String,
    /// `uv` executable
    pub uv: String,
    /// Default manifest content
    pub packages: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Venv,
            dir: PathBuf::from(".venv"),
            manifest: PathBuf::from("requirements.txt"),
            python: "python3".to_string(),
            uv: "uv".to_string(),
            packages: DEFAULT_PACKAGES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl EnvironmentConfig {
    /// Path of an executable inside the environment
    pub fn bin(&self, name: &str) -> PathBuf {
        if cfg!(windows) {
            self.dir.join("Scripts").join(format!("{name}.exe"))
        } else {
            self.dir.join("bin").join(name)
        }
    }
}

/// Launch sequencing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchConfig {
    /// Minimum delay between server and tunnel spawn
    pub grace_period_ms: u64,
    pub readiness: ReadinessConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 3000,
            readiness: ReadinessConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl LaunchConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Readiness probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadinessConfig {
    pub probe: ProbeKind,
    /// Request path for the HTTP probe
    pub path: String,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-attempt timeout
    pub timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe: ProbeKind::Tcp,
            path: "/sse".to_string(),
            max_attempts: 20,
            initial_backoff_ms: 250,
            max_backoff_ms: 2000,
            timeout_ms: 1000,
        }
    }
}

impl ReadinessConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            2.0,
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Shutdown settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShutdownConfig {
    pub policy: ShutdownPolicy,
    /// Time allowed between SIGTERM and SIGKILL
    pub grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            policy: ShutdownPolicy::Terminate,
            grace_ms: 5000,
        }
    }
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Command-line values that take precedence over every file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tunnel_name: Option<String>,
    pub hostname: Option<String>,
    pub variant: Option<Variant>,
    pub shutdown_policy: Option<ShutdownPolicy>,
}

impl RelayConfig {
    /// Load configuration from a single file
    ///
    /// Keys missing from the file take their default values and `${VAR}`
    /// references are expanded before parsing.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigError`] when the file cannot be read or
    /// parsed, and [`RelayError::EnvVarNotFound`] when a referenced variable
    /// is unset.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use relay_core::RelayConfig;
    ///
    /// let config = RelayConfig::from_file("stock-relay.json")?;
    /// println!("Serving on {}", config.local_url());
    /// # Ok::<(), relay_core::RelayError>(())
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let value = read_value(path.as_ref())?;
        Self::from_value(value)
    }

    /// Load merged configuration (user + project)
    ///
    /// Search order, later entries winning key by key:
    /// 1. Built-in defaults
    /// 2. `~/.config/stock-relay/config.json`
    /// 3. `./stock-relay.json`
    ///
    /// # Arguments
    ///
    /// * `explicit` - When set, only this file is read and it must exist.
    ///   Otherwise the user-level and project-level files are each optional.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use relay_core::{ConfigOverrides, RelayConfig};
    ///
    /// let mut config = RelayConfig::load_merged(None)?;
    /// config.apply_overrides(ConfigOverrides {
    ///     port: Some(9001),
    ///     ..Default::default()
    /// });
    /// config.validate()?;
    /// # Ok::<(), relay_core::RelayError>(())
    /// ```
    pub fn load_merged(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut merged = Value::Object(serde_json::Map::new());

        if let Some(user) = user_config_path().filter(|p| p.exists()) {
            debug!("Loading user config from {}", user.display());
            merge_values(&mut merged, read_value(&user)?);
        }

        let project = PathBuf::from(PROJECT_CONFIG_FILE);
        if project.exists() {
            debug!("Loading project config from {}", project.display());
            merge_values(&mut merged, read_value(&project)?);
        }

        Self::from_value(merged)
    }

    fn from_value(mut value: Value) -> Result<Self> {
        resolve_env_vars(&mut value)?;
        serde_json::from_value(value)
            .map_err(|e| RelayError::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(name) = overrides.tunnel_name {
            self.tunnel.name = name;
        }
        if let Some(hostname) = overrides.hostname {
            self.tunnel.hostname = Some(hostname);
        }
        if let Some(variant) = overrides.variant {
            self.environment.variant = variant;
        }
        if let Some(policy) = overrides.shutdown_policy {
            self.launch.shutdown.policy = policy;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(RelayError::ConfigError("server.host must not be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(RelayError::ConfigError("server.port must be greater than 0".to_string()));
        }

        let name = &self.tunnel.name;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(RelayError::ConfigError(format!(
                "tunnel.name must be a non-empty single word, got '{name}'"
            )));
        }

        // Registration replaces every occurrence of the name in the tunnel
        // config file, which would also rewrite part of such a hostname
        if let Some(hostname) = &self.tunnel.hostname {
            if hostname.contains(name.as_str()) {
                return Err(RelayError::ConfigError(format!(
                    "tunnel.hostname '{hostname}' must not contain tunnel.name '{name}', \
                     rename the tunnel or pick another hostname"
                )));
            }
        }

        if self.tunnel.binary.trim().is_empty() {
            return Err(RelayError::ConfigError("tunnel.binary must not be empty".to_string()));
        }

        if self.environment.packages.is_empty() {
            return Err(RelayError::ConfigError(
                "environment.packages must list at least one package".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for package in &self.environment.packages {
            if package.trim().is_empty() || package.contains('\n') {
                return Err(RelayError::ConfigError(format!(
                    "Invalid package name '{package}'"
                )));
            }
            if !seen.insert(package.as_str()) {
                return Err(RelayError::ConfigError(format!(
                    "Duplicate package '{package}' in environment.packages"
                )));
            }
        }

        let readiness = &self.launch.readiness;
        if readiness.probe != ProbeKind::None && readiness.max_attempts == 0 {
            return Err(RelayError::ConfigError(
                "launch.readiness.maxAttempts must be greater than 0".to_string(),
            ));
        }

        if readiness.probe == ProbeKind::Http && !readiness.path.starts_with('/') {
            return Err(RelayError::ConfigError(format!(
                "launch.readiness.path must start with '/', got '{}'",
                readiness.path
            )));
        }

        Ok(())
    }

    /// `host:port` of the analysis server
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Local URL the tunnel routes to
    pub fn local_url(&self) -> String {
        format!("http://{}", self.server_address())
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()?;

    Some(
        PathBuf::from(home)
            .join(".config")
            .join("stock-relay")
            .join("config.json"),
    )
}

fn read_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RelayError::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        RelayError::ConfigError(format!("Failed to parse config file {}: {e}", path.display()))
    })
}

/// Deep-merge `overlay` into `base`; overlay values win
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn resolve_env_vars(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => *s = resolve_env_string(s)?,
        Value::Array(items) => {
            for item in items {
                resolve_env_vars(item)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                resolve_env_vars(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Resolve environment variable references in strings
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn resolve_env_string(s: &str) -> Result<String> {
    let mut result = s.to_string();

    let re_braces = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| RelayError::InvalidPattern(e.to_string()))?;

    for cap in re_braces.captures_iter(s) {
        let var_name = &cap[1];
        let value = std::env::var(var_name)
            .map_err(|_| RelayError::EnvVarNotFound(var_name.to_string()))?;
        result = result.replace(&cap[0], &value);
    }

    let re_simple = regex::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)")
        .map_err(|e| RelayError::InvalidPattern(e.to_string()))?;

    for cap in re_simple.captures_iter(&result.clone()) {
        let var_name = &cap[1];
        let value = std::env::var(var_name)
            .map_err(|_| RelayError::EnvVarNotFound(var_name.to_string()))?;
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.tunnel.name, "stock-analysis");
        assert_eq!(config.environment.variant, Variant::Venv);
        assert_eq!(config.launch.grace_period(), Duration::from_secs(3));
        assert_eq!(config.local_url(), "http://localhost:8001");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        std::fs::write(
            &path,
            r#"{ "server": { "port": 9000 }, "environment": { "variant": "uv" } }"#,
        )
        .unwrap();

        let config = RelayConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.environment.variant, Variant::Uv);
        assert_eq!(config.tunnel.binary, "cloudflared");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = RelayConfig::load_merged(Some(Path::new("/nonexistent/relay.json")));
        assert!(matches!(result, Err(RelayError::ConfigError(_))));
    }

    #[test]
    fn test_merge_values_deep() {
        let mut base = json!({ "server": { "host": "0.0.0.0", "port": 8000 }, "tunnel": { "name": "a" } });
        merge_values(&mut base, json!({ "server": { "port": 8001 } }));

        assert_eq!(base["server"]["host"], "0.0.0.0");
        assert_eq!(base["server"]["port"], 8001);
        assert_eq!(base["tunnel"]["name"], "a");
    }

    #[test]
    fn test_env_var_resolution() {
        unsafe {
            std::env::set_var("RELAY_TEST_HOST", "stocks.example.com");
        }

        assert_eq!(
            resolve_env_string("${RELAY_TEST_HOST}").unwrap(),
            "stocks.example.com"
        );
        assert_eq!(
            resolve_env_string("https://$RELAY_TEST_HOST/sse").unwrap(),
            "https://stocks.example.com/sse"
        );
        assert!(matches!(
            resolve_env_string("${RELAY_TEST_DEFINITELY_UNSET}"),
            Err(RelayError::EnvVarNotFound(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = RelayConfig::default();
        config.apply_overrides(ConfigOverrides {
            port: Some(8123),
            tunnel_name: Some("demo".to_string()),
            variant: Some(Variant::Uv),
            shutdown_policy: Some(ShutdownPolicy::Detach),
            ..Default::default()
        });

        assert_eq!(config.server.port, 8123);
        assert_eq!(config.tunnel.name, "demo");
        assert_eq!(config.environment.variant, Variant::Uv);
        assert_eq!(config.launch.shutdown.policy, ShutdownPolicy::Detach);
        assert_eq!(config.server.host, "localhost");
    }

    #[test]
    fn test_validation() {
        let mut config = RelayConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.tunnel.name = "stock analysis".to_string();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.environment.packages.push("pandas".to_string());
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.tunnel.hostname = Some("stock-analysis.example.com".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not contain tunnel.name"));
        config.tunnel.hostname = Some("stocks.example.com".to_string());
        assert!(config.validate().is_ok());

        let mut config = RelayConfig::default();
        config.launch.readiness.max_attempts = 0;
        assert!(config.validate().is_err());
        config.launch.readiness.probe = ProbeKind::None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_bin_path() {
        let env = EnvironmentConfig::default();
        let pip = env.bin("pip");
        assert!(pip.starts_with(".venv"));
        assert!(pip.to_string_lossy().contains("pip"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");

        let mut config = RelayConfig::default();
        config.tunnel.hostname = Some("stocks.example.com".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = RelayConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

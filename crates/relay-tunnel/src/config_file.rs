//! Tunnel configuration file: default rendering and in-place rewrite

use minijinja::{Environment, context};
use relay_core::{RelayError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_CONFIG_TEMPLATE: &str = "\
tunnel: {{ tunnel }}
credentials-file: {{ credentials_dir }}/{{ tunnel }}.json

ingress:
{%- if hostname %}
  - hostname: {{ hostname }}
    service: {{ service }}
  - service: http_status:404
{%- else %}
  - service: {{ service }}
{%- endif %}
";

/// Outcome of [`rewrite_config`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub backup: PathBuf,
    pub replacements: usize,
}

/// Backup location for a configuration file (`config.yml` -> `config.yml.bak`)
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Render the default configuration referencing the tunnel by name
pub fn render_default_config(
    tunnel: &str,
    credentials_dir: &Path,
    service: &str,
    hostname: Option<&str>,
) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("tunnel-config", DEFAULT_CONFIG_TEMPLATE)
        .map_err(|e| RelayError::Template(e.to_string()))?;

    let template = env
        .get_template("tunnel-config")
        .map_err(|e| RelayError::Template(e.to_string()))?;

    template
        .render(context! {
            tunnel => tunnel,
            credentials_dir => credentials_dir.display().to_string(),
            service => service,
            hostname => hostname,
        })
        .map(|mut rendered| {
            rendered.push('\n');
            rendered
        })
        .map_err(|e| RelayError::Template(e.to_string()))
}

/// Write the default configuration if `path` does not exist
///
/// Returns `true` when the file was written.
pub fn ensure_config_file(
    path: &Path,
    tunnel: &str,
    credentials_dir: &Path,
    service: &str,
    hostname: Option<&str>,
) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    let content = render_default_config(tunnel, credentials_dir, service, hostname)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;

    info!("Wrote default tunnel configuration {}", path.display());
    Ok(true)
}

/// Replace every literal occurrence of `name` with `id`
///
/// The original content is written to `<path>.bak` first. Refuses to
/// substitute anything that is not a tunnel identifier.
pub fn rewrite_config(path: &Path, name: &str, id: &str) -> Result<Rewrite> {
    if name.is_empty() {
        return Err(RelayError::ConfigError("tunnel name must not be empty".to_string()));
    }
    if !crate::listing::is_tunnel_id(id) {
        return Err(RelayError::InvalidTunnelId(id.to_string()));
    }

    let original = std::fs::read_to_string(path)?;
    let backup = backup_path(path);
    std::fs::write(&backup, &original)?;

    let replacements = original.matches(name).count();
    if replacements == 0 {
        warn!("{} does not mention tunnel '{}'", path.display(), name);
    }
    let rewritten = original.replace(name, id);
    std::fs::write(path, rewritten)?;

    info!(
        "Rewrote {} ({} occurrence(s) of '{}'), backup at {}",
        path.display(),
        replacements,
        name,
        backup.display()
    );

    Ok(Rewrite {
        backup,
        replacements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";

    #[test]
    fn test_rewrite_replaces_every_occurrence_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let original = "\
tunnel: stock-analysis
credentials-file: /home/op/.cloudflared/stock-analysis.json
# stock-analysis routes to the MCP server
ingress:
  - service: http://localhost:8001
";
        std::fs::write(&path, original).unwrap();

        let rewrite = rewrite_config(&path, "stock-analysis", ID).unwrap();
        assert_eq!(rewrite.replacements, 3);
        assert_eq!(rewrite.backup, dir.path().join("config.yml.bak"));

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(!rewritten.contains("stock-analysis"));
        assert_eq!(rewritten.matches(ID).count(), 3);
        assert!(rewritten.contains(&format!("/home/op/.cloudflared/{ID}.json")));

        assert_eq!(std::fs::read_to_string(&rewrite.backup).unwrap(), original);
    }

    #[test]
    fn test_rewrite_rejects_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "tunnel: stock-analysis\n").unwrap();

        assert!(matches!(
            rewrite_config(&path, "stock-analysis", ""),
            Err(RelayError::InvalidTunnelId(_))
        ));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "tunnel: stock-analysis\n"
        );
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_render_default_config_without_hostname() {
        let rendered = render_default_config(
            "stock-analysis",
            Path::new("/home/op/.cloudflared"),
            "http://localhost:8001",
            None,
        )
        .unwrap();

        assert!(rendered.starts_with("tunnel: stock-analysis\n"));
        assert!(rendered.contains("credentials-file: /home/op/.cloudflared/stock-analysis.json"));
        assert!(rendered.contains("  - service: http://localhost:8001"));
        assert!(!rendered.contains("http_status:404"));
    }

    #[test]
    fn test_render_default_config_with_hostname() {
        let rendered = render_default_config(
            "stock-analysis",
            Path::new("/home/op/.cloudflared"),
            "http://localhost:8001",
            Some("stocks.example.com"),
        )
        .unwrap();

        assert!(rendered.contains("  - hostname: stocks.example.com\n    service: http://localhost:8001"));
        assert!(rendered.contains("  - service: http_status:404"));
    }

    #[test]
    fn test_ensure_config_file_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "custom\n").unwrap();

        let written = ensure_config_file(
            &path,
            "stock-analysis",
            Path::new("/tmp"),
            "http://localhost:8001",
            None,
        )
        .unwrap();
        assert!(!written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "custom\n");
    }
}

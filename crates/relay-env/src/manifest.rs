//! Dependency manifest handling

use relay_core::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Render a manifest: one package per line, trailing newline
pub fn render_manifest<S: AsRef<str>>(packages: &[S]) -> String {
    let mut content = String::new();
    for package in packages {
        content.push_str(package.as_ref().trim());
        content.push('\n');
    }
    content
}

/// Write the default manifest if `path` does not exist
///
/// Returns `true` when the file was written. An existing manifest is never
/// read or modified.
pub fn ensure_manifest<S: AsRef<str>>(path: &Path, packages: &[S]) -> Result<bool> {
    if path.exists() {
        debug!("Manifest {} already exists", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        // Created concurrently between the check and the open
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(render_manifest(packages).as_bytes())?;

    info!("Wrote default manifest {} ({} packages)", path.display(), packages.len());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::DEFAULT_PACKAGES;
    use std::collections::HashSet;

    #[test]
    fn test_default_manifest_lines() {
        let content = render_manifest(DEFAULT_PACKAGES);
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), DEFAULT_PACKAGES.len());
        for package in DEFAULT_PACKAGES {
            assert!(lines.contains(package), "missing {package}");
        }

        let unique: HashSet<&str> = lines.iter().copied().collect();
        assert_eq!(unique.len(), lines.len());
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_ensure_manifest_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        std::fs::write(&path, "flask\n").unwrap();

        assert!(!ensure_manifest(&path, DEFAULT_PACKAGES).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "flask\n");
    }

    #[test]
    fn test_ensure_manifest_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps").join("requirements.txt");

        assert!(ensure_manifest(&path, &["yfinance"]).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "yfinance\n");
    }
}

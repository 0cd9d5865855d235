//! Tilt config file resolution.
//!
//! Tilt writes a kubeconfig-shaped YAML file to `~/.tilt-dev/config` with one
//! context per running instance. The context for the web port maps to a
//! cluster whose server URL carries the internal API port the tilt CLI talks
//! to. The file is re-read on every call: the API port is renegotiated when
//! tilt restarts, so caching it would hand out stale ports.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Web UI port tilt listens on when started without `--port`.
pub const DEFAULT_WEB_PORT: u16 = 10350;

/// Context name tilt registers for the default web port.
pub const DEFAULT_CONTEXT: &str = "tilt-default";

/// Resolves a user-facing web port to a context name and internal API port.
pub struct ConfigLocator {
    config_path: PathBuf,
}

impl ConfigLocator {
    /// Creates a locator pointing at the default path (~/.tilt-dev/config).
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = dirs::home_dir()
            .ok_or(ConfigError::NoHomeDir)?
            .join(".tilt-dev")
            .join("config");
        Ok(Self { config_path })
    }

    /// Creates a locator with a custom config path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Context name tilt registers for a given web port.
    pub fn context_name(web_port: u16) -> String {
        if web_port == DEFAULT_WEB_PORT {
            DEFAULT_CONTEXT.to_string()
        } else {
            format!("tilt-{web_port}")
        }
    }

    /// Resolves `web_port` to `(context_name, api_port)`.
    ///
    /// Fails if the config file is absent or unparseable, the expected
    /// context is missing, its cluster reference dangles, or the cluster
    /// server URL has no port component.
    pub fn resolve(&self, web_port: u16) -> Result<(String, u16), ConfigError> {
        let name = Self::context_name(web_port);

        if !self.config_path.exists() {
            return Err(ConfigError::NotFound {
                path: self.config_path.clone(),
            });
        }
        let raw = std::fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        let config: TiltConfigFile =
            serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let context = config
            .contexts
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ConfigError::ContextNotFound {
                name: name.clone(),
                available: config.contexts.iter().map(|c| c.name.clone()).collect(),
            })?;

        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| ConfigError::ClusterNotFound(context.context.cluster.clone()))?;

        let api_port = extract_port(&cluster.cluster.server)
            .ok_or_else(|| ConfigError::PortExtraction(cluster.cluster.server.clone()))?;

        Ok((context.name.clone(), api_port))
    }
}

// ============================================================================
// Config File Structure
// ============================================================================

#[derive(Debug, Deserialize)]
struct TiltConfigFile {
    #[serde(default)]
    contexts: Vec<ContextEntry>,
    #[serde(default)]
    clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    name: String,
    context: ContextSpec,
}

#[derive(Debug, Deserialize)]
struct ContextSpec {
    cluster: String,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    name: String,
    cluster: ClusterSpec,
}

#[derive(Debug, Deserialize)]
struct ClusterSpec {
    server: String,
}

/// Extracts the port component from a server URL like
/// `https://127.0.0.1:52899` or `https://[::1]:52899/`.
fn extract_port(server: &str) -> Option<u16> {
    let rest = match server.split_once("://") {
        Some((_, rest)) => rest,
        None => server,
    };
    let authority = rest.split('/').next()?;
    // IPv6 literals carry colons inside brackets; the port follows "]:".
    let port_str = if let Some((_, after)) = authority.rsplit_once("]:") {
        after
    } else if authority.contains('[') {
        return None;
    } else {
        authority.rsplit_once(':')?.1
    };
    port_str.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(contents: &str) -> (tempfile::TempDir, ConfigLocator) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, contents).unwrap();
        (dir, ConfigLocator::with_path(path))
    }

    const BASIC_CONFIG: &str = r#"
apiVersion: v1
kind: Config
contexts:
  - name: tilt-default
    context:
      cluster: c1
clusters:
  - name: c1
    cluster:
      server: https://127.0.0.1:52899
"#;

    #[test]
    fn test_resolve_default_port() {
        let (_dir, locator) = write_config(BASIC_CONFIG);
        let (context, api_port) = locator.resolve(10350).unwrap();
        assert_eq!(context, "tilt-default");
        assert_eq!(api_port, 52899);
    }

    #[test]
    fn test_context_name_templating() {
        assert_eq!(ConfigLocator::context_name(10350), "tilt-default");
        assert_eq!(ConfigLocator::context_name(10351), "tilt-10351");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempdir().unwrap();
        let locator = ConfigLocator::with_path(dir.path().join("config"));
        let err = locator.resolve(10350).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_unparseable_config() {
        let (_dir, locator) = write_config("contexts: {not: [valid");
        let err = locator.resolve(10350).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_context_lists_available() {
        let (_dir, locator) = write_config(BASIC_CONFIG);
        let err = locator.resolve(10351).unwrap_err();
        match err {
            ConfigError::ContextNotFound { name, available } => {
                assert_eq!(name, "tilt-10351");
                assert_eq!(available, vec!["tilt-default".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_dangling_cluster_reference() {
        let config = r#"
contexts:
  - name: tilt-default
    context:
      cluster: missing
clusters: []
"#;
        let (_dir, locator) = write_config(config);
        let err = locator.resolve(10350).unwrap_err();
        assert!(matches!(err, ConfigError::ClusterNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_server_url_without_port() {
        let config = r#"
contexts:
  - name: tilt-default
    context:
      cluster: c1
clusters:
  - name: c1
    cluster:
      server: https://tilt.local
"#;
        let (_dir, locator) = write_config(config);
        let err = locator.resolve(10350).unwrap_err();
        assert!(matches!(err, ConfigError::PortExtraction(_)));
    }

    #[test]
    fn test_extract_port_variants() {
        assert_eq!(extract_port("https://127.0.0.1:52899"), Some(52899));
        assert_eq!(extract_port("https://localhost:10351/path"), Some(10351));
        assert_eq!(extract_port("https://[::1]:8080"), Some(8080));
        assert_eq!(extract_port("127.0.0.1:9"), Some(9));
        assert_eq!(extract_port("https://tilt.local"), None);
        assert_eq!(extract_port("https://host:notaport"), None);
    }
}

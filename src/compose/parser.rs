//! Compose file loading and merging.
//!
//! This module handles loading the compose document from one or more YAML
//! files (later files override earlier ones, compose override-file style),
//! plus `.env` loading and environment variable overrides.

use crate::error::{ComposeError, Result, StacksmithError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::{ClusterSpec, ComposeDocument};

/// Loader for compose documents.
#[derive(Debug, Default)]
pub struct ComposeParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ComposeParser {
    /// Creates a new compose parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads and merges one or more compose files.
    ///
    /// Files are merged in order: mappings merge recursively with
    /// later declarations winning, sequences and scalars are replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is given, a file cannot be read, or
    /// the merged document fails to deserialize.
    pub fn load_files(&self, paths: &[impl AsRef<Path>]) -> Result<ComposeDocument> {
        let mut merged: Option<serde_yaml::Value> = None;

        for path in paths {
            let path = path.as_ref();
            info!("Loading compose file: {}", path.display());

            if !path.exists() {
                return Err(StacksmithError::Compose(ComposeError::FileNotFound {
                    path: path.to_path_buf(),
                }));
            }

            let content = std::fs::read_to_string(path).map_err(|e| {
                StacksmithError::Compose(ComposeError::ParseError {
                    message: format!("Failed to read file: {e}"),
                    location: Some(path.display().to_string()),
                })
            })?;

            let value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| {
                StacksmithError::Compose(ComposeError::ParseError {
                    message: format!("YAML parse error: {e}"),
                    location: Some(path.display().to_string()),
                })
            })?;

            merged = Some(match merged {
                Some(base) => merge_values(base, value),
                None => value,
            });
        }

        let Some(merged) = merged else {
            return Err(StacksmithError::Compose(ComposeError::ParseError {
                message: String::from("No compose file provided"),
                location: None,
            }));
        };

        let document: ComposeDocument = serde_yaml::from_value(merged).map_err(|e| {
            StacksmithError::Compose(ComposeError::ParseError {
                message: format!("Compose document error: {e}"),
                location: None,
            })
        })?;

        debug!(
            "Loaded {} services across {} families",
            document.services.len(),
            document.family_names().len()
        );
        Ok(document)
    }

    /// Parses a compose document from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str) -> Result<ComposeDocument> {
        serde_yaml::from_str(content).map_err(|e| {
            StacksmithError::Compose(ComposeError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: None,
            })
        })
    }

    /// Loads compose files and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    pub fn load_with_env(&self, paths: &[impl AsRef<Path>]) -> Result<ComposeDocument> {
        let mut document = self.load_files(paths)?;
        Self::apply_env_overrides(&mut document);
        Ok(document)
    }

    /// Applies environment variable overrides to the document.
    fn apply_env_overrides(document: &mut ComposeDocument) {
        if let Ok(cluster_name) = std::env::var("STACKSMITH_CLUSTER_NAME") {
            debug!("Overriding x-cluster.name from environment");
            document
                .cluster
                .get_or_insert_with(ClusterSpec::default)
                .name = Some(cluster_name);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StacksmithError::Compose(ComposeError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Recursively merges two YAML values, `overlay` winning.
fn merge_values(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(mut base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            serde_yaml::Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Default compose file names to search for.
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "stacksmith.compose.yaml",
    "stacksmith.compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
    "compose.yaml",
    "compose.yml",
];

/// Finds the compose file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no compose file is found.
pub fn find_compose_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_COMPOSE_FILES {
            let compose_path = current.join(filename);
            if compose_path.exists() {
                info!("Found compose file: {}", compose_path.display());
                return Ok(compose_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StacksmithError::Compose(ComposeError::FileNotFound {
        path: start.join(DEFAULT_COMPOSE_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_document() {
        let yaml = r"
services:
  web:
    image: nginx:alpine
";
        let parser = ComposeParser::new();
        let doc = parser.parse_yaml(yaml).unwrap();
        assert_eq!(doc.services.len(), 1);
        assert_eq!(doc.services["web"].image, "nginx:alpine");
    }

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
services:
  web:
    image: ghcr.io/acme/web:1.4
    ports:
      - "8080:80/tcp"
    environment:
      APP_ENV: production
    deploy:
      replicas: 2
      labels:
        ecs.task.family: frontend
    x-scaling:
      range: "2-10"
      target_scaling:
        cpu_target: 70

x-cluster:
  name: acme-prod
  capacity_providers:
    - FARGATE
    - FARGATE_SPOT

x-elbv2:
  public:
    type: alb
    scheme: internet-facing
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: frontend:web:80
"#;
        let parser = ComposeParser::new();
        let doc = parser.parse_yaml(yaml).unwrap();
        assert_eq!(doc.services["web"].replicas(), 2);
        assert_eq!(
            doc.cluster.as_ref().unwrap().capacity_providers,
            vec!["FARGATE", "FARGATE_SPOT"]
        );
        assert_eq!(doc.load_balancers["public"].listeners.len(), 1);
    }

    #[test]
    fn test_layered_merge_overrides_image() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("compose.yaml");
        let overlay = dir.path().join("compose.override.yaml");

        let mut f = std::fs::File::create(&base).unwrap();
        writeln!(
            f,
            "services:\n  web:\n    image: nginx:1.25\n    ports:\n      - \"80\""
        )
        .unwrap();
        let mut f = std::fs::File::create(&overlay).unwrap();
        writeln!(f, "services:\n  web:\n    image: nginx:1.27").unwrap();

        let parser = ComposeParser::new();
        let doc = parser.load_files(&[&base, &overlay]).unwrap();
        assert_eq!(doc.services["web"].image, "nginx:1.27");
        // Unmentioned keys survive the overlay.
        assert_eq!(doc.services["web"].ports.len(), 1);
    }

    #[test]
    fn test_missing_file_errors() {
        let parser = ComposeParser::new();
        let result = parser.load_files(&[Path::new("/nonexistent/compose.yaml")]);
        assert!(result.is_err());
    }
}

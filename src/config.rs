//! Configuration types for tfaot-compile.
//!
//! An AOT configuration file describes the saved model to compile, the batch
//! sizes to compile it for, and how the generated classes are named. Files
//! are YAML or JSON, selected by extension. Loading always normalizes: all
//! defaults are filled in and all paths are resolved relative to the config
//! file, so downstream code never sees a partial configuration.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TfaotError};

/// Default serving signature key of the saved model.
pub const DEFAULT_SERVING_KEY: &str = "serving_default";

/// Default namespace for the generated model classes.
pub const DEFAULT_NAMESPACE: &str = "tfaot_model";

/// Top-level AOT configuration, fully normalized.
#[derive(Debug, Clone)]
pub struct AotConfig {
    /// Model location and naming.
    pub model: ModelConfig,

    /// Compilation settings.
    pub compilation: CompilationConfig,
}

/// Model location and naming.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model name, used for file prefixes and the default tool name.
    pub name: String,

    /// Model version, used as the tool version.
    pub version: String,

    /// Path to the saved model directory, resolved relative to the config file.
    pub saved_model: PathBuf,

    /// Serving signature key to compile.
    pub serving_key: String,
}

/// Compilation settings.
#[derive(Debug, Clone)]
pub struct CompilationConfig {
    /// Batch sizes to compile the model for, sorted and deduplicated.
    pub batch_sizes: Vec<usize>,

    /// Namespace of the generated classes.
    pub namespace: String,

    /// Class name pattern containing a `{}` batch size placeholder.
    pub class_name: String,

    /// AOT compiler executable override.
    pub compiler: Option<PathBuf>,

    /// Additional flags passed to every compiler invocation.
    pub flags: Vec<String>,
}

// Raw deserialization targets. Everything is optional here so that missing
// entries surface as configuration errors naming the config file instead of
// bare serde messages.

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    model: Option<RawModel>,
    compilation: Option<RawCompilation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModel {
    name: Option<String>,
    version: Option<String>,
    saved_model: Option<PathBuf>,
    serving_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCompilation {
    batch_sizes: Option<Vec<usize>>,
    namespace: Option<String>,
    class_name: Option<String>,
    compiler: Option<PathBuf>,
    #[serde(default)]
    flags: Vec<String>,
}

impl AotConfig {
    /// Load and normalize a configuration from a YAML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TfaotError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let raw: RawConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(TfaotError::config(format!(
                    "unsupported config file extension in {}, expected .yaml, .yml or .json",
                    path.display()
                )))
            }
        };

        Self::normalize(path, raw)
    }

    /// Validate a raw configuration and fill in defaults.
    fn normalize(config_file: &Path, raw: RawConfig) -> Result<Self> {
        let missing = |entry: &str| {
            TfaotError::config(format!(
                "missing '{}' entry in {}",
                entry,
                config_file.display()
            ))
        };

        let raw_model = raw.model.ok_or_else(|| missing("model"))?;
        let raw_compilation = raw.compilation.ok_or_else(|| missing("compilation"))?;

        let name = raw_model
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| missing("model.name"))?;
        let version = raw_model
            .version
            .filter(|version| !version.is_empty())
            .ok_or_else(|| missing("model.version"))?;

        let serving_key = raw_model
            .serving_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVING_KEY.to_string());

        // resolve the saved model directory relative to the config file
        let config_dir = config_file.parent().unwrap_or_else(|| Path::new("."));
        let saved_model = config_dir.join(
            raw_model
                .saved_model
                .unwrap_or_else(|| PathBuf::from("saved_model")),
        );
        if !saved_model.is_dir() {
            return Err(TfaotError::config(format!(
                "'model.saved_model' directory {} does not exist",
                saved_model.display()
            )));
        }

        let mut batch_sizes = raw_compilation
            .batch_sizes
            .ok_or_else(|| missing("compilation.batch_sizes"))?;
        if batch_sizes.is_empty() {
            return Err(TfaotError::config(format!(
                "empty 'compilation.batch_sizes' entry in {}",
                config_file.display()
            )));
        }
        if batch_sizes.contains(&0) {
            return Err(TfaotError::config(format!(
                "'compilation.batch_sizes' entries must be positive in {}",
                config_file.display()
            )));
        }
        batch_sizes.sort_unstable();
        batch_sizes.dedup();

        let namespace = raw_compilation
            .namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let class_name = match raw_compilation.class_name.filter(|c| !c.is_empty()) {
            Some(class_name) if class_name.contains("{}") => class_name,
            Some(_) => {
                return Err(TfaotError::config(format!(
                    "misconfigured 'compilation.class_name' entry in {} (missing {{}})",
                    config_file.display()
                )))
            }
            None => format!("{}_bs{{}}", name),
        };

        Ok(Self {
            model: ModelConfig {
                name,
                version,
                saved_model,
                serving_key,
            },
            compilation: CompilationConfig {
                batch_sizes,
                namespace,
                class_name,
                compiler: raw_compilation.compiler,
                flags: raw_compilation.flags,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn minimal_yaml() -> &'static str {
        "model:\n  name: test\n  version: 1.0.0\ncompilation:\n  batch_sizes: [2, 1, 2]\n"
    }

    #[test]
    fn test_load_fills_defaults() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("saved_model")).unwrap();
        let path = write_config(&dir, "aot.yaml", minimal_yaml());

        let config = AotConfig::load(&path).unwrap();
        assert_eq!(config.model.name, "test");
        assert_eq!(config.model.version, "1.0.0");
        assert_eq!(config.model.serving_key, DEFAULT_SERVING_KEY);
        assert_eq!(config.model.saved_model, dir.path().join("saved_model"));
        assert_eq!(config.compilation.batch_sizes, vec![1, 2]);
        assert_eq!(config.compilation.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.compilation.class_name, "test_bs{}");
        assert!(config.compilation.compiler.is_none());
        assert!(config.compilation.flags.is_empty());
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("saved_model")).unwrap();
        let path = write_config(
            &dir,
            "aot.json",
            r#"{"model": {"name": "test", "version": "2.1"}, "compilation": {"batch_sizes": [4]}}"#,
        );

        let config = AotConfig::load(&path).unwrap();
        assert_eq!(config.model.version, "2.1");
        assert_eq!(config.compilation.batch_sizes, vec![4]);
    }

    #[test]
    fn test_missing_model_name() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "aot.yaml",
            "model:\n  version: 1.0.0\ncompilation:\n  batch_sizes: [1]\n",
        );

        let err = AotConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("model.name"), "{}", err);
    }

    #[test]
    fn test_missing_batch_sizes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("saved_model")).unwrap();
        let path = write_config(
            &dir,
            "aot.yaml",
            "model:\n  name: test\n  version: 1.0.0\ncompilation:\n  namespace: ns\n",
        );

        let err = AotConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("compilation.batch_sizes"), "{}", err);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("saved_model")).unwrap();
        let path = write_config(
            &dir,
            "aot.yaml",
            "model:\n  name: test\n  version: 1.0.0\ncompilation:\n  batch_sizes: [0, 1]\n",
        );

        let err = AotConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("positive"), "{}", err);
    }

    #[test]
    fn test_missing_saved_model_dir() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "aot.yaml", minimal_yaml());

        let err = AotConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{}", err);
    }

    #[test]
    fn test_class_name_requires_placeholder() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("saved_model")).unwrap();
        let path = write_config(
            &dir,
            "aot.yaml",
            "model:\n  name: test\n  version: 1.0.0\ncompilation:\n  batch_sizes: [1]\n  class_name: fixed_name\n",
        );

        let err = AotConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("class_name"), "{}", err);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "aot.toml", "model = 1\n");

        let err = AotConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("extension"), "{}", err);
    }
}

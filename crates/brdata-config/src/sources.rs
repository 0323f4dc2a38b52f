// Configuration source loading.
//
// Priority order:
// 1. Environment variables (BRDATA_* prefix)
// 2. Explicit config file (--config)
// 3. Config file path from BRDATA_CONFIG
// 4. Inline config content from BRDATA_CONFIG_CONTENT
// 5. Default config files (./brdata.toml, ./.brdata.toml)
// 6. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_FILES: [&str; 2] = ["./brdata.toml", "./.brdata.toml"];

pub fn load_config<E: EnvSource>(explicit: Option<&Path>, env: &E) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    let file_config = match explicit {
        Some(path) => Some(read_file(path)?),
        None => load_from_file(env)?,
    };
    if let Some(file_config) = file_config {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse inline config from {ENV_PREFIX}CONFIG_CONTENT")
        })?;
        return Ok(Some(config));
    }

    for path in DEFAULT_FILES {
        if Path::new(path).exists() {
            return read_file(Path::new(path)).map(Some);
        }
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Process environment.
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_overrides::tests::MapEnv;
    use crate::{FailurePolicy, LogFormat};

    #[test]
    fn test_explicit_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
            [convert]
            batch_rows = 10

            [log]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        let env = MapEnv::with(&[("BATCH_ROWS", "20")]);
        let config = load_config(Some(&path), &env).unwrap();
        assert_eq!(config.convert.batch_rows, 20);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_config_path_beats_inline_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brdata.toml");
        std::fs::write(&path, "[partition]\nfailure_policy = \"isolate\"\n").unwrap();

        let env = MapEnv::with(&[
            ("CONFIG", path.to_str().unwrap()),
            ("CONFIG_CONTENT", "[convert]\nbatch_rows = 3\n"),
        ]);
        let config = load_config(None, &env).unwrap();
        assert_eq!(config.partition.failure_policy, FailurePolicy::Isolate);
        assert_eq!(config.convert.batch_rows, 1_000_000);
    }

    #[test]
    fn test_inline_content() {
        let env = MapEnv::with(&[("CONFIG_CONTENT", "[convert]\nbatch_rows = 3\n")]);
        let config = load_config(None, &env).unwrap();
        assert_eq!(config.convert.batch_rows, 3);
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = load_config(Some(Path::new("/nonexistent/brdata.toml")), &MapEnv::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_result_is_rejected() {
        let env = MapEnv::with(&[("CONFIG_CONTENT", "[convert]\nbatch_rows = 0\n")]);
        assert!(load_config(None, &env).is_err());
    }
}

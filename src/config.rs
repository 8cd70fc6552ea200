//! TOML configuration for `pct`.
//!
//! Every setting has a default matching the project's checked-in scripts, so
//! running without a config file behaves exactly like the old tooling.
//!
//! ```toml
//! [generator]
//! path = "build/generator"
//! output_dir = "data"
//!
//! [sweeps.bulk]
//! stem = "cluster_data_2f_10c_"
//! postfix = "mb.bin"
//! vary = "size"
//! values = [16, 32, 64]
//! features = 2
//! clusters = 10
//! divisor = 8
//!
//! [flags]
//! compiler = "clang"
//! strip = ["-stdlib=libc++"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::sweep::{GeneratorParams, SweepParam};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default = "default_sweeps")]
    pub sweeps: BTreeMap<String, SweepConfig>,
    #[serde(default)]
    pub flags: FlagsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_path")]
    pub path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            path: default_generator_path(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_generator_path() -> PathBuf {
    PathBuf::from("build/generator")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

/// One `[sweeps.<name>]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    pub stem: String,
    #[serde(default)]
    pub postfix: String,
    pub vary: SweepParam,
    pub values: Vec<u64>,
    #[serde(flatten)]
    pub base: GeneratorParams,
}

fn default_sweeps() -> BTreeMap<String, SweepConfig> {
    let mut sweeps = BTreeMap::new();
    sweeps.insert(
        "bulk".to_string(),
        SweepConfig {
            stem: "cluster_data_2f_10c_".to_string(),
            postfix: "mb.bin".to_string(),
            vary: SweepParam::Size,
            values: vec![16, 32, 64, 128, 256, 512, 1024, 2048],
            base: GeneratorParams {
                features: Some(2),
                clusters: Some(10),
                divisor: Some(8),
                ..GeneratorParams::default()
            },
        },
    );
    sweeps.insert(
        "features".to_string(),
        SweepConfig {
            stem: "cluster_data_".to_string(),
            postfix: "f_10c_2048mb.bin".to_string(),
            vary: SweepParam::Features,
            values: vec![2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096],
            base: GeneratorParams {
                clusters: Some(10),
                divisor: Some(32),
                size: Some(2048),
                ..GeneratorParams::default()
            },
        },
    );
    sweeps
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlagsConfig {
    #[serde(default = "default_compiler")]
    pub compiler: String,
    #[serde(default = "default_c_std")]
    pub c_std: String,
    #[serde(default = "default_cxx_std")]
    pub cxx_std: String,
    /// Flags removed from every result just before it is returned.
    #[serde(default = "default_strip")]
    pub strip: Vec<String>,
    #[serde(default = "default_true")]
    pub detect_system_includes: bool,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            c_std: default_c_std(),
            cxx_std: default_cxx_std(),
            strip: default_strip(),
            detect_system_includes: true,
        }
    }
}

fn default_compiler() -> String {
    "clang".to_string()
}
fn default_c_std() -> String {
    "c11".to_string()
}
fn default_cxx_std() -> String {
    "c++11".to_string()
}
fn default_strip() -> Vec<String> {
    vec!["-stdlib=libc++".to_string()]
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Built-in configuration used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            sweeps: default_sweeps(),
            flags: FlagsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    for (name, sweep) in &config.sweeps {
        if sweep.values.is_empty() {
            bail!("sweeps.{}.values must not be empty", name);
        }
        if sweep.base.get(sweep.vary).is_some() {
            bail!(
                "sweeps.{}: '{}' is swept and must not also be set as a base parameter",
                name,
                sweep.vary
            );
        }
        if sweep.vary != SweepParam::Size && sweep.values.contains(&0) {
            bail!("sweeps.{}.values must be > 0 for '{}'", name, sweep.vary);
        }
        for param in [SweepParam::Features, SweepParam::Clusters, SweepParam::Divisor] {
            if sweep.base.get(param) == Some(0) {
                bail!("sweeps.{}.{} must be > 0", name, param);
            }
        }
        if let (Some(min), Some(max)) = (sweep.base.domain_min, sweep.base.domain_max) {
            if min >= max {
                bail!(
                    "sweeps.{}: domain_min ({}) must be less than domain_max ({})",
                    name,
                    min,
                    max
                );
            }
        }
    }

    if config.flags.compiler.trim().is_empty() {
        bail!("flags.compiler must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pct.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_matches_builtin_scripts() {
        let cfg = Config::minimal();
        assert_eq!(cfg.generator.path, PathBuf::from("build/generator"));
        assert_eq!(cfg.generator.output_dir, PathBuf::from("data"));

        let bulk = &cfg.sweeps["bulk"];
        assert_eq!(bulk.vary, SweepParam::Size);
        assert_eq!(bulk.values.len(), 8);
        assert_eq!(bulk.base.divisor, Some(8));

        let features = &cfg.sweeps["features"];
        assert_eq!(features.vary, SweepParam::Features);
        assert_eq!(features.values.first(), Some(&2));
        assert_eq!(features.values.last(), Some(&4096));
        assert_eq!(features.base.size, Some(2048));

        assert_eq!(cfg.flags.strip, vec!["-stdlib=libc++".to_string()]);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.sweeps.len(), 2);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.flags.compiler, "clang");
        assert!(cfg.sweeps.contains_key("bulk"));
    }

    #[test]
    fn test_custom_sweep_replaces_defaults() {
        let (_tmp, path) = write_config(
            r#"
[generator]
path = "/opt/gen"

[sweeps.clusters]
stem = "c_"
postfix = ".bin"
vary = "clusters"
values = [2, 4]
features = 8
size = 64
radius = 2.5
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.generator.path, PathBuf::from("/opt/gen"));
        assert_eq!(cfg.generator.output_dir, PathBuf::from("data"));
        assert_eq!(cfg.sweeps.len(), 1);
        let sweep = &cfg.sweeps["clusters"];
        assert_eq!(sweep.vary, SweepParam::Clusters);
        assert_eq!(sweep.base.features, Some(8));
        assert_eq!(sweep.base.radius, Some(2.5));
    }

    #[test]
    fn test_rejects_empty_values() {
        let (_tmp, path) = write_config(
            r#"
[sweeps.x]
stem = "x"
vary = "size"
values = []
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_rejects_varied_param_in_base() {
        let (_tmp, path) = write_config(
            r#"
[sweeps.x]
stem = "x"
vary = "size"
values = [1]
size = 4
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("is swept"));
    }

    #[test]
    fn test_rejects_zero_features() {
        let (_tmp, path) = write_config(
            r#"
[sweeps.x]
stem = "x"
vary = "features"
values = [0, 2]
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_inverted_domain() {
        let (_tmp, path) = write_config(
            r#"
[sweeps.x]
stem = "x"
vary = "size"
values = [1]
domain_min = 5.0
domain_max = -5.0
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("domain_min"));
    }

    #[test]
    fn test_rejects_empty_compiler() {
        let (_tmp, path) = write_config("[flags]\ncompiler = \"  \"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_unknown_vary_is_parse_error() {
        let (_tmp, path) = write_config(
            r#"
[sweeps.x]
stem = "x"
vary = "radius"
values = [1]
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}

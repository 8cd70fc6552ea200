//! Generator sweeps.
//!
//! A sweep runs the external cluster generator once per value of a single
//! varied parameter while every other parameter stays fixed, writing one
//! dataset per run into the output directory.
//!
//! The generator is an opaque collaborator: its output is never parsed and a
//! non-zero exit status is logged and recorded but does not stop the sweep.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::config::{Config, SweepConfig};

/// Integer generator parameter that a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepParam {
    Features,
    Clusters,
    Divisor,
    Size,
}

impl SweepParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepParam::Features => "features",
            SweepParam::Clusters => "clusters",
            SweepParam::Divisor => "divisor",
            SweepParam::Size => "size",
        }
    }

    fn flag(&self) -> String {
        format!("--{}", self.as_str())
    }
}

impl fmt::Display for SweepParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters held constant across a sweep. Unset values are left to the
/// generator's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratorParams {
    pub features: Option<u64>,
    pub clusters: Option<u64>,
    pub divisor: Option<u64>,
    /// Target file size in MiB.
    pub size: Option<u64>,
    pub radius: Option<f32>,
    pub domain_min: Option<f32>,
    pub domain_max: Option<f32>,
}

impl GeneratorParams {
    pub fn get(&self, param: SweepParam) -> Option<u64> {
        match param {
            SweepParam::Features => self.features,
            SweepParam::Clusters => self.clusters,
            SweepParam::Divisor => self.divisor,
            SweepParam::Size => self.size,
        }
    }

    /// Command-line flags for every set parameter except `skip`, in the
    /// generator's canonical option order.
    fn to_args(&self, skip: SweepParam) -> Vec<String> {
        let mut args = Vec::new();
        for param in [
            SweepParam::Features,
            SweepParam::Clusters,
            SweepParam::Divisor,
            SweepParam::Size,
        ] {
            if param == skip {
                continue;
            }
            if let Some(v) = self.get(param) {
                args.push(param.flag());
                args.push(v.to_string());
            }
        }
        for (name, value) in [
            ("--radius", self.radius),
            ("--domain_min", self.domain_min),
            ("--domain_max", self.domain_max),
        ] {
            if let Some(v) = value {
                args.push(name.to_string());
                args.push(v.to_string());
            }
        }
        args
    }
}

#[derive(Debug, Clone)]
pub struct Sweep {
    pub name: String,
    pub stem: String,
    pub postfix: String,
    pub vary: SweepParam,
    pub values: Vec<u64>,
    pub base: GeneratorParams,
}

impl Sweep {
    pub fn from_config(name: &str, cfg: &SweepConfig) -> Self {
        Self {
            name: name.to_string(),
            stem: cfg.stem.clone(),
            postfix: cfg.postfix.clone(),
            vary: cfg.vary,
            values: cfg.values.clone(),
            base: cfg.base.clone(),
        }
    }

    pub fn output_path(&self, output_dir: &Path, value: u64) -> PathBuf {
        output_dir.join(format!("{}{}{}", self.stem, value, self.postfix))
    }

    pub fn invocations(&self, generator: &Path, output_dir: &Path) -> Vec<Invocation> {
        let base = self.base.to_args(self.vary);
        self.values
            .iter()
            .map(|&value| {
                let output = self.output_path(output_dir, value);
                let mut args = base.clone();
                args.push(self.vary.flag());
                args.push(value.to_string());
                args.push(output.to_string_lossy().to_string());
                Invocation {
                    program: generator.to_path_buf(),
                    args,
                    output,
                }
            })
            .collect()
    }
}

/// A single generator run.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs generator invocations.
pub trait Launcher {
    /// Run to completion and return the exit code (`None` when the process
    /// was terminated by a signal). `Err` only if it could not be started.
    fn launch(&self, invocation: &Invocation) -> Result<Option<i32>>;
}

/// Spawns the generator as a child process, inheriting stdio.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<Option<i32>> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .with_context(|| {
                format!(
                    "Failed to execute generator '{}'. Has it been built?",
                    invocation.program.display()
                )
            })?;
        Ok(status.code())
    }
}

/// Outcome of a sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub launched: usize,
    /// Runs that exited unsuccessfully, with their exit code.
    pub failures: Vec<(PathBuf, Option<i32>)>,
}

/// Run every invocation of `sweep`, creating `output_dir` first if needed.
pub fn run_sweep(
    sweep: &Sweep,
    generator: &Path,
    output_dir: &Path,
    launcher: &dyn Launcher,
) -> Result<SweepReport> {
    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;
    }

    let mut report = SweepReport::default();
    for invocation in sweep.invocations(generator, output_dir) {
        println!("Generating {}", invocation.output.display());
        debug!(sweep = %sweep.name, command = %invocation, "launching generator");

        let code = launcher.launch(&invocation)?;
        report.launched += 1;
        if code != Some(0) {
            warn!(
                sweep = %sweep.name,
                output = %invocation.output.display(),
                code = ?code,
                "generator exited unsuccessfully; continuing"
            );
            report.failures.push((invocation.output.clone(), code));
        }
    }

    Ok(report)
}

/// CLI entry for `pct sweep <name|all>`.
pub fn run_sweep_cmd(config: &Config, target: &str, dry_run: bool) -> Result<()> {
    let sweeps: Vec<Sweep> = if target == "all" {
        config
            .sweeps
            .iter()
            .map(|(name, cfg)| Sweep::from_config(name, cfg))
            .collect()
    } else {
        match config.sweeps.get(target) {
            Some(cfg) => vec![Sweep::from_config(target, cfg)],
            None => {
                let known: Vec<&str> = config.sweeps.keys().map(|k| k.as_str()).collect();
                bail!(
                    "Unknown sweep '{}'. Configured sweeps: {}",
                    target,
                    known.join(", ")
                );
            }
        }
    };

    let generator = &config.generator.path;
    let output_dir = &config.generator.output_dir;

    for sweep in &sweeps {
        if dry_run {
            for invocation in sweep.invocations(generator, output_dir) {
                println!("{}", invocation);
            }
            continue;
        }

        let report = run_sweep(sweep, generator, output_dir, &ProcessLauncher)?;
        println!(
            "sweep {}: {} runs, {} failed",
            sweep.name,
            report.launched,
            report.failures.len()
        );
    }

    Ok(())
}

/// CLI entry for `pct sweeps`.
pub fn list_sweeps(config: &Config) -> Result<()> {
    println!("{:<16} {:<10} {:<8} OUTPUT", "SWEEP", "VARY", "RUNS");
    for (name, cfg) in &config.sweeps {
        let sweep = Sweep::from_config(name, cfg);
        let pattern = format!("{}{{{}}}{}", sweep.stem, sweep.vary, sweep.postfix);
        println!(
            "{:<16} {:<10} {:<8} {}",
            name,
            sweep.vary,
            sweep.values.len(),
            config.generator.output_dir.join(pattern).display()
        );
    }
    Ok(())
}

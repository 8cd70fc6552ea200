//! Compilation database lookup.
//!
//! Reads a `compile_commands.json` (the JSON compilation database format
//! emitted by CMake and friends) and answers "which flags, from which
//! directory, were used to compile file X".

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::paths;

pub const DATABASE_FILE: &str = "compile_commands.json";

/// Flags recorded for one translation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilationInfo {
    pub flags: Vec<String>,
    /// Directory the compiler ran in; relative paths in `flags` are relative to it.
    pub working_dir: PathBuf,
}

pub trait CompilationDatabase {
    /// Flags for `file`, or `None` when the database has no entry for it.
    fn compilation_info(&self, file: &Path) -> Option<CompilationInfo>;
}

#[derive(Debug, Deserialize)]
struct Entry {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

/// In-memory index over a `compile_commands.json`.
#[derive(Debug, Default)]
pub struct JsonCompilationDatabase {
    entries: HashMap<PathBuf, CompilationInfo>,
}

impl JsonCompilationDatabase {
    /// Load `dir/compile_commands.json`. A missing file is `Ok(None)`.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DATABASE_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let db = Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if db.is_empty() {
            warn!(path = %path.display(), "compilation database has no entries");
        } else {
            debug!(path = %path.display(), entries = db.len(), "loaded compilation database");
        }
        Ok(Some(db))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: Vec<Entry> = serde_json::from_str(content)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for entry in raw {
            let argv = match (entry.arguments, entry.command) {
                (Some(args), _) => args,
                (None, Some(command)) => split_command(&command)
                    .with_context(|| format!("bad command for {}", entry.file.display()))?,
                (None, None) => bail!(
                    "entry for {} has neither 'arguments' nor 'command'",
                    entry.file.display()
                ),
            };
            let file = paths::absolutize(&entry.directory, &entry.file);
            let flags = strip_non_semantic_args(&argv, &entry.directory, &file);
            // First entry wins, matching how most tools treat duplicates.
            entries.entry(file).or_insert(CompilationInfo {
                flags,
                working_dir: entry.directory,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CompilationDatabase for JsonCompilationDatabase {
    fn compilation_info(&self, file: &Path) -> Option<CompilationInfo> {
        self.entries.get(&paths::normalize(file)).cloned()
    }
}

/// Drop the compiler, `-c`, the output file and the source file itself,
/// keeping only flags that affect how the code is parsed. The source token
/// may be spelled relative to `directory` or absolute.
fn strip_non_semantic_args(argv: &[String], directory: &Path, abs_file: &Path) -> Vec<String> {
    let mut flags = Vec::with_capacity(argv.len());
    let mut args = argv.iter().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-c" {
            continue;
        }
        if arg == "-o" {
            args.next();
            continue;
        }
        if arg.starts_with("-o") && arg.len() > 2 {
            continue;
        }
        if !arg.starts_with('-') && paths::absolutize(directory, Path::new(arg)) == abs_file {
            continue;
        }
        flags.push(arg.clone());
    }
    flags
}

/// Split a shell command line into words using POSIX quoting rules:
/// single quotes are literal, double quotes allow `\` escapes of `"`, `\`,
/// `$` and `` ` ``, and an unquoted `\` escapes the next character.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => bail!("unterminated single quote"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                            Some('\n') => {}
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => bail!("unterminated double quote"),
                        },
                        Some(c) => current.push(c),
                        None => bail!("unterminated double quote"),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some(e) => {
                    in_word = true;
                    current.push(e);
                }
                None => bail!("trailing backslash"),
            },
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

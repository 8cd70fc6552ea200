//! Compile flags for editor semantic completion.
//!
//! Given a file and the editor's working directory, works out the compiler
//! flags a clang-based completion engine should parse it with:
//!
//! 1. Look the file up in the compilation database. Headers are never in
//!    it, so a header borrows the flags of a source file that includes it
//!    (found through CMake `depend.make` files) or of a same-named source
//!    file next to it.
//! 2. Make relative include and sysroot paths absolute.
//! 3. Add the language selection (and a default standard when the database
//!    had nothing for us).
//! 4. Kernel trees (a `Kbuild` file in the working directory) get gcc-only
//!    flags stripped; everything else gets the compiler's system include
//!    directories unless `-nostdinc` is in effect.
//!
//! Missing information never fails resolution; it just produces fewer flags.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::compile_db::{CompilationDatabase, CompilationInfo, JsonCompilationDatabase};
use crate::config::FlagsConfig;
use crate::depfile;

pub const C_SOURCE_EXTENSIONS: &[&str] = &["c"];
pub const CXX_SOURCE_EXTENSIONS: &[&str] = &["cpp", "cxx", "cc"];
pub const C_HEADER_EXTENSIONS: &[&str] = &["h"];
pub const CXX_HEADER_EXTENSIONS: &[&str] = &["hxx", "hpp"];

/// Flags that take a path, either attached (`-Ifoo`) or as the next token.
const PATH_FLAGS: &[&str] = &["-isystem", "-I", "-iquote", "--sysroot="];

/// gcc flags used by kernel builds that clang rejects.
pub const KERNEL_INCOMPATIBLE_FLAGS: &[&str] = &[
    "-mno-80387",
    "-mno-fp-ret-in-387",
    "-maccumulate-outgoing-args",
    "-fno-delete-null-pointer-checks",
    "-fno-var-tracking-assignments",
    "-mfentry",
    "-fconserve-stack",
];

pub const KERNEL_UNDEFINE: &str = "-UCC_HAVE_ASM_GOTO";

const KBUILD_MARKER: &str = "Kbuild";

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn has_extension(path: &Path, set: &[&str]) -> bool {
    extension(path).is_some_and(|e| set.contains(&e))
}

pub fn is_header_file(path: &Path) -> bool {
    has_extension(path, C_HEADER_EXTENSIONS) || has_extension(path, CXX_HEADER_EXTENSIONS)
}

pub fn is_source_file(path: &Path) -> bool {
    has_extension(path, C_SOURCE_EXTENSIONS) || has_extension(path, CXX_SOURCE_EXTENSIONS)
}

fn is_c_source(path: &Path) -> bool {
    has_extension(path, C_SOURCE_EXTENSIONS)
}

/// Rewrite relative paths in include-style flags so they resolve from
/// `working_dir`. An empty `working_dir` leaves the flags untouched.
pub fn make_relative_paths_absolute(flags: &[String], working_dir: &Path) -> Vec<String> {
    if working_dir.as_os_str().is_empty() {
        return flags.to_vec();
    }

    let mut out = Vec::with_capacity(flags.len());
    let mut make_next_absolute = false;
    for flag in flags {
        let mut new_flag = flag.clone();

        if make_next_absolute {
            make_next_absolute = false;
            if !flag.starts_with('/') {
                new_flag = working_dir.join(flag).to_string_lossy().to_string();
            }
        }

        for path_flag in PATH_FLAGS {
            if flag == path_flag {
                make_next_absolute = true;
                break;
            }
            if let Some(path) = flag.strip_prefix(path_flag) {
                new_flag = format!("{}{}", path_flag, working_dir.join(path).to_string_lossy());
                break;
            }
        }

        if !new_flag.is_empty() {
            out.push(new_flag);
        }
    }
    out
}

/// `-x c` for C sources, `-x c++` for everything else, plus `-std=` when
/// `with_std` is set.
pub fn source_language(path: &Path, with_std: bool, cfg: &FlagsConfig) -> Vec<String> {
    let (lang, std) = if is_c_source(path) {
        ("c", &cfg.c_std)
    } else {
        ("c++", &cfg.cxx_std)
    };
    let mut flags = vec!["-x".to_string(), lang.to_string()];
    if with_std {
        flags.push(format!("-std={}", std));
    }
    flags
}

/// Adjust a kernel build's flags for clang.
pub fn kernel_flags(flags: &mut Vec<String>) {
    flags.retain(|f| !KERNEL_INCOMPATIBLE_FLAGS.contains(&f.as_str()));
    flags.push(KERNEL_UNDEFINE.to_string());
}

/// Pull the include search list out of `cc -v -E` diagnostics.
///
/// The directories are the indented lines following a `#include ...`
/// marker, up to the next line that is not indented.
pub fn parse_include_search_list(stderr: &str) -> Vec<String> {
    let mut flags = Vec::new();
    let mut in_list = false;
    for line in stderr.lines() {
        if line.starts_with("#include") {
            in_list = true;
        } else if in_list && line.starts_with(' ') {
            flags.push("-isystem".to_string());
            flags.push(line[1..].trim_end_matches('\r').to_string());
        } else {
            in_list = false;
        }
    }
    flags
}

/// Ask the compiler for its default include directories.
pub fn detect_system_includes(path: &Path, cfg: &FlagsConfig) -> Result<Vec<String>> {
    let output = Command::new(&cfg.compiler)
        .args(["-v", "-E"])
        .args(source_language(path, true, cfg))
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("Failed to execute '{}'", cfg.compiler))?;

    if !output.status.success() {
        bail!(
            "'{}' exited with {} while listing include directories",
            cfg.compiler,
            output.status
        );
    }
    Ok(parse_include_search_list(&String::from_utf8_lossy(
        &output.stderr,
    )))
}

fn non_empty_info(db: &dyn CompilationDatabase, file: &Path) -> Option<CompilationInfo> {
    db.compilation_info(file).filter(|info| !info.flags.is_empty())
}

/// Find a source file whose flags a header can use, trying CMake
/// dependency files first and then same-named siblings.
pub fn guess_compilation_info_for_header(
    cwd: &Path,
    db: &dyn CompilationDatabase,
    header: &Path,
) -> Option<(CompilationInfo, PathBuf)> {
    for candidate in depfile::depend_file_candidates(cwd, header) {
        if let Some(info) = non_empty_info(db, &candidate) {
            debug!(
                header = %header.display(),
                source = %candidate.display(),
                "paired via depend.make"
            );
            return Some((info, candidate));
        }
    }

    for ext in C_SOURCE_EXTENSIONS.iter().chain(CXX_SOURCE_EXTENSIONS) {
        let candidate = header.with_extension(ext);
        if candidate.is_file() {
            if let Some(info) = non_empty_info(db, &candidate) {
                debug!(
                    header = %header.display(),
                    source = %candidate.display(),
                    "paired by file name"
                );
                return Some((info, candidate));
            }
        }
    }
    None
}

/// Database flags for `filename`, with paths made absolute. Headers are
/// answered through a paired source file, whose path is returned instead.
pub fn compilation_info_for_file(
    cwd: &Path,
    db: Option<&dyn CompilationDatabase>,
    filename: &Path,
) -> (PathBuf, Vec<String>) {
    let Some(db) = db else {
        return (filename.to_path_buf(), Vec::new());
    };

    let (filename, info) = if is_header_file(filename) {
        match guess_compilation_info_for_header(cwd, db, filename) {
            Some((info, source)) => (source, Some(info)),
            None => (filename.to_path_buf(), None),
        }
    } else {
        (filename.to_path_buf(), db.compilation_info(filename))
    };

    match info {
        Some(info) => {
            let flags = make_relative_paths_absolute(&info.flags, &info.working_dir);
            (filename, flags)
        }
        None => (filename, Vec::new()),
    }
}

/// The answer handed back to the editor.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedFlags {
    /// File whose flags were used; a paired source file for headers.
    pub filename: PathBuf,
    pub flags: Vec<String>,
    pub do_cache: bool,
}

/// Resolve flags for `filename` as seen from `cwd` using an already loaded
/// database.
pub fn resolve_with_database(
    cwd: &Path,
    filename: &Path,
    db: Option<&dyn CompilationDatabase>,
    cfg: &FlagsConfig,
) -> ResolvedFlags {
    let (filename, mut flags) = compilation_info_for_file(cwd, db, filename);

    let with_std = flags.is_empty();
    flags.extend(source_language(&filename, with_std, cfg));

    if cwd.join(KBUILD_MARKER).is_file() {
        kernel_flags(&mut flags);
    } else if cfg.detect_system_includes && !flags.iter().any(|f| f == "-nostdinc") {
        match detect_system_includes(&filename, cfg) {
            Ok(includes) => flags.extend(includes),
            Err(e) => warn!("no system include directories: {:#}", e),
        }
    }

    flags.retain(|f| !cfg.strip.contains(f));

    ResolvedFlags {
        filename,
        flags,
        do_cache: true,
    }
}

/// Resolve flags for `filename`, loading `compile_commands.json` from `cwd`.
pub fn resolve_flags(cwd: &Path, filename: &Path, cfg: &FlagsConfig) -> ResolvedFlags {
    let db = match JsonCompilationDatabase::load(cwd) {
        Ok(db) => db,
        Err(e) => {
            warn!("ignoring compilation database: {:#}", e);
            None
        }
    };
    resolve_with_database(
        cwd,
        filename,
        db.as_ref().map(|d| d as &dyn CompilationDatabase),
        cfg,
    )
}

/// CLI entry for `pct flags`.
pub fn run_flags(
    cfg: &FlagsConfig,
    cwd: &Path,
    file: &Path,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        cwd.join(file)
    };
    let resolved = resolve_flags(cwd, &file, cfg);

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&resolved)?)?;
    } else {
        writeln!(out, "# {}", resolved.filename.display())?;
        for flag in &resolved.flags {
            writeln!(out, "{}", flag)?;
        }
    }
    Ok(())
}

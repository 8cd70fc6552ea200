//! # picluster tools
//!
//! Developer tooling for the picluster k-means project.
//!
//! - Inspect generated dataset files (24-byte header plus `f32` payload).
//! - Drive the cluster generator across parameter sweeps to build
//!   benchmark datasets.
//! - Resolve compiler flags for editor completion engines from the CMake
//!   compilation database, with header-to-source pairing.
//!
//! ## Quick Start
//!
//! ```bash
//! pct info data/cluster_data_2f_10c_16mb.bin
//! pct sweeps                     # list configured sweeps
//! pct sweep bulk                 # run one sweep
//! pct flags src/kmeans.hpp --json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`header`] | Dataset header decoding and `pct info` |
//! | [`sweep`] | Generator sweeps |
//! | [`compile_db`] | `compile_commands.json` lookup |
//! | [`depfile`] | CMake `depend.make` parsing |
//! | [`flags`] | Editor compile flag resolution |
//! | [`paths`] | Lexical path normalization |

pub mod compile_db;
pub mod config;
pub mod depfile;
pub mod flags;
pub mod header;
pub mod paths;
pub mod sweep;

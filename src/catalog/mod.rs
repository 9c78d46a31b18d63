// src/catalog/mod.rs

//! Script catalog seam.
//!
//! The execution pipeline only needs two things from wherever scripts are
//! stored: look a script up by name, and (best effort) remember which
//! arguments it was run with. Everything else about script storage lives
//! behind [`ScriptCatalog`].
//!
//! - [`memory`] provides [`InMemoryCatalog`], seeded from the `[script.*]`
//!   sections of the config file and used by the CLI and the tests.

use std::fmt::Debug;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

pub mod memory;

pub use memory::InMemoryCatalog;

/// Maximum number of argument-history entries kept per script.
pub const ARGUMENT_HISTORY_LIMIT: usize = 10;

/// The runnable unit as seen by the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub name: String,
    pub body: String,
    pub accepts_reference: bool,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptSummary {
    pub name: String,
    pub description: String,
    pub category: String,
    pub accepts_reference: bool,
}

/// One remembered invocation of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentUsage {
    pub args: String,
    pub working_dir: Option<PathBuf>,
}

pub trait ScriptCatalog: Send + Sync + Debug {
    /// Look up a script. Surrounding whitespace in `name` is ignored.
    fn get_by_name(&self, name: &str) -> Option<ScriptDescriptor>;

    /// Remember that `name` was run with `args` in `working_dir`.
    ///
    /// Callers on the execution path treat failures as non-fatal.
    fn record_argument_usage(
        &self,
        name: &str,
        args: &str,
        working_dir: Option<&std::path::Path>,
    ) -> Result<()>;

    /// All scripts, ordered by category then name.
    fn list(&self) -> Vec<ScriptSummary>;
}

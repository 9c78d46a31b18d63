use std::path::Path;

use anyhow::{Result, anyhow};
use scriptrun::catalog::{InMemoryCatalog, ScriptCatalog, ScriptDescriptor, ScriptSummary};

/// Catalog whose argument-history store is always broken.
///
/// Lookups are delegated to an [`InMemoryCatalog`]; recording usage always
/// fails, which the execution path must tolerate.
#[derive(Debug)]
pub struct BrokenHistoryCatalog {
    inner: InMemoryCatalog,
}

impl BrokenHistoryCatalog {
    pub fn new(inner: InMemoryCatalog) -> Self {
        Self { inner }
    }
}

impl ScriptCatalog for BrokenHistoryCatalog {
    fn get_by_name(&self, name: &str) -> Option<ScriptDescriptor> {
        self.inner.get_by_name(name)
    }

    fn record_argument_usage(
        &self,
        name: &str,
        _args: &str,
        _working_dir: Option<&Path>,
    ) -> Result<()> {
        Err(anyhow!("history store unavailable for '{name}'"))
    }

    fn list(&self) -> Vec<ScriptSummary> {
        self.inner.list()
    }
}

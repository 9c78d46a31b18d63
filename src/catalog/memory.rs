// src/catalog/memory.rs

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use tracing::debug;

use super::{ARGUMENT_HISTORY_LIMIT, ArgumentUsage, ScriptCatalog, ScriptDescriptor, ScriptSummary};
use crate::config::{ConfigFile, ScriptConfig};

#[derive(Debug)]
struct CatalogEntry {
    script: ScriptConfig,
    history: VecDeque<ArgumentUsage>,
}

/// Catalog held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: Mutex<BTreeMap<String, CatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        let catalog = Self::new();
        for (name, script) in cfg.script.iter() {
            catalog.insert(name, script.clone());
        }
        catalog
    }

    /// Add or replace a script. Replacing keeps the argument history.
    pub fn insert(&self, name: &str, script: ScriptConfig) {
        let mut entries = self.lock();
        match entries.get_mut(name.trim()) {
            Some(entry) => entry.script = script,
            None => {
                entries.insert(
                    name.trim().to_string(),
                    CatalogEntry {
                        script,
                        history: VecDeque::new(),
                    },
                );
            }
        }
    }

    /// Most-recent-first argument history for `name`.
    pub fn argument_history(&self, name: &str) -> Vec<ArgumentUsage> {
        self.lock()
            .get(name.trim())
            .map(|entry| entry.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CatalogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScriptCatalog for InMemoryCatalog {
    fn get_by_name(&self, name: &str) -> Option<ScriptDescriptor> {
        let name = name.trim();
        self.lock().get(name).map(|entry| ScriptDescriptor {
            name: name.to_string(),
            body: entry.script.body.clone(),
            accepts_reference: entry.script.accepts_reference,
        })
    }

    fn record_argument_usage(
        &self,
        name: &str,
        args: &str,
        working_dir: Option<&Path>,
    ) -> Result<()> {
        let name = name.trim();
        let mut entries = self.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| anyhow!("cannot record arguments for unknown script '{name}'"))?;

        let usage = ArgumentUsage {
            args: args.to_string(),
            working_dir: working_dir.map(Path::to_path_buf),
        };

        entry.history.retain(|existing| existing != &usage);
        entry.history.push_front(usage);
        entry.history.truncate(ARGUMENT_HISTORY_LIMIT);

        debug!(script = %name, entries = entry.history.len(), "recorded argument usage");
        Ok(())
    }

    fn list(&self) -> Vec<ScriptSummary> {
        let mut scripts: Vec<ScriptSummary> = self
            .lock()
            .iter()
            .map(|(name, entry)| ScriptSummary {
                name: name.clone(),
                description: entry.script.description.clone(),
                category: entry.script.category.clone(),
                accepts_reference: entry.script.accepts_reference,
            })
            .collect();
        scripts.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        scripts
    }
}

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use scriptrun::config::{ConfigFile, ExecSection, RawConfigFile, ScriptConfig};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                exec: ExecSection::default(),
                script: BTreeMap::new(),
            },
        }
    }

    pub fn with_script(mut self, name: &str, script: ScriptConfig) -> Self {
        self.config.script.insert(name.to_string(), script);
        self
    }

    /// Write temp script files into `dir` instead of the OS temp dir.
    pub fn temp_dir(mut self, dir: &Path) -> Self {
        self.config.exec.temp_dir = Some(dir.to_path_buf());
        self
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.exec.read_chunk_size = size;
        self
    }

    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.exec.kill_grace_ms = ms;
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.exec.event_buffer = capacity;
        self
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.config.exec.shell = shell.into();
        self
    }

    pub fn python(mut self, python: &str) -> Self {
        self.config.exec.python = python.into();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ScriptConfig`.
pub struct ScriptConfigBuilder {
    script: ScriptConfig,
}

impl ScriptConfigBuilder {
    pub fn new(body: &str) -> Self {
        Self {
            script: ScriptConfig {
                body: body.to_string(),
                description: String::new(),
                category: "Uncategorized".to_string(),
                accepts_reference: false,
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.script.description = text.to_string();
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.script.category = category.to_string();
        self
    }

    pub fn accepts_reference(mut self, val: bool) -> Self {
        self.script.accepts_reference = val;
        self
    }

    pub fn build(self) -> ScriptConfig {
        self.script
    }
}

// src/exec/language.rs

//! Decide how a script body is run.
//!
//! Classification is a pure function over `(name, body)`, driven by the
//! ordered [`CLASSIFICATION_RULES`] table. The first matching rule wins; a
//! script that matches no rule is a shell script.

use std::fmt;

/// Interpreters other than the shell that scripts may be written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpreter {
    Python,
}

impl Interpreter {
    /// File extension (without the dot) the materialized script gets.
    pub fn extension(&self) -> &'static str {
        match self {
            Interpreter::Python => "py",
        }
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpreter::Python => f.write_str("python"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptLanguage {
    ShellScript,
    InterpretedScript(Interpreter),
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptLanguage::ShellScript => f.write_str("shell"),
            ScriptLanguage::InterpretedScript(interp) => write!(f, "{interp}"),
        }
    }
}

/// A single predicate in the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageRule {
    /// The (trimmed) script name ends with this suffix.
    NameSuffix(&'static str),
    /// The first non-blank line of the body starts with this prefix.
    FirstLinePrefix(&'static str),
    /// The body, ignoring leading whitespace, opens with this statement.
    LeadingStatement(&'static str),
}

impl LanguageRule {
    pub fn matches(&self, name: &str, body: &str) -> bool {
        match self {
            LanguageRule::NameSuffix(suffix) => name.trim().ends_with(suffix),
            LanguageRule::FirstLinePrefix(prefix) => first_non_blank_line(body)
                .map(|line| line.trim_start().starts_with(prefix))
                .unwrap_or(false),
            LanguageRule::LeadingStatement(stmt) => body.trim_start().starts_with(stmt),
        }
    }
}

pub const CLASSIFICATION_RULES: &[(LanguageRule, Interpreter)] = &[
    (LanguageRule::NameSuffix(".py"), Interpreter::Python),
    (LanguageRule::FirstLinePrefix("#!/usr/bin/env python"), Interpreter::Python),
    (LanguageRule::FirstLinePrefix("#!/usr/bin/python"), Interpreter::Python),
    (LanguageRule::LeadingStatement("import "), Interpreter::Python),
    (LanguageRule::LeadingStatement("from "), Interpreter::Python),
];

pub fn classify(name: &str, body: &str) -> ScriptLanguage {
    CLASSIFICATION_RULES
        .iter()
        .find(|(rule, _)| rule.matches(name, body))
        .map(|(_, interp)| ScriptLanguage::InterpretedScript(*interp))
        .unwrap_or(ScriptLanguage::ShellScript)
}

fn first_non_blank_line(body: &str) -> Option<&str> {
    body.lines().find(|line| !line.trim().is_empty())
}

//! Consolidation settings.
//!
//! Handles loading settings from TOML files and provides access to the
//! built-in presets for known wikis.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collate::parse_language;
use crate::refs::CitationForm;

/// Errors that can occur when loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("'{0}' must list at least one name")]
    MissingAliases(&'static str),

    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("Invalid alias '{alias}': {message}")]
    InvalidAlias { alias: String, message: String },

    #[error("Invalid language '{tag}': {message}")]
    InvalidLanguage { tag: String, message: String },
}

/// A three-way switch: always, never, or let the caller decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Yes,
    No,
    User,
}

impl Toggle {
    /// Resolves the switch, using `user_choice` when the decision is delegated.
    pub fn resolve(self, user_choice: bool) -> bool {
        match self {
            Toggle::Yes => true,
            Toggle::No => false,
            Toggle::User => user_choice,
        }
    }
}

/// Where canonical reference definitions are placed in the rewritten article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Every definition goes into the reference-list template
    #[default]
    Template,
    /// Every used definition goes to its first use in the text
    Text,
    /// Definitions with at least this many uses go into the template
    MinUses(usize),
}

/// Settings for a consolidation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Reference-list template name and its aliases; the first is canonical
    pub template_names: Vec<String>,
    /// Group parameter name and its aliases; the first is canonical
    pub group_names: Vec<String>,
    /// Refs parameter name and its aliases; the first is canonical
    pub refs_names: Vec<String>,
    #[serde(default = "default_sort_refs")]
    pub sort_refs: Toggle,
    #[serde(default = "default_use_template_r")]
    pub use_template_r: Toggle,
    /// Edit summary added when the article changed
    #[serde(default)]
    pub summary: String,
    #[serde(default = "default_summary_separator")]
    pub summary_separator: String,
    #[serde(default)]
    pub placement: Placement,
    /// Content language whose collation orders sorted references
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_sort_refs() -> Toggle {
    Toggle::User
}

fn default_use_template_r() -> Toggle {
    Toggle::No
}

fn default_summary_separator() -> String {
    " + ".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Config {
    /// Checks that every alias list names at least one template or parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lists: [(&'static str, &Vec<String>); 3] = [
            ("template_names", &self.template_names),
            ("group_names", &self.group_names),
            ("refs_names", &self.refs_names),
        ];
        for (field, names) in lists {
            if names.iter().all(|n| n.trim().is_empty()) {
                return Err(ConfigError::MissingAliases(field));
            }
        }
        parse_language(&self.language)?;
        Ok(())
    }

    /// The canonical reference-list template name.
    pub fn template_name(&self) -> &str {
        canonical(&self.template_names)
    }

    /// The canonical refs parameter name.
    pub fn refs_name(&self) -> &str {
        canonical(&self.refs_names)
    }

    /// Turns the settings into pass options, resolving delegated switches
    /// with the caller's choices.
    pub fn options(&self, user_sort: bool, user_template_r: bool) -> Options {
        Options {
            sort: self.sort_refs.resolve(user_sort),
            citation_form: if self.use_template_r.resolve(user_template_r) {
                CitationForm::TemplateR
            } else {
                CitationForm::Tag
            },
            placement: self.placement,
        }
    }
}

fn canonical(names: &[String]) -> &str {
    names.first().map(|n| n.trim()).unwrap_or_default()
}

/// Resolved options for one consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Sort template references alphabetically by name
    pub sort: bool,
    pub citation_form: CitationForm,
    pub placement: Placement,
}

/// Loads settings from a TOML file and validates them.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, has a
/// field of the wrong type, or has an empty alias list.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates settings from TOML text.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Single source of truth for builtin presets: (name, TOML content).
const BUILTIN_PRESETS: &[(&str, &str)] = &[("en", EN_PRESET), ("et", ET_PRESET)];

/// Returns a built-in preset by name.
pub fn builtin_preset(name: &str) -> Result<Config, ConfigError> {
    let content = BUILTIN_PRESETS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, content)| *content)
        .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?;
    parse_config(content)
}

/// Returns the list of available builtin preset names.
pub fn builtin_preset_names() -> Vec<&'static str> {
    BUILTIN_PRESETS.iter().map(|(n, _)| *n).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            template_names: vec!["reflist".to_string()],
            group_names: vec!["group".to_string()],
            refs_names: vec!["refs".to_string()],
            sort_refs: default_sort_refs(),
            use_template_r: default_use_template_r(),
            summary: String::new(),
            summary_separator: default_summary_separator(),
            placement: Placement::Template,
            language: default_language(),
        }
    }
}

/// English Wikipedia.
const EN_PRESET: &str = r#"
template_names = ["reflist"]
group_names = ["group"]
refs_names = ["refs"]
sort_refs = "user"
use_template_r = "user"
summary = "Converted references to list-defined format with [[User:Cumbril/References Consolidator|References Consolidator]]"
summary_separator = " + "
language = "en"
"#;

/// Estonian Wikipedia.
const ET_PRESET: &str = r#"
template_names = ["viited", "reflist"]
group_names = ["grupp", "group"]
refs_names = ["allikad", "refs"]
sort_refs = "user"
use_template_r = "no"
summary = "Koondasin skripti abil viited"
summary_separator = " + "
language = "et"
"#;

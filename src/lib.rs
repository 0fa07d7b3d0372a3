//! refcon-tools: consolidate wiki-markup references into list-defined reference templates.
//!
//! This library provides functionality to:
//! - Locate reference-list templates and read their parameters
//! - Parse `<ref>` references and citations from wikitext
//! - Deduplicate references per template and resolve citations against them
//! - Rewrite the article with compact citations and rebuilt templates

pub mod collate;
pub mod config;
pub mod expand;
pub mod index;
pub mod locate;
pub mod output;
pub mod params;
pub mod processor;
pub mod refs;
pub mod resolver;
pub mod segment;
pub mod template;
pub mod wikitext;

pub use config::{builtin_preset, load_config, Config, Options, Placement};
pub use expand::{LocalExpander, StaticExpander, TemplateExpander};
pub use output::append_summary;
pub use processor::{consolidate, Outcome, ProcessorError, Report};
pub use refs::{Citation, RefIdent, Reference};
pub use wikitext::{extract_citations, extract_references, scan_refs};

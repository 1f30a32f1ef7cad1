//! Turns an entry template argument into the final prompt text.

use crate::config::Config;
use crate::context::{ADDITIONAL_INSTRUCTIONS, RenderContext, RenderTrace};
use crate::error::{Result, TemplateError};
use crate::git::GitManager;
use crate::index::{FileEntry, FileIndex, PathSpec};
use crate::resolver;
use crate::source::{GitRevision, Source, WorkingTree};
use crate::template::TemplateEngine;
use colored::*;
use log::{info, warn};
use serde_json::Value;
use similar::TextDiff;
use std::path::{Path, PathBuf};

const BASE_REVISION: &str = "HEAD";

pub struct PromptBuilder<'c> {
    root: PathBuf,
    config: &'c Config,
    defines: Vec<(String, String)>,
    changed: bool,
}

impl<'c> PromptBuilder<'c> {
    pub fn new(root: &Path, config: &'c Config) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            defines: Vec::new(),
            changed: false,
        }
    }

    /// Variables for the entry template, as given with `-D KEY=VALUE`
    pub fn with_defines(mut self, defines: Vec<(String, String)>) -> Self {
        self.defines = defines;
        self
    }

    /// Append a diff of the prompt against the last commit
    pub fn with_changes(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    /// Resolve and render `entry_arg`, then append `extra_instructions` as a
    /// trailing paragraph.
    pub fn build(&self, entry_arg: &str, extra_instructions: Option<&str>) -> Result<String> {
        let index = FileIndex::scan(&self.root, &self.config.index.ignore)?;
        let entry = self.locate_entry(entry_arg, &index)?;
        info!("Entry template: {}", entry.path().display());

        let context = self.initial_context(extra_instructions);
        let mut prompt = self.render(&index, &WorkingTree, &entry, &context)?;

        if self.changed {
            prompt = self.append_changes(&index, &entry, &context, prompt);
        }

        if let Some(instructions) = extra_instructions {
            prompt = append_instructions(&prompt, &self.config.instructions_heading, instructions);
        }

        Ok(prompt)
    }

    /// An existing path relative to the root wins outright; anything else is
    /// searched for as a fragment.
    fn locate_entry(&self, entry_arg: &str, index: &FileIndex) -> Result<FileEntry> {
        let direct = self.root.join(entry_arg);
        if direct.is_file() {
            let path = direct.canonicalize().map_err(|source| TemplateError::Io {
                path: direct.clone(),
                source,
            })?;
            return Ok(FileEntry::new(index.root(), path));
        }

        let spec = PathSpec::parse(entry_arg).ok_or_else(|| TemplateError::NotFound {
            spec: entry_arg.to_string(),
            root: index.root().to_path_buf(),
        })?;
        resolver::resolve(&spec, index).cloned()
    }

    fn initial_context(&self, extra_instructions: Option<&str>) -> RenderContext {
        let mut context: RenderContext = self
            .defines
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if let Some(instructions) = extra_instructions {
            context = context.with(ADDITIONAL_INSTRUCTIONS, Value::String(instructions.to_string()));
        }
        context
    }

    fn render(&self, index: &FileIndex, source: &dyn Source, entry: &FileEntry, context: &RenderContext) -> Result<String> {
        TemplateEngine::new(index, source)
            .with_reference_marker(self.config.reference_marker.as_str())
            .render(entry, context, &mut RenderTrace::new())
    }

    fn append_changes(&self, index: &FileIndex, entry: &FileEntry, context: &RenderContext, working: String) -> String {
        let previous = match self.render_at_base(index, entry, context) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Could not render {} at {}: {}", entry.path().display(), BASE_REVISION, e);
                eprintln!(
                    "{} Could not retrieve last commit version, using working copy only: {}",
                    "⚠".yellow(),
                    e
                );
                return working;
            }
        };

        let diff = unified_diff(&previous, &working);
        if diff.is_empty() {
            info!("Prompt unchanged since {}", BASE_REVISION);
            return working;
        }

        format!(
            "{}\n\nThis prompt has been run before and has changed since the last commit. Here is the diff against that version:\n\n```diff\n{}\n```",
            working,
            diff.trim_end()
        )
    }

    fn render_at_base(&self, index: &FileIndex, entry: &FileEntry, context: &RenderContext) -> eyre::Result<String> {
        let git = GitManager::new(&self.root);
        if !git.is_repo() {
            return Err(eyre::eyre!("{} is not a git repository", self.root.display()));
        }
        if !git.has_commit(BASE_REVISION) {
            return Err(eyre::eyre!("no {} commit yet", BASE_REVISION));
        }

        let source = GitRevision::new(git, BASE_REVISION);
        if source.read(entry.path())?.is_none() {
            return Err(eyre::eyre!(
                "{} does not exist at {}",
                entry.path().display(),
                BASE_REVISION
            ));
        }
        Ok(self.render(index, &source, entry, context)?)
    }
}

fn append_instructions(prompt: &str, heading: &str, instructions: &str) -> String {
    if heading.is_empty() {
        format!("{}\n\n{}", prompt, instructions)
    } else {
        format!("{}\n\n{}\n\n{}", prompt, heading, instructions)
    }
}

/// Unified diff from the committed prompt to the working one; empty when
/// they are identical.
fn unified_diff(previous: &str, current: &str) -> String {
    if previous == current {
        return String::new();
    }
    TextDiff::from_lines(previous, current)
        .unified_diff()
        .missing_newline_hint(false)
        .header("prompt (last commit)", "prompt (working copy)")
        .to_string()
}

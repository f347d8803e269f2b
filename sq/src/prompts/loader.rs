//! Prompt Loader
//!
//! Loads step brief templates from the override directory or falls back to
//! embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::collab::PreviousEmail;
use crate::domain::StepKind;

/// Context for rendering a step brief
#[derive(Debug, Clone, Serialize)]
pub struct BriefContext {
    pub display_name: String,
    pub day: u8,
    pub step_label: String,
    pub prior_touch_summaries: Vec<String>,
    pub previous_emails: Vec<PreviousEmail>,
}

/// Loads and renders step brief templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Override directory holding `{step_kind}.pmt`
    override_dir: Option<PathBuf>,
}

impl std::fmt::Debug for PromptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptLoader")
            .field("override_dir", &self.override_dir)
            .finish()
    }
}

impl PromptLoader {
    /// Create a loader that checks `dir` before the embedded templates
    ///
    /// A directory that does not exist is ignored.
    pub fn new(dir: Option<&Path>) -> Self {
        debug!(?dir, "PromptLoader::new: called");
        let override_dir = dir.filter(|d| d.is_dir()).map(Path::to_path_buf);
        if dir.is_some() && override_dir.is_none() {
            debug!("PromptLoader::new: override directory missing, using embedded prompts");
        }
        Self {
            hbs: Self::engine(),
            override_dir,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Briefs are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    fn load_template(&self, kind: StepKind) -> Result<String> {
        debug!(%kind, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", kind));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt override {}: {}", path.display(), e));
            }
        }
        Ok(embedded::get_embedded(kind).to_string())
    }

    /// Render the brief for a step kind
    pub fn render(&self, kind: StepKind, context: &BriefContext) -> Result<String> {
        debug!(%kind, day = context.day, "PromptLoader::render: called");
        let template = self.load_template(kind)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render {} template: {}", kind, e))
    }
}

//! Step brief templates
//!
//! Each step kind has a `.pmt` (prompt template) rendered into the brief the
//! content writer receives.
//!
//! Template loading chain:
//! 1. `{prompts.dir}/{step_kind}.pmt` (configured override)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{BriefContext, PromptLoader};

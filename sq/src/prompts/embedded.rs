//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

use crate::domain::StepKind;

pub const EMAIL_INTRO: &str = include_str!("../../prompts/email_intro.pmt");

pub const EMAIL_FOLLOW_UP: &str = include_str!("../../prompts/email_follow_up.pmt");

/// Talking points for the call step
pub const CALL: &str = include_str!("../../prompts/call.pmt");

pub const EMAIL_VALUE_ADD: &str = include_str!("../../prompts/email_value_add.pmt");

pub const EMAIL_BREAKUP: &str = include_str!("../../prompts/email_breakup.pmt");

/// Get the embedded template for a step kind
pub fn get_embedded(kind: StepKind) -> &'static str {
    debug!(%kind, "get_embedded: called");
    match kind {
        StepKind::EmailIntro => EMAIL_INTRO,
        StepKind::EmailFollowUp => EMAIL_FOLLOW_UP,
        StepKind::Call => CALL,
        StepKind::EmailValueAdd => EMAIL_VALUE_ADD,
        StepKind::EmailBreakup => EMAIL_BREAKUP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BLUEPRINT;

    #[test]
    fn test_every_step_kind_has_a_template() {
        for step in BLUEPRINT.iter() {
            let template = get_embedded(step.kind);
            assert!(template.contains("{{display_name}}"), "{} template lacks display_name", step.kind);
        }
    }

    #[test]
    fn test_breakup_template() {
        assert!(get_embedded(StepKind::EmailBreakup).contains("close the loop"));
    }
}

//! The five-day outreach cadence
//!
//! Every enrollment follows the same fixed blueprint: intro email, follow-up
//! email, phone call, value-add email, breakup email. One touch per day.

use serde::{Deserialize, Serialize};

/// First day of the cadence
pub const FIRST_DAY: u8 = 1;

/// Last day of the cadence; executing this step completes the sequence
pub const LAST_DAY: u8 = 5;

/// Delivery channel for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Phone,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Phone => write!(f, "phone"),
        }
    }
}

/// What kind of touch a step is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    EmailIntro,
    EmailFollowUp,
    Call,
    EmailValueAdd,
    EmailBreakup,
}

impl StepKind {
    /// The channel is fixed by the kind
    pub const fn channel(self) -> Channel {
        match self {
            Self::Call => Channel::Phone,
            Self::EmailIntro | Self::EmailFollowUp | Self::EmailValueAdd | Self::EmailBreakup => Channel::Email,
        }
    }

    /// Human-readable label for status displays
    pub fn label(self) -> &'static str {
        match self {
            Self::EmailIntro => "Intro email",
            Self::EmailFollowUp => "Follow-up email",
            Self::Call => "Phone call",
            Self::EmailValueAdd => "Value-add email",
            Self::EmailBreakup => "Breakup email",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailIntro => write!(f, "email_intro"),
            Self::EmailFollowUp => write!(f, "email_follow_up"),
            Self::Call => write!(f, "call"),
            Self::EmailValueAdd => write!(f, "email_value_add"),
            Self::EmailBreakup => write!(f, "email_breakup"),
        }
    }
}

/// One entry of the cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlueprintStep {
    pub day: u8,
    pub kind: StepKind,
    pub channel: Channel,
}

impl BlueprintStep {
    const fn new(day: u8, kind: StepKind) -> Self {
        Self {
            day,
            kind,
            channel: kind.channel(),
        }
    }
}

/// The cadence, ordered by day
pub const BLUEPRINT: [BlueprintStep; LAST_DAY as usize] = [
    BlueprintStep::new(1, StepKind::EmailIntro),
    BlueprintStep::new(2, StepKind::EmailFollowUp),
    BlueprintStep::new(3, StepKind::Call),
    BlueprintStep::new(4, StepKind::EmailValueAdd),
    BlueprintStep::new(5, StepKind::EmailBreakup),
];

/// Look up the blueprint step for a day (1-based)
pub fn step_for_day(day: u8) -> Option<&'static BlueprintStep> {
    if (FIRST_DAY..=LAST_DAY).contains(&day) {
        BLUEPRINT.get(usize::from(day - 1))
    } else {
        None
    }
}

//! Step records - per-enrollment state for one touch of the cadence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::blueprint::{BlueprintStep, Channel, StepKind};

/// Step lifecycle status
///
/// `Pending`, `Generating` and `Ready` are reversible; `Sent`, `Called` and
/// `Skipped` are terminal for the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// No content yet
    #[default]
    Pending,
    /// Writer call in flight
    Generating,
    /// Content drafted, awaiting execution
    Ready,
    /// Email delivered to the transport
    Sent,
    /// Call placed
    Called,
    /// Deliberately not performed (policy)
    Skipped,
}

impl StepStatus {
    /// Check if the step has left the reversible states
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Called | Self::Skipped)
    }

    /// Check if content may be (re)generated from this status
    pub fn is_regenerable(self) -> bool {
        matches!(self, Self::Pending | Self::Ready)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Ready => write!(f, "ready"),
            Self::Sent => write!(f, "sent"),
            Self::Called => write!(f, "called"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a step was skipped instead of executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Lead has no phone number on file
    NoPhoneNumber,
    /// Voice transport reports calling hours are closed
    OutsideCallingHours,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPhoneNumber => write!(f, "no phone number on file"),
            Self::OutsideCallingHours => write!(f, "outside calling hours"),
        }
    }
}

/// Drafted content for a step
///
/// For email steps this is the message; for the call step it is an optional
/// talking-points script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContent {
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

impl StepContent {
    /// Build content from edited plain text, deriving the HTML body
    pub fn from_text(subject: impl Into<String>, body_text: impl Into<String>) -> Self {
        let body_text = body_text.into();
        let body_html = text_to_html(&body_text);
        Self {
            subject: subject.into(),
            body_text,
            body_html,
        }
    }
}

/// Convert plain text to minimal HTML: blank lines separate paragraphs,
/// single newlines become `<br>`.
pub fn text_to_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// State of one step within an enrollment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub day: u8,
    pub kind: StepKind,
    pub channel: Channel,
    pub status: StepStatus,

    /// Drafted content (present once the step has been generated)
    pub content: Option<StepContent>,

    /// A human overrode the generated content
    pub edited: bool,

    /// Transport delivery ID for a sent email
    pub delivery_id: Option<String>,

    /// Opaque call ID returned by the voice transport
    pub call_reference: Option<String>,

    /// Provider-reported call status
    pub call_status: Option<String>,

    pub skip_reason: Option<SkipReason>,

    /// Last collaborator failure for this step (cleared on success)
    pub last_error: Option<String>,

    pub executed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// Create a pending step from its blueprint entry
    pub fn from_blueprint(step: &BlueprintStep) -> Self {
        Self {
            day: step.day,
            kind: step.kind,
            channel: step.channel,
            status: StepStatus::Pending,
            content: None,
            edited: false,
            delivery_id: None,
            call_reference: None,
            call_status: None,
            skip_reason: None,
            last_error: None,
            executed_at: None,
        }
    }

    pub fn is_email(&self) -> bool {
        self.channel == Channel::Email
    }

    /// Check if the step may be executed from its current status
    ///
    /// Email steps need drafted content; the call step needs none.
    pub fn is_executable(&self) -> bool {
        match self.channel {
            Channel::Email => self.status == StepStatus::Ready,
            Channel::Phone => matches!(self.status, StepStatus::Pending | StepStatus::Ready),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.content.as_ref().map(|c| c.subject.as_str())
    }

    pub fn body_text(&self) -> Option<&str> {
        self.content.as_ref().map(|c| c.body_text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::BLUEPRINT;

    #[test]
    fn test_step_status_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Generating.is_terminal());
        assert!(!StepStatus::Ready.is_terminal());
        assert!(StepStatus::Sent.is_terminal());
        assert!(StepStatus::Called.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_step_status_regenerable() {
        assert!(StepStatus::Pending.is_regenerable());
        assert!(StepStatus::Ready.is_regenerable());
        assert!(!StepStatus::Generating.is_regenerable());
        assert!(!StepStatus::Sent.is_regenerable());
    }

    #[test]
    fn test_from_blueprint_is_pending() {
        let step = StepRecord::from_blueprint(&BLUEPRINT[0]);
        assert_eq!(step.day, 1);
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.content.is_none());
        assert!(!step.edited);
    }

    #[test]
    fn test_executable_by_channel() {
        let mut email = StepRecord::from_blueprint(&BLUEPRINT[0]);
        assert!(!email.is_executable());
        email.status = StepStatus::Ready;
        assert!(email.is_executable());

        let mut call = StepRecord::from_blueprint(&BLUEPRINT[2]);
        assert!(call.is_executable());
        call.status = StepStatus::Ready;
        assert!(call.is_executable());
        call.status = StepStatus::Called;
        assert!(!call.is_executable());
    }

    #[test]
    fn test_text_to_html() {
        let html = text_to_html("Hi Dana,\n\nQuick question <re: pricing>\nThanks & regards");
        assert_eq!(html, "<p>Hi Dana,</p>\n<p>Quick question &lt;re: pricing&gt;<br>Thanks &amp; regards</p>");
    }

    #[test]
    fn test_content_from_text() {
        let content = StepContent::from_text("Subject", "Line one");
        assert_eq!(content.body_html, "<p>Line one</p>");
    }
}

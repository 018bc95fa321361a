//! Presentation events: status lines and section toggles.
//!
//! The core never renders anything. It emits events through a
//! [`Presentation`] sink and lets the front end decide what to draw.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

/// Toggleable views of the front end
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Section {
    Reveal,
    JoinGame,
    ClaimTimeout,
    Result,
}

impl Section {
    /// Element id used by the web front end
    pub fn id(&self) -> &'static str {
        match self {
            Section::Reveal => "revealSection",
            Section::JoinGame => "joinGameSection",
            Section::ClaimTimeout => "claimTimeoutSection",
            Section::Result => "resultSection",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationEvent {
    Status { message: String, severity: Severity },
    Section { section: Section, visible: bool },
}

/// Sink for presentation events
pub trait Presentation: Send + Sync {
    fn update_status(&self, message: &str, severity: Severity);

    fn toggle_section(&self, section: Section, visible: bool);
}

/// Presentation that forwards every event into an unbounded channel
#[derive(Clone)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<PresentationEvent>,
}

impl EventChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PresentationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: PresentationEvent) {
        // A closed receiver only means nobody is watching anymore
        if self.tx.send(event).is_err() {
            debug!("presentation receiver dropped");
        }
    }
}

impl Presentation for EventChannel {
    fn update_status(&self, message: &str, severity: Severity) {
        self.send(PresentationEvent::Status {
            message: message.to_string(),
            severity,
        });
    }

    fn toggle_section(&self, section: Section, visible: bool) {
        self.send(PresentationEvent::Section { section, visible });
    }
}

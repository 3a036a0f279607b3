//! Duplicate suppression for decoder output.
//!
//! A QR code held in front of the camera is decoded on every frame. The
//! router remembers the last forwarded text and drops exact repeats until
//! the session clears it.

use crate::error::ParseError;
use crate::parser::{self, DecodedPayload};

/// Outcome of routing one decode event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Identical to the last forwarded text; nothing to do.
    Duplicate,
    /// New text, already run through the parser.
    Forward(Result<DecodedPayload, ParseError>),
}

/// Filters repeated decode events and forwards new ones to the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeEventRouter {
    last_scanned: Option<String>,
}

impl DecodeEventRouter {
    /// Create a router with nothing scanned yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_scanned: None }
    }

    /// Route one decode event.
    pub fn route(&mut self, raw_text: &str) -> Routed {
        if self.last_scanned.as_deref() == Some(raw_text) {
            metrics::counter!("scanner.decode.duplicates").increment(1);
            tracing::trace!("Dropped duplicate decode event");
            return Routed::Duplicate;
        }

        self.last_scanned = Some(raw_text.to_string());
        Routed::Forward(parser::parse(raw_text))
    }

    /// The last text forwarded to the parser.
    #[must_use]
    pub fn last_scanned(&self) -> Option<&str> {
        self.last_scanned.as_deref()
    }

    /// Forget the last scanned text so the same code can be processed again.
    pub fn clear(&mut self) {
        self.last_scanned = None;
    }
}

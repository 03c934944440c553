//! Error taxonomy for the bidder.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::PairingKey;

#[derive(Error, Debug)]
pub enum BidError {
    /// Transient failure talking to, or parsing data from, the portal.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The portal has not published the requested data yet.
    #[error("{what} not yet available for {year_month}")]
    NotYetAvailable { what: String, year_month: String },

    /// A replay stream ran out of recorded data.
    #[error("replay data exhausted in {}", .0.display())]
    ReplayExhausted(PathBuf),

    /// A logic bug, e.g. dropping a pairing the schedule doesn't hold.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("unknown pairing {0}")]
    UnknownPairing(PairingKey),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BidError {
    /// Whether a poller should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BidError::Fetch(_)
                | BidError::NotYetAvailable { .. }
                | BidError::Io(_)
                | BidError::Json(_)
                | BidError::Http(_)
                | BidError::UnknownPairing(_)
        )
    }
}

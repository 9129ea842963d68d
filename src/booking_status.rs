use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

use crate::error::BookingError;

/// Canonical lifecycle status of a booking, as stored in `booking_status.status`.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,   // Submitted, awaiting confirmation
    #[default]
    Confirmed, // Accepted by the restaurant
    Arrived,   // Guests have been seated
    Completed, // Visit finished
    NoShow,    // Guests never arrived
    Declined,  // Rejected by the restaurant
}

impl BookingStatus {
    /// Maps a raw status string to its canonical status.
    ///
    /// The input is key-sanitized first: lower-cased, stripped of everything
    /// but `[a-z0-9_-]`, hyphens folded to underscores.
    pub fn normalize(raw: &str) -> Result<Self, BookingError> {
        let key = sanitize_key(raw).replace('-', "_");
        if key.is_empty() {
            return Err(BookingError::InvalidStatus(raw.to_owned()));
        }
        BookingStatus::from_str(&key).map_err(|_| BookingError::InvalidStatus(raw.to_owned()))
    }

    /// Like `normalize`, substituting `Confirmed` for invalid input.
    pub fn normalize_or_default(raw: &str) -> Self {
        Self::normalize(raw).unwrap_or_else(|e| {
            debug!("{} - using '{}'", e, BookingStatus::default());
            BookingStatus::default()
        })
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn sanitize_key(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

//! Plain data types scraped from, or sent to, the portal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One `<option>` of a portal dropdown.
///
/// `text` is the stable, user-facing label. `value` is an opaque server id
/// that is only meaningful within the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub text: String,
    pub value: String,
}

/// A row of the usage-record table. Values are kept exactly as displayed;
/// the portal mixes units and number formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub date: String,
    pub meter_name: String,
    pub usage: String,
    pub price: String,
}

/// The three dropdown levels of the room picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Building,
    Floor,
    Room,
}

impl SelectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Floor => "floor",
            Self::Room => "room",
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room as the user names it (dropdown labels).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub building: String,
    pub floor: String,
    pub room: String,
}

impl Selection {
    pub fn new(
        building: impl Into<String>,
        floor: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            building: building.into(),
            floor: floor.into(),
            room: room.into(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.building, self.floor, self.room)
    }
}

/// The server-side option values a [`Selection`] resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionValues {
    pub building: String,
    pub floor: String,
    pub room: String,
}

/// Everything one successful scrape yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub records: Vec<UsageRecord>,
    pub remaining_balance: Option<String>,
}

//! Limited record types - events, favorite contacts and destinations.
//!
//! All three share the [`Record`] shape: a stable id assigned at creation plus
//! category-specific fields. Each type knows the storage key of its collection.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a record. Never reused once generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The "not yet assigned" id
    #[must_use]
    pub const fn unset() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this id still needs assigning
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The three limited record categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Calendar events, limited per day
    Event,
    /// Favorite contacts shown on the phone screen
    Contact,
    /// Frequently visited places shown on the map screen
    Destination,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Event => "event",
            Self::Contact => "contact",
            Self::Destination => "destination",
        };
        f.write_str(name)
    }
}

/// Shape shared by every limited record.
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Key the collection snapshot is stored under
    const STORAGE_KEY: &'static str;
    /// Category of this record type
    const KIND: RecordKind;

    /// Current id
    fn id(&self) -> RecordId;

    /// Replaces the id. Only collections call this, when adding.
    fn assign_id(&mut self, id: RecordId);
}

/// Marker for record types whose display order the user can change.
pub trait Reorderable: Record {}

/// Local calendar day of `instant` in `tz`. Day-based limits and calendar
/// views both count days this way, never as rolling 24 hour windows.
#[must_use]
pub fn local_day<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: RecordId,
    /// When the event happens
    pub date: DateTime<Utc>,
    /// What the event is (e.g., "病院")
    pub title: String,
}

impl Event {
    /// Creates an event with a fresh id
    #[must_use]
    pub fn new(date: DateTime<Utc>, title: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            date,
            title: title.into(),
        }
    }

    /// Calendar day of this event in `tz`
    #[must_use]
    pub fn local_day<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        local_day(self.date, tz)
    }
}

impl Record for Event {
    const STORAGE_KEY: &'static str = "yasasuma_events";
    const KIND: RecordKind = RecordKind::Event;

    fn id(&self) -> RecordId {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

/// Someone the user calls often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier
    pub id: RecordId,
    /// Display name (e.g., "お母さん")
    pub name: String,
    /// Phone number as dialed
    pub phone: String,
}

impl Contact {
    /// Creates a contact with a fresh id
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            phone: phone.into(),
        }
    }
}

impl Record for Contact {
    const STORAGE_KEY: &'static str = "yasasuma_favoriteContacts";
    const KIND: RecordKind = RecordKind::Contact;

    fn id(&self) -> RecordId {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// A place the user goes to often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Unique identifier
    pub id: RecordId,
    /// Display name (e.g., "病院")
    pub name: String,
    /// Free-form note (e.g., "かかりつけの病院")
    pub detail: String,
    /// Where the place is
    pub coordinate: Coordinate,
}

impl Destination {
    /// Creates a destination with a fresh id. The name is trimmed.
    #[must_use]
    pub fn new(name: &str, detail: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: RecordId::new(),
            name: name.trim().to_string(),
            detail: detail.into(),
            coordinate,
        }
    }
}

impl Record for Destination {
    const STORAGE_KEY: &'static str = "yasasuma_destinations";
    const KIND: RecordKind = RecordKind::Destination;

    fn id(&self) -> RecordId {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl Reorderable for Destination {}

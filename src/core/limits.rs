//! Free tier limit decisions.
//!
//! Pure functions over the entitlement state and a snapshot of the relevant
//! collection. Unlocked users are never limited; free users may keep a fixed
//! number of contacts and destinations and a fixed number of events per local
//! calendar day.

use crate::core::entitlement::EntitlementState;
use crate::core::models::{Contact, Destination, Event, RecordId, local_day};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

/// Record limits applied when no plan is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FreeLimits {
    /// Maximum favorite contacts
    pub contacts: usize,
    /// Maximum destinations
    pub destinations: usize,
    /// Maximum events on a single calendar day
    pub events_per_day: usize,
}

impl Default for FreeLimits {
    fn default() -> Self {
        Self {
            contacts: 2,
            destinations: 2,
            events_per_day: 1,
        }
    }
}

/// Decides whether adds and edits stay within the free tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitPolicy {
    limits: FreeLimits,
}

impl LimitPolicy {
    /// Policy enforcing `limits`
    #[must_use]
    pub const fn new(limits: FreeLimits) -> Self {
        Self { limits }
    }

    /// Whether another favorite contact may be added.
    #[must_use]
    pub const fn can_add_contact(&self, entitlement: &EntitlementState, contacts: &[Contact]) -> bool {
        entitlement.is_unlocked() || contacts.len() < self.limits.contacts
    }

    /// Whether another destination may be added.
    #[must_use]
    pub const fn can_add_destination(
        &self,
        entitlement: &EntitlementState,
        destinations: &[Destination],
    ) -> bool {
        entitlement.is_unlocked() || destinations.len() < self.limits.destinations
    }

    /// Whether an event may be added on the local calendar day of `target`.
    #[must_use]
    pub fn can_add_event<Tz: TimeZone>(
        &self,
        entitlement: &EntitlementState,
        events: &[Event],
        target: DateTime<Utc>,
        tz: &Tz,
    ) -> bool {
        if entitlement.is_unlocked() {
            return true;
        }
        let day = local_day(target, tz);
        count_on_day(events, day, tz, None) < self.limits.events_per_day
    }

    /// Whether `edited` may be saved with date `new_date`.
    ///
    /// The edited event itself is excluded from the day count, so changing only
    /// the time never trips the limit, while moving it onto a full day does.
    #[must_use]
    pub fn can_edit_event<Tz: TimeZone>(
        &self,
        entitlement: &EntitlementState,
        events: &[Event],
        edited: RecordId,
        new_date: DateTime<Utc>,
        tz: &Tz,
    ) -> bool {
        if entitlement.is_unlocked() {
            return true;
        }
        let day = local_day(new_date, tz);
        count_on_day(events, day, tz, Some(edited)) < self.limits.events_per_day
    }
}

fn count_on_day<Tz: TimeZone>(
    events: &[Event],
    day: NaiveDate,
    tz: &Tz,
    excluding: Option<RecordId>,
) -> usize {
    events
        .iter()
        .filter(|e| Some(e.id) != excluding)
        .filter(|e| e.local_day(tz) == day)
        .count()
}

//! Add-flow gating and sheet routing.
//!
//! Pressing an add button asks the controller for a decision, evaluated once
//! against the collection as it is at press time. Allowed presses open the add
//! form; denied ones open the paywall and the form never appears. Edits and
//! deletes are not limit-gated, except that saving an edited event may not move
//! it onto a day that is already full.

use crate::core::entitlement::EntitlementState;
use crate::core::limits::LimitPolicy;
use crate::core::models::{Contact, Destination, Event, RecordId, RecordKind};
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info};

/// Which sheet the screen should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sheet {
    /// Nothing presented
    #[default]
    None,
    /// Form for a new record
    AddForm(RecordKind),
    /// Form editing an existing record
    EditForm(RecordId),
    /// Upgrade offer
    Paywall,
}

/// Decision state of the current add press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// No press being handled
    #[default]
    Idle,
    /// Policy being evaluated
    PendingDecision(RecordKind),
    /// Add form may be shown
    Allowed(RecordKind),
    /// Paywall must be shown instead
    Denied(RecordKind),
}

/// Snapshot the add decision is made against.
#[derive(Debug, Clone, Copy)]
pub enum AddRequest<'a> {
    /// New favorite contact
    Contact(&'a [Contact]),
    /// New destination
    Destination(&'a [Destination]),
    /// New event on the local day of `target`
    Event {
        /// Current events
        events: &'a [Event],
        /// Day the user is adding to
        target: DateTime<Utc>,
    },
}

impl AddRequest<'_> {
    /// Category being added
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Contact(_) => RecordKind::Contact,
            Self::Destination(_) => RecordKind::Destination,
            Self::Event { .. } => RecordKind::Event,
        }
    }
}

/// Routes add/edit presses to forms or the paywall.
#[derive(Debug, Clone)]
pub struct GateController<Tz: TimeZone> {
    policy: LimitPolicy,
    tz: Tz,
    state: GateState,
    sheet: Sheet,
}

impl<Tz: TimeZone> GateController<Tz> {
    /// Controller evaluating `policy` with calendar days in `tz`
    #[must_use]
    pub const fn new(policy: LimitPolicy, tz: Tz) -> Self {
        Self {
            policy,
            tz,
            state: GateState::Idle,
            sheet: Sheet::None,
        }
    }

    /// Current decision state
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Sheet to present
    #[must_use]
    pub const fn sheet(&self) -> Sheet {
        self.sheet
    }

    /// Time zone used for calendar days
    #[must_use]
    pub const fn time_zone(&self) -> &Tz {
        &self.tz
    }

    /// Handles an add-button press.
    pub fn request_add(&mut self, entitlement: &EntitlementState, request: AddRequest<'_>) -> Sheet {
        let kind = request.kind();
        self.state = GateState::PendingDecision(kind);

        let allowed = match request {
            AddRequest::Contact(contacts) => self.policy.can_add_contact(entitlement, contacts),
            AddRequest::Destination(destinations) => {
                self.policy.can_add_destination(entitlement, destinations)
            }
            AddRequest::Event { events, target } => {
                self.policy
                    .can_add_event(entitlement, events, target, &self.tz)
            }
        };

        if allowed {
            debug!("Add {} allowed", kind);
            self.state = GateState::Allowed(kind);
            self.sheet = Sheet::AddForm(kind);
        } else {
            info!("Add {} denied by free tier limit, showing paywall", kind);
            self.state = GateState::Denied(kind);
            self.sheet = Sheet::Paywall;
        }
        self.sheet
    }

    /// Opens the edit form for `id`. Never limit-gated.
    pub fn request_edit(&mut self, id: RecordId) -> Sheet {
        self.state = GateState::Idle;
        self.sheet = Sheet::EditForm(id);
        self.sheet
    }

    /// Checks an edited event before saving. A denial switches to the paywall.
    pub fn check_event_edit(
        &mut self,
        entitlement: &EntitlementState,
        events: &[Event],
        edited: RecordId,
        new_date: DateTime<Utc>,
    ) -> bool {
        let allowed = self
            .policy
            .can_edit_event(entitlement, events, edited, new_date, &self.tz);
        if !allowed {
            info!("Event edit would exceed the daily limit, showing paywall");
            self.sheet = Sheet::Paywall;
        }
        allowed
    }

    /// Closes whatever sheet is open.
    pub fn dismiss(&mut self) {
        self.state = GateState::Idle;
        self.sheet = Sheet::None;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::plan::Plan;
    use crate::test_utils::at;

    fn controller() -> GateController<Utc> {
        GateController::new(LimitPolicy::default(), Utc)
    }

    #[test]
    fn test_starts_idle() {
        let gate = controller();
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.sheet(), Sheet::None);
    }

    #[test]
    fn test_allowed_press_opens_add_form() {
        let mut gate = controller();
        let contacts = vec![Contact::new("自宅", "0312345678")];

        let sheet = gate.request_add(&EntitlementState::free(), AddRequest::Contact(&contacts));

        assert_eq!(sheet, Sheet::AddForm(RecordKind::Contact));
        assert_eq!(gate.state(), GateState::Allowed(RecordKind::Contact));
    }

    #[test]
    fn test_denied_press_opens_paywall() {
        let mut gate = controller();
        let contacts = vec![
            Contact::new("自宅", "0312345678"),
            Contact::new("お母さん", "09011112222"),
        ];

        let sheet = gate.request_add(&EntitlementState::free(), AddRequest::Contact(&contacts));

        assert_eq!(sheet, Sheet::Paywall);
        assert_eq!(gate.state(), GateState::Denied(RecordKind::Contact));

        gate.dismiss();
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.sheet(), Sheet::None);
    }

    #[test]
    fn test_unlocked_press_always_opens_form() {
        let mut gate = controller();
        let events: Vec<Event> = (8..12)
            .map(|h| Event::new(at(2025, 6, 1, h, 0), "予定"))
            .collect();

        let sheet = gate.request_add(
            &EntitlementState::with_plan(Plan::Yearly),
            AddRequest::Event {
                events: &events,
                target: at(2025, 6, 1, 13, 0),
            },
        );

        assert_eq!(sheet, Sheet::AddForm(RecordKind::Event));
    }

    #[test]
    fn test_event_press_scoped_to_target_day() {
        let mut gate = controller();
        let events = vec![Event::new(at(2025, 6, 1, 10, 0), "病院")];
        let free = EntitlementState::free();

        let same_day = gate.request_add(
            &free,
            AddRequest::Event {
                events: &events,
                target: at(2025, 6, 1, 23, 0),
            },
        );
        assert_eq!(same_day, Sheet::Paywall);

        let next_day = gate.request_add(
            &free,
            AddRequest::Event {
                events: &events,
                target: at(2025, 6, 2, 0, 1),
            },
        );
        assert_eq!(next_day, Sheet::AddForm(RecordKind::Event));
    }

    #[test]
    fn test_destination_limit() {
        let mut gate = controller();
        let sheet = gate.request_add(&EntitlementState::free(), AddRequest::Destination(&[]));
        assert_eq!(sheet, Sheet::AddForm(RecordKind::Destination));
    }

    #[test]
    fn test_edit_never_gated() {
        let mut gate = controller();
        let id = RecordId::new();
        assert_eq!(gate.request_edit(id), Sheet::EditForm(id));
    }

    #[test]
    fn test_event_edit_onto_full_day_switches_to_paywall() {
        let mut gate = controller();
        let busy = Event::new(at(2025, 6, 1, 10, 0), "病院");
        let moving = Event::new(at(2025, 6, 2, 10, 0), "散歩");
        let events = vec![busy, moving.clone()];
        let free = EntitlementState::free();
        gate.request_edit(moving.id);

        assert!(gate.check_event_edit(&free, &events, moving.id, at(2025, 6, 2, 15, 0)));
        assert_eq!(gate.sheet(), Sheet::EditForm(moving.id));

        assert!(!gate.check_event_edit(&free, &events, moving.id, at(2025, 6, 1, 15, 0)));
        assert_eq!(gate.sheet(), Sheet::Paywall);
    }
}

//! App services - the object the screens talk to.
//!
//! Owns every store and wires the flows together: add presses go through the
//! gate, saves append to the collection and may trigger the review prompt,
//! purchases refresh entitlements. One instance per app, constructed at start-up
//! and passed to whoever needs it.

use crate::{
    config::AppConfig,
    core::{
        entitlement::{BillingProvider, EntitlementState, EntitlementStore, PurchaseOutcome},
        gate::{AddRequest, GateController, Sheet},
        home::{HomeApp, HomeApps},
        limits::LimitPolicy,
        models::{Contact, Destination, Event, RecordId},
        passcode::{PasscodeGate, PasscodeSettings},
        plan::Plan,
        records::RecordCollection,
        review::{ReviewPresenter, ReviewPromptManager, ReviewTrigger},
    },
    errors::{PurchaseError, Result},
    storage::KeyValueStore,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Collection size at which adding a record counts as a review milestone.
pub const REVIEW_MILESTONE: usize = 3;

/// Every service of the launcher core, wired together.
pub struct AppServices<S: KeyValueStore, B: BillingProvider, Tz: TimeZone> {
    store: Arc<S>,
    entitlements: Arc<Mutex<EntitlementStore<S, B>>>,
    events: RecordCollection<Event, S>,
    contacts: RecordCollection<Contact, S>,
    destinations: RecordCollection<Destination, S>,
    gate: GateController<Tz>,
    review: ReviewPromptManager<S>,
    passcode: PasscodeSettings,
    home_apps: HomeApps,
}

impl<S: KeyValueStore, B: BillingProvider, Tz: TimeZone> std::fmt::Debug for AppServices<S, B, Tz> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("events", &self.events.len())
            .field("contacts", &self.contacts.len())
            .field("destinations", &self.destinations.len())
            .field("sheet", &self.gate.sheet())
            .field("passcode_enabled", &self.passcode.enabled)
            .field("home_apps", &self.home_apps)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore, B: BillingProvider, Tz: TimeZone> AppServices<S, B, Tz> {
    /// Loads every service from `store`. `now` seeds the first launch date on
    /// the very first run.
    pub async fn load(
        store: Arc<S>,
        billing: B,
        config: &AppConfig,
        tz: Tz,
        presenter: Box<dyn ReviewPresenter>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let entitlements =
            EntitlementStore::load(Arc::clone(&store), billing, config.plan_catalog()).await?;
        let events = RecordCollection::load(Arc::clone(&store)).await?;
        let contacts = RecordCollection::load(Arc::clone(&store)).await?;
        let destinations = RecordCollection::load(Arc::clone(&store)).await?;
        let review =
            ReviewPromptManager::load(Arc::clone(&store), config.review, presenter, now).await?;
        let passcode = PasscodeSettings::load(store.as_ref()).await?;
        let home_apps = HomeApps::load(store.as_ref()).await?;

        info!("App services loaded");
        Ok(Self {
            store,
            entitlements: Arc::new(Mutex::new(entitlements)),
            events,
            contacts,
            destinations,
            gate: GateController::new(LimitPolicy::new(config.limits), tz),
            review,
            passcode,
            home_apps,
        })
    }

    /// Shared handle for [`crate::core::entitlement::listen_for_updates`].
    #[must_use]
    pub fn entitlement_store(&self) -> Arc<Mutex<EntitlementStore<S, B>>> {
        Arc::clone(&self.entitlements)
    }

    /// Current entitlement state
    pub async fn entitlement(&self) -> EntitlementState {
        self.entitlements.lock().await.state()
    }

    /// Events collection
    #[must_use]
    pub const fn events(&self) -> &RecordCollection<Event, S> {
        &self.events
    }

    /// Favorite contacts collection
    #[must_use]
    pub const fn contacts(&self) -> &RecordCollection<Contact, S> {
        &self.contacts
    }

    /// Destinations collection
    #[must_use]
    pub const fn destinations(&self) -> &RecordCollection<Destination, S> {
        &self.destinations
    }

    /// Add/edit routing
    #[must_use]
    pub const fn gate(&self) -> &GateController<Tz> {
        &self.gate
    }

    /// Sheet the current screen should present
    #[must_use]
    pub const fn sheet(&self) -> Sheet {
        self.gate.sheet()
    }

    /// Closes the current sheet
    pub fn dismiss_sheet(&mut self) {
        self.gate.dismiss();
    }

    /// Review prompt counters and decisions
    #[must_use]
    pub const fn review(&self) -> &ReviewPromptManager<S> {
        &self.review
    }

    /// Counts an app launch.
    pub async fn notify_app_launched(&mut self) {
        self.review.notify_app_launched().await;
    }

    // --- Add flows ---

    /// "+" on the favorite contacts screen.
    pub async fn request_add_contact(&mut self) -> Sheet {
        let entitlement = self.entitlement().await;
        self.gate
            .request_add(&entitlement, AddRequest::Contact(self.contacts.records()))
    }

    /// "Add" on the destinations screen.
    pub async fn request_add_destination(&mut self) -> Sheet {
        let entitlement = self.entitlement().await;
        self.gate.request_add(
            &entitlement,
            AddRequest::Destination(self.destinations.records()),
        )
    }

    /// "Add event" on the day showing `target`.
    pub async fn request_add_event(&mut self, target: DateTime<Utc>) -> Sheet {
        let entitlement = self.entitlement().await;
        self.gate.request_add(
            &entitlement,
            AddRequest::Event {
                events: self.events.records(),
                target,
            },
        )
    }

    /// Saves a contact from the add form. The limit was checked when the form
    /// was opened and is not checked again.
    pub async fn save_new_contact(&mut self, contact: Contact, now: DateTime<Utc>) -> RecordId {
        let id = self.contacts.add(contact).await;
        self.gate.dismiss();
        self.after_add(self.contacts.len(), ReviewTrigger::AddedFavoriteContacts, now)
            .await;
        id
    }

    /// Saves a destination from the add form.
    pub async fn save_new_destination(
        &mut self,
        destination: Destination,
        now: DateTime<Utc>,
    ) -> RecordId {
        let id = self.destinations.add(destination).await;
        self.gate.dismiss();
        self.after_add(self.destinations.len(), ReviewTrigger::AddedDestinations, now)
            .await;
        id
    }

    /// Saves an event from the add form.
    pub async fn save_new_event(&mut self, event: Event, now: DateTime<Utc>) -> RecordId {
        let id = self.events.add(event).await;
        self.gate.dismiss();
        self.after_add(self.events.len(), ReviewTrigger::AddedEvents, now)
            .await;
        id
    }

    async fn after_add(&mut self, len: usize, trigger: ReviewTrigger, now: DateTime<Utc>) {
        if len >= REVIEW_MILESTONE {
            let local_now = now.with_timezone(self.gate.time_zone());
            self.review.maybe_request_review(trigger, &local_now).await;
        }
    }

    // --- Edit and delete flows ---

    /// Opens the edit form for any record. Never limit-gated.
    pub fn request_edit(&mut self, id: RecordId) -> Sheet {
        self.gate.request_edit(id)
    }

    /// Saves an edited event unless moving it would overfill a day on the free
    /// tier, in which case the paywall is shown and nothing changes.
    pub async fn save_event_edit(
        &mut self,
        id: RecordId,
        title: String,
        date: DateTime<Utc>,
    ) -> bool {
        let entitlement = self.entitlement().await;
        if !self
            .gate
            .check_event_edit(&entitlement, self.events.records(), id, date)
        {
            return false;
        }
        let updated = self
            .events
            .update(id, |event| {
                event.title = title;
                event.date = date;
            })
            .await;
        if updated {
            self.gate.dismiss();
        }
        updated
    }

    /// Saves an edited contact.
    pub async fn save_contact_edit(&mut self, id: RecordId, name: String, phone: String) -> bool {
        let updated = self
            .contacts
            .update(id, |contact| {
                contact.name = name;
                contact.phone = phone;
            })
            .await;
        if updated {
            self.gate.dismiss();
        }
        updated
    }

    /// Saves an edited destination.
    pub async fn save_destination_edit(
        &mut self,
        id: RecordId,
        name: &str,
        detail: String,
    ) -> bool {
        let updated = self
            .destinations
            .update(id, |dest| {
                dest.name = name.trim().to_string();
                dest.detail = detail;
            })
            .await;
        if updated {
            self.gate.dismiss();
        }
        updated
    }

    /// Deletes an event after the user confirmed.
    pub async fn delete_event(&mut self, id: RecordId) -> bool {
        self.events.delete(id).await
    }

    /// Deletes a contact after the user confirmed.
    pub async fn delete_contact(&mut self, id: RecordId) -> bool {
        let deleted = self.contacts.delete(id).await;
        if deleted && self.gate.sheet() == Sheet::EditForm(id) {
            self.gate.dismiss();
        }
        deleted
    }

    /// Deletes the swiped destinations.
    pub async fn delete_destinations(&mut self, ids: &HashSet<RecordId>) -> usize {
        self.destinations.delete_many(ids).await
    }

    /// Moves a destination in the list.
    pub async fn reorder_destination(&mut self, from: usize, to: usize) -> bool {
        self.destinations.reorder(from, to).await
    }

    // --- Purchases ---

    /// Buys `plan`. A completed purchase closes the paywall and counts as a
    /// review milestone.
    pub async fn purchase(
        &mut self,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> std::result::Result<PurchaseOutcome, PurchaseError> {
        let (outcome, unlocked) = {
            let mut entitlements = self.entitlements.lock().await;
            let outcome = entitlements.purchase(plan).await?;
            (outcome, entitlements.state().is_unlocked())
        };

        if outcome == PurchaseOutcome::Completed && unlocked {
            if self.gate.sheet() == Sheet::Paywall {
                self.gate.dismiss();
            }
            let local_now = now.with_timezone(self.gate.time_zone());
            self.review
                .maybe_request_review(ReviewTrigger::PurchasedPro, &local_now)
                .await;
        }
        Ok(outcome)
    }

    /// Restores earlier purchases.
    pub async fn restore(&mut self) -> std::result::Result<EntitlementState, PurchaseError> {
        let mut entitlements = self.entitlements.lock().await;
        entitlements.restore().await?;
        Ok(entitlements.state())
    }

    /// Refreshes entitlements from the billing service, e.g. at start-up.
    pub async fn refresh_entitlements(
        &mut self,
    ) -> std::result::Result<EntitlementState, PurchaseError> {
        let mut entitlements = self.entitlements.lock().await;
        entitlements.refresh_entitlements().await?;
        Ok(entitlements.state())
    }

    // --- Settings ---

    /// Fresh passcode gate for entering the settings screens.
    #[must_use]
    pub fn open_settings(&self) -> PasscodeGate {
        debug!("Entering settings");
        PasscodeGate::enter(self.passcode.clone())
    }

    /// "Forgot passcode" on `gate`: disables the lock and opens settings.
    pub async fn reset_passcode(&mut self, gate: &mut PasscodeGate) {
        gate.reset(self.store.as_ref()).await;
        self.passcode = gate.settings().clone();
    }

    /// Current passcode settings
    #[must_use]
    pub const fn passcode_settings(&self) -> &PasscodeSettings {
        &self.passcode
    }

    /// Saves a new settings passcode.
    ///
    /// # Errors
    /// `InvalidPasscode` unless `input` holds exactly four digits.
    pub async fn set_passcode(&mut self, input: &str) -> Result<()> {
        self.passcode.set_passcode(self.store.as_ref(), input).await
    }

    /// Turns the settings lock on or off.
    pub async fn set_passcode_enabled(&mut self, enabled: bool) {
        self.passcode
            .set_enabled(self.store.as_ref(), enabled)
            .await;
    }

    /// Home screen visibility flags
    #[must_use]
    pub const fn home_apps(&self) -> &HomeApps {
        &self.home_apps
    }

    /// Shows or hides a home screen app.
    pub async fn set_home_app_visible(&mut self, app: HomeApp, visible: bool) {
        self.home_apps
            .set(self.store.as_ref(), app, visible)
            .await;
    }
}

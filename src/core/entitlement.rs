//! Entitlement business logic - purchase state and the billing collaborator.
//!
//! The store keeps `is_unlocked` / `active_plan`, persists them on every change
//! and recomputes them from the billing collaborator after purchases, restores
//! and pushed entitlement updates. Recomputation always overwrites: whatever the
//! collaborator reports now is the whole truth.

use crate::{
    core::plan::{Plan, PlanCatalog},
    errors::{PurchaseError, Result},
    storage::{KeyValueStore, load_bool, persist_or_log},
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

const UNLOCKED_KEY: &str = "yasasuma_isProUnlocked";
const ACTIVE_PLAN_KEY: &str = "yasasuma_activePlan";

/// Whether paid features are active, and through which plan.
///
/// `active_plan` set implies `is_unlocked`. The reverse does not hold: a
/// legacy unlock carries no plan and still grants every paid feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementState {
    is_unlocked: bool,
    active_plan: Option<Plan>,
}

impl EntitlementState {
    /// Free tier
    #[must_use]
    pub const fn free() -> Self {
        Self {
            is_unlocked: false,
            active_plan: None,
        }
    }

    /// Unlocked through `plan`
    #[must_use]
    pub const fn with_plan(plan: Plan) -> Self {
        Self {
            is_unlocked: true,
            active_plan: Some(plan),
        }
    }

    /// Unlocked without a known plan
    #[must_use]
    pub const fn legacy_unlocked() -> Self {
        Self {
            is_unlocked: true,
            active_plan: None,
        }
    }

    /// Builds a state from stored parts, restoring the plan-implies-unlocked rule.
    #[must_use]
    pub fn from_parts(is_unlocked: bool, active_plan: Option<Plan>) -> Self {
        if active_plan.is_some() && !is_unlocked {
            warn!("Stored plan {:?} without unlock flag, treating as unlocked", active_plan);
        }
        Self {
            is_unlocked: is_unlocked || active_plan.is_some(),
            active_plan,
        }
    }

    /// Whether paid features are active
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.is_unlocked
    }

    /// The plan granting the unlock, if known
    #[must_use]
    pub const fn active_plan(&self) -> Option<Plan> {
        self.active_plan
    }
}

/// One entitlement as reported by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedEntitlement {
    /// External product identifier
    pub product_id: String,
    /// Whether the collaborator verified the entitlement
    pub verified: bool,
}

/// Result of asking the billing collaborator to buy a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResult {
    /// Transaction completed and passed verification
    Verified,
    /// Transaction completed but failed verification
    Unverified,
    /// The user backed out
    UserCancelled,
    /// Awaiting approval (e.g., parental approval)
    Pending,
}

/// How a purchase ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Purchase went through and entitlements were refreshed
    Completed,
    /// The user cancelled; nothing changed
    Cancelled,
    /// The purchase awaits approval; nothing changed yet
    Pending,
}

/// Pushed by the billing collaborator on renewal, revocation or refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementUpdate {
    /// Product the update concerns
    pub product_id: String,
}

/// The platform billing service.
pub trait BillingProvider: Send + Sync {
    /// Product ids out of `product_ids` that the store catalog offers.
    fn available_products(
        &self,
        product_ids: &[String],
    ) -> impl Future<Output = std::result::Result<Vec<String>, PurchaseError>> + Send;

    /// Starts a purchase of `product_id`.
    fn purchase(
        &self,
        product_id: &str,
    ) -> impl Future<Output = std::result::Result<TransactionResult, PurchaseError>> + Send;

    /// Re-syncs past transactions with the store.
    fn restore(&self) -> impl Future<Output = std::result::Result<(), PurchaseError>> + Send;

    /// Every entitlement the store currently reports.
    fn current_entitlements(
        &self,
    ) -> impl Future<Output = std::result::Result<Vec<ReportedEntitlement>, PurchaseError>> + Send;
}

/// Billing collaborator for builds without a store connection: the catalog is
/// empty and nothing is ever entitled.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBilling;

impl BillingProvider for OfflineBilling {
    async fn available_products(
        &self,
        _product_ids: &[String],
    ) -> std::result::Result<Vec<String>, PurchaseError> {
        Ok(Vec::new())
    }

    async fn purchase(&self, product_id: &str) -> std::result::Result<TransactionResult, PurchaseError> {
        Err(PurchaseError::ProductNotFound {
            product_id: product_id.to_string(),
        })
    }

    async fn restore(&self) -> std::result::Result<(), PurchaseError> {
        Ok(())
    }

    async fn current_entitlements(
        &self,
    ) -> std::result::Result<Vec<ReportedEntitlement>, PurchaseError> {
        Ok(Vec::new())
    }
}

/// Holds the entitlement state and keeps it in sync with billing and storage.
#[derive(Debug)]
pub struct EntitlementStore<S: KeyValueStore, B: BillingProvider> {
    store: Arc<S>,
    billing: B,
    catalog: PlanCatalog,
    state: EntitlementState,
}

impl<S: KeyValueStore, B: BillingProvider> EntitlementStore<S, B> {
    /// Reads the persisted state; absent keys mean the free tier.
    pub async fn load(store: Arc<S>, billing: B, catalog: PlanCatalog) -> Result<Self> {
        let is_unlocked = load_bool(store.as_ref(), UNLOCKED_KEY, false).await?;
        let active_plan = store
            .get(ACTIVE_PLAN_KEY)
            .await?
            .and_then(|raw| Plan::from_storage_value(&raw));
        let state = EntitlementState::from_parts(is_unlocked, active_plan);

        info!(
            "Loaded entitlement: unlocked={} plan={:?}",
            state.is_unlocked(),
            state.active_plan()
        );
        Ok(Self {
            store,
            billing,
            catalog,
            state,
        })
    }

    /// Current entitlement state
    #[must_use]
    pub const fn state(&self) -> EntitlementState {
        self.state
    }

    /// Buys `plan`.
    ///
    /// Cancellation and pending approval resolve as `Ok` without changing state.
    ///
    /// # Errors
    /// - `ProductNotFound` when the store catalog lacks the plan's product id
    /// - `VerificationFailed` when the transaction does not verify
    /// - `Billing` when the collaborator itself fails
    pub async fn purchase(&mut self, plan: Plan) -> std::result::Result<PurchaseOutcome, PurchaseError> {
        let product_id = self.catalog.product_id(plan).to_string();
        info!("Starting purchase of {:?} ({})", plan, product_id);

        let available = self
            .billing
            .available_products(std::slice::from_ref(&product_id))
            .await?;
        if !available.iter().any(|id| *id == product_id) {
            error!("Product {} missing from billing catalog", product_id);
            return Err(PurchaseError::ProductNotFound { product_id });
        }

        match self.billing.purchase(&product_id).await? {
            TransactionResult::Verified => {
                self.refresh_entitlements().await?;
                info!("Purchase of {:?} completed", plan);
                Ok(PurchaseOutcome::Completed)
            }
            TransactionResult::Unverified => {
                warn!("Purchase of {} failed verification", product_id);
                Err(PurchaseError::VerificationFailed)
            }
            TransactionResult::UserCancelled => {
                debug!("Purchase of {} cancelled by user", product_id);
                Ok(PurchaseOutcome::Cancelled)
            }
            TransactionResult::Pending => {
                debug!("Purchase of {} pending approval", product_id);
                Ok(PurchaseOutcome::Pending)
            }
        }
    }

    /// Re-syncs with the billing service and recomputes the state.
    pub async fn restore(&mut self) -> std::result::Result<(), PurchaseError> {
        info!("Restoring purchases");
        self.billing.restore().await?;
        self.refresh_entitlements().await
    }

    /// Recomputes the state from the entitlements the billing service reports.
    ///
    /// Only verified entitlements for known products count. When both plans are
    /// active the yearly plan is reported.
    pub async fn refresh_entitlements(&mut self) -> std::result::Result<(), PurchaseError> {
        let reported = self.billing.current_entitlements().await?;

        let active_plan = reported
            .iter()
            .filter(|e| e.verified)
            .filter_map(|e| self.catalog.plan_for(&e.product_id))
            .max_by_key(|plan| plan.period_months());

        let next = active_plan.map_or_else(EntitlementState::free, EntitlementState::with_plan);
        if next != self.state {
            info!(
                "Entitlement changed: unlocked {} -> {}, plan {:?} -> {:?}",
                self.state.is_unlocked(),
                next.is_unlocked(),
                self.state.active_plan(),
                next.active_plan()
            );
        }
        self.state = next;
        self.persist().await;
        Ok(())
    }

    /// Handles a pushed update; refreshes only for products in the plan table.
    /// Returns whether a refresh happened.
    pub async fn handle_update(
        &mut self,
        update: &EntitlementUpdate,
    ) -> std::result::Result<bool, PurchaseError> {
        if !self.catalog.recognizes(&update.product_id) {
            debug!("Ignoring entitlement update for unknown product {}", update.product_id);
            return Ok(false);
        }
        self.refresh_entitlements().await?;
        Ok(true)
    }

    async fn persist(&self) {
        let store = self.store.as_ref();
        persist_or_log(
            UNLOCKED_KEY,
            store.set(UNLOCKED_KEY, if self.state.is_unlocked() { "true" } else { "false" }),
        )
        .await;
        match self.state.active_plan() {
            Some(plan) => {
                persist_or_log(ACTIVE_PLAN_KEY, store.set(ACTIVE_PLAN_KEY, plan.storage_value()))
                    .await;
            }
            None => persist_or_log(ACTIVE_PLAN_KEY, store.remove(ACTIVE_PLAN_KEY)).await,
        }
    }
}

/// Applies pushed entitlement updates one at a time until the sender is dropped.
///
/// The store is locked per update, so refreshes never interleave with other
/// writers holding the same lock.
pub async fn listen_for_updates<S, B>(
    store: Arc<Mutex<EntitlementStore<S, B>>>,
    mut updates: mpsc::Receiver<EntitlementUpdate>,
) where
    S: KeyValueStore,
    B: BillingProvider,
{
    while let Some(update) = updates.recv().await {
        let mut guard = store.lock().await;
        if let Err(e) = guard.handle_update(&update).await {
            warn!("Entitlement refresh after update for {} failed: {}", update.product_id, e);
        }
    }
    debug!("Entitlement update stream closed");
}

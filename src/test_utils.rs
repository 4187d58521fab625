//! Shared test utilities for `Yasasuma`.
//!
//! Database setup, fixed timestamps and in-process fakes for the billing
//! service, the review presenter and a store whose writes always fail.

#![allow(clippy::unwrap_used)]

use crate::{
    config::{AppConfig, app::ProductsConfig},
    core::{
        entitlement::{BillingProvider, ReportedEntitlement, TransactionResult},
        plan::PlanCatalog,
        review::ReviewPresenter,
    },
    errors::{Error, PurchaseError, Result},
    storage::KeyValueStore,
};
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// UTC timestamp shorthand.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap()
}

/// Product ids used throughout the tests
pub fn test_catalog() -> PlanCatalog {
    PlanCatalog::new("test.monthly", "test.yearly")
}

/// Default configuration with the test product ids
pub fn test_config() -> AppConfig {
    AppConfig {
        products: ProductsConfig {
            monthly: "test.monthly".to_string(),
            yearly: "test.yearly".to_string(),
        },
        ..AppConfig::default()
    }
}

#[derive(Debug)]
struct BillingInner {
    catalog: Vec<String>,
    result: TransactionResult,
    entitlements: Vec<ReportedEntitlement>,
    failure: Option<String>,
    purchased: Vec<String>,
    restore_calls: usize,
}

/// Scriptable billing service. Clones share state, so a test can keep one
/// handle and inspect what the store did with the other.
#[derive(Debug, Clone)]
pub struct FakeBilling {
    inner: Arc<Mutex<BillingInner>>,
}

impl FakeBilling {
    /// Both test products on sale; purchases are cancelled; nothing entitled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BillingInner {
                catalog: vec!["test.monthly".to_string(), "test.yearly".to_string()],
                result: TransactionResult::UserCancelled,
                entitlements: Vec::new(),
                failure: None,
                purchased: Vec::new(),
                restore_calls: 0,
            })),
        }
    }

    /// Every purchase ends with `result`. A verified purchase adds a verified
    /// entitlement for the bought product.
    pub fn with_result(self, result: TransactionResult) -> Self {
        self.inner.lock().unwrap().result = result;
        self
    }

    /// Replaces the products on sale.
    pub fn with_catalog(self, product_ids: &[&str]) -> Self {
        self.inner.lock().unwrap().catalog = product_ids.iter().map(ToString::to_string).collect();
        self
    }

    /// Adds a reported entitlement.
    pub fn with_entitlement(self, product_id: &str, verified: bool) -> Self {
        self.inner
            .lock()
            .unwrap()
            .entitlements
            .push(ReportedEntitlement {
                product_id: product_id.to_string(),
                verified,
            });
        self
    }

    /// Every call fails with a `Billing` error carrying `message`.
    pub fn failing(self, message: &str) -> Self {
        self.inner.lock().unwrap().failure = Some(message.to_string());
        self
    }

    /// Drops every reported entitlement, as after an expiry.
    pub fn clear_entitlements(&self) {
        self.inner.lock().unwrap().entitlements.clear();
    }

    /// Product ids passed to `purchase`
    pub fn purchased(&self) -> Vec<String> {
        self.inner.lock().unwrap().purchased.clone()
    }

    /// Number of `restore` calls
    pub fn restore_calls(&self) -> usize {
        self.inner.lock().unwrap().restore_calls
    }

    fn check_failure(inner: &BillingInner) -> std::result::Result<(), PurchaseError> {
        match &inner.failure {
            Some(message) => Err(PurchaseError::Billing {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl BillingProvider for FakeBilling {
    async fn available_products(
        &self,
        product_ids: &[String],
    ) -> std::result::Result<Vec<String>, PurchaseError> {
        let inner = self.inner.lock().unwrap();
        Self::check_failure(&inner)?;
        Ok(product_ids
            .iter()
            .filter(|id| inner.catalog.contains(*id))
            .cloned()
            .collect())
    }

    async fn purchase(&self, product_id: &str) -> std::result::Result<TransactionResult, PurchaseError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_failure(&inner)?;
        inner.purchased.push(product_id.to_string());
        let result = inner.result;
        if result == TransactionResult::Verified {
            inner.entitlements.push(ReportedEntitlement {
                product_id: product_id.to_string(),
                verified: true,
            });
        }
        Ok(result)
    }

    async fn restore(&self) -> std::result::Result<(), PurchaseError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_failure(&inner)?;
        inner.restore_calls += 1;
        Ok(())
    }

    async fn current_entitlements(
        &self,
    ) -> std::result::Result<Vec<ReportedEntitlement>, PurchaseError> {
        let inner = self.inner.lock().unwrap();
        Self::check_failure(&inner)?;
        Ok(inner.entitlements.clone())
    }
}

/// Review presenter counting the prompts it was asked to show.
#[derive(Debug, Clone)]
pub struct RecordingPresenter {
    foreground: bool,
    requests: Arc<AtomicUsize>,
}

impl RecordingPresenter {
    /// App in the foreground
    pub fn foreground() -> Self {
        Self {
            foreground: true,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// App without a foreground scene
    pub fn background() -> Self {
        Self {
            foreground: false,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Prompts shown so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ReviewPresenter for RecordingPresenter {
    fn has_foreground_scene(&self) -> bool {
        self.foreground
    }

    fn request_review(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store that reads as empty and rejects every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, key: &str, _value: &str) -> Result<()> {
        Err(Error::Storage {
            message: format!("write of {key} rejected"),
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        Err(Error::Storage {
            message: format!("removal of {key} rejected"),
        })
    }
}

//! Application configuration loading from config.toml
//!
//! Every section is optional. Missing values fall back to the defaults the
//! launcher ships with: two favorite contacts, two destinations and one event
//! per day on the free tier, and the review prompt windows of 3 days, 3 launches,
//! 4 prompts a year and 30 days between prompts.

use crate::core::limits::FreeLimits;
use crate::core::plan::PlanCatalog;
use crate::core::review::ReviewPromptPolicy;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database URL, overridden by `DATABASE_URL`
    pub database_url: Option<String>,
    /// Billing product identifiers for the two plans
    pub products: ProductsConfig,
    /// Free tier record limits
    pub limits: FreeLimits,
    /// Review prompt windows
    pub review: ReviewPromptPolicy,
}

/// External product identifiers as registered with the billing service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProductsConfig {
    /// Product id of the monthly subscription
    pub monthly: String,
    /// Product id of the yearly subscription
    pub yearly: String,
}

impl Default for ProductsConfig {
    fn default() -> Self {
        Self {
            monthly: "yasasuma.premium.monthly".to_string(),
            yearly: "yasasuma.premium.yearly".to_string(),
        }
    }
}

impl AppConfig {
    /// Builds the product id table from the configured identifiers.
    #[must_use]
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::new(&self.products.monthly, &self.products.yearly)
    }
}

/// Loads the application configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The two product ids are identical
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_config(&contents)
}

/// Parses configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    if config.products.monthly == config.products.yearly {
        return Err(Error::Config {
            message: format!(
                "Monthly and yearly plans share the product id '{}'",
                config.products.monthly
            ),
        });
    }

    Ok(config)
}

/// Loads configuration from the default location (./config.toml), falling back
/// to built-in defaults when the file does not exist.
pub fn load_default_config() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    if !path.exists() {
        tracing::info!("No config.toml found, using built-in defaults");
        return Ok(AppConfig::default());
    }
    load_config(path)
}

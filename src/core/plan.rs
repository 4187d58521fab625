//! Subscription plans and the product-id lookup table.
//!
//! There are exactly two plans. The billing service knows them by external
//! product identifiers which come from configuration; anything else it reports
//! is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A paid subscription offering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Billed every month
    Monthly,
    /// Billed every twelve months, preselected on the paywall
    #[default]
    Yearly,
}

impl Plan {
    /// The fixed catalog, in paywall display order.
    pub const ALL: [Self; 2] = [Self::Monthly, Self::Yearly];

    /// Price in yen per billing period.
    #[must_use]
    pub const fn price_yen(self) -> u32 {
        match self {
            Self::Monthly => 480,
            Self::Yearly => 3_900,
        }
    }

    /// Length of one billing period in months.
    #[must_use]
    pub const fn period_months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }

    /// Stable value written to storage.
    #[must_use]
    pub const fn storage_value(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Parses a value written by [`Plan::storage_value`].
    #[must_use]
    pub fn from_storage_value(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monthly => write!(f, "¥{} / month", self.price_yen()),
            Self::Yearly => write!(f, "¥{} / year", format_yen(self.price_yen())),
        }
    }
}

fn format_yen(amount: u32) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Two-entry mapping between plans and billing product ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    monthly: String,
    yearly: String,
}

impl PlanCatalog {
    /// Builds the table from the two configured product ids.
    #[must_use]
    pub fn new(monthly: &str, yearly: &str) -> Self {
        Self {
            monthly: monthly.to_string(),
            yearly: yearly.to_string(),
        }
    }

    /// External product id for `plan`.
    #[must_use]
    pub fn product_id(&self, plan: Plan) -> &str {
        match plan {
            Plan::Monthly => &self.monthly,
            Plan::Yearly => &self.yearly,
        }
    }

    /// Maps a billing product id back to its plan; unknown ids yield `None`.
    #[must_use]
    pub fn plan_for(&self, product_id: &str) -> Option<Plan> {
        Plan::ALL
            .into_iter()
            .find(|plan| self.product_id(*plan) == product_id)
    }

    /// Whether `product_id` belongs to one of the two plans.
    #[must_use]
    pub fn recognizes(&self, product_id: &str) -> bool {
        self.plan_for(product_id).is_some()
    }
}

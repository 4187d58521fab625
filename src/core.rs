/// Subscription state and the billing collaborator
pub mod entitlement;
/// Add/edit routing between forms and the paywall
pub mod gate;
/// Home screen app visibility
pub mod home;
/// Free tier limits
pub mod limits;
/// Record types and identifiers
pub mod models;
/// Settings passcode lock
pub mod passcode;
/// Subscription plans and product ids
pub mod plan;
/// Persisted, observable record lists
pub mod records;
/// Rate-limited review prompt
pub mod review;
/// Wiring of every service for the screens
pub mod services;

//! System state entity - Stores the key-value blobs backing every persisted setting.
//! Entitlement flags, record collection snapshots, passcode settings, review
//! counters and home screen flags all live here, one row per key.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// System state database model - stores key-value pairs
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_state")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Storage key (e.g., `"yasasuma_events"`)
    #[sea_orm(unique)]
    pub key: String,
    /// Serialized value
    pub value: String,
    /// When this key was last written
    pub updated_at: DateTime,
}

/// `SystemState` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

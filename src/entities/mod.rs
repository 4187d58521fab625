//! Entity module - Contains the SeaORM entity definitions for the database.
//! The launcher only needs a single key-value table.

pub mod system_state;

pub use system_state::{Entity as SystemState, Model as SystemStateModel};

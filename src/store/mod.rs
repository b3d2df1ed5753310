//! SQLite-backed persistence: prompts, campaigns, contacts, tenants.

mod db;
mod models;

pub use db::{Database, DbHandle};
pub use models::*;

//! Local store for Prism

mod connection;
mod migrations;
mod query;
mod transaction;

pub use connection::LocalStore;
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use query::{OrderBy, Query};
pub use transaction::StoreTx;

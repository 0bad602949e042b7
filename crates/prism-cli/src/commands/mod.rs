pub mod common;
pub mod completions;
pub mod contact;
pub mod group;
pub mod queue;
pub mod schema;
pub mod sync;
pub mod watch;

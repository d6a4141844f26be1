mod api;
mod config;
mod migrations;
mod scoping;
pub mod utils;

pub use utils::{test_db, test_utils};

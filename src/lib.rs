pub mod chart;
pub mod config;
pub mod error;
pub mod flips;
pub mod format;
pub mod loader;
pub mod logging;
pub mod model;
pub mod poller;
pub mod presets;
pub mod rows;
pub mod store;
pub mod table;
pub mod tracker;

pub use error::{Error, Result};

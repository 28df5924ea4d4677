pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod io;
pub mod migrations;
pub mod paths;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod words;

pub use error::{PacerError, Result};

pub mod config;
pub mod console;
pub mod host;
pub mod logging;
pub mod persistence;
pub mod ui;
pub mod updates;

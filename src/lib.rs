pub mod config;
pub mod debug;
pub mod engine;
pub mod errors;
pub mod gates;
pub mod hooks;
pub mod intervention;
pub mod logging;
pub mod session;
pub mod step;
pub mod ui;
pub mod util;

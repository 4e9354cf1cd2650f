pub mod aem;
pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;
pub mod workfront;

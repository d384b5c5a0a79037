pub mod analysis;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod flywheel;
pub mod selector;
pub mod store;

pub mod analytics;
pub mod api;
pub mod config;
pub mod cursor;
pub mod models;
pub mod storage;
pub mod tracking;

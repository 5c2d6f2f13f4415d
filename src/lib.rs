pub mod api;
pub mod calendar;
pub mod client;
pub mod config;
pub mod detector;
pub mod eod;
pub mod error;
pub mod poller;
pub mod scheduler;
pub mod store;
pub mod types;

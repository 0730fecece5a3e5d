pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod console;
pub mod logging;
pub mod portal;
pub mod query;
pub mod state;
pub mod utils;
pub mod web;

pub mod assets;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod utils;
pub mod web;

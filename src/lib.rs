pub mod config;
pub mod engine;
pub mod model;
pub mod server;
pub mod service;

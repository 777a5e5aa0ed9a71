pub mod config;
pub mod logging;
pub mod models;
pub mod repository;
pub mod routes;
pub mod security;
pub mod state;

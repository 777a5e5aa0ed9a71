pub mod config;
pub mod events;
pub mod logging;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;
pub mod websocket;

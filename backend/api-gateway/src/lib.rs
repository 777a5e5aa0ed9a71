pub mod config;
pub mod logging;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod ws_proxy;

pub mod app;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod poll;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
pub mod testing;

pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod prescriptions;
pub mod seed;
pub mod state;

pub mod auth;
pub mod collab;
pub mod db;
pub mod engine;
pub mod error;
pub mod midpoint;
pub mod retry;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod users;

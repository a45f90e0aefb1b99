pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod signing;
pub mod state;

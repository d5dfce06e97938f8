pub mod catalog;
pub mod config;
pub mod data;
pub mod error;
pub mod grid;
pub mod roles;
pub mod server;
pub mod service;
pub mod solver;
pub mod store;
pub mod workload;

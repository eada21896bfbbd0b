pub mod config;
pub mod data;
pub mod evolution;
pub mod sweep;

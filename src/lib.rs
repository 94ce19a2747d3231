pub mod config;
pub mod demo;
pub mod errors;
pub mod gateway;

// kvbench - Library root for testing

pub mod bench;
pub mod config;
pub mod error;
pub mod store;

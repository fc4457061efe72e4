pub mod coinbase;
pub mod core;
pub mod observability;
pub mod paper;
pub mod persistence;

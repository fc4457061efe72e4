// Market analysis domain
pub mod market;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Risk management domain
pub mod risk;

// Core trading domain
pub mod trading;

// Domain-specific error types
pub mod errors;

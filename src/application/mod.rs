pub mod indicators;

// Entry and exit rules
pub mod strategies;

// Candle sync, order lifecycle and the polling cycle
pub mod trading;

// Wiring and the run loop
pub mod system;

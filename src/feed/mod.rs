pub mod control;
pub mod types;
pub mod ws;

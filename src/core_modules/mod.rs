pub mod cell;
pub mod error;
pub mod grid_store;
pub mod report;
pub mod resampler;
pub mod session;
pub mod trace;

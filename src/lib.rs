// THEORY:
// This file is the main entry point for the `complexity_grid` library crate.
//
// The engine takes the per-unit bit and QP measurements a video decoder produces
// while decoding a picture (units range from 8x8 to 64x64) and re-expresses them on
// a uniform 16x16 grid without losing a bit, then hands the finished grid to report
// sinks. The `pipeline` module is the high-level interface; `core_modules` holds
// the grid, the resampling rules and the picture lifecycle.

pub mod config;
pub mod core_modules;
pub mod logging;
pub mod pipeline;

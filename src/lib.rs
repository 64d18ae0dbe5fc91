pub mod benchmark;
pub mod config;
pub mod data_io;
pub mod fluxes;
pub mod generator;
pub mod isentropic;
pub mod math;
pub mod operations;
pub mod parallel;
pub mod slicing;
pub mod time_utils;

pub use time_utils::*;

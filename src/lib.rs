// Library exports for the doublefork daemon fixture

pub mod cli;
pub mod config;
#[cfg(unix)]
pub mod daemon;
pub mod error;

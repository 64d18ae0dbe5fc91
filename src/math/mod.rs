pub mod interpolate;
pub mod physics;

#[cfg(test)]
mod tests;

pub use interpolate::*;
pub use physics::*;

pub mod indicators;
pub mod relative_strength;
pub mod stage2;

#[cfg(test)]
mod indicators_tests;

pub use indicators::*;
pub use relative_strength::*;
pub use stage2::*;

pub mod lease;

pub use lease::*;

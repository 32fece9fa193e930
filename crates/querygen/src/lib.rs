//! Seeded random query generation for differential testing.

pub mod gen;
pub mod rng;

pub use gen::{GeneratorConfig, QueryGen};
pub use rng::Lcg;

pub mod bridge;
pub mod constants;
pub mod denom;
pub mod dynasty;
pub mod error;
pub mod genesis;
pub mod primitives;

pub mod constants;
pub mod geo;

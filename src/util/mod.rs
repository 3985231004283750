pub mod cli;
pub mod params;
pub mod random;

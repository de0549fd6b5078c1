pub mod health;
pub mod probes;

#[macro_use]
pub mod logger;

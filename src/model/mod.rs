pub mod config;
pub mod contact;

pub use config::*;
pub use contact::*;

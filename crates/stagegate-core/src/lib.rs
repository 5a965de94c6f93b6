#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod record;
pub mod schema;
pub mod settings;
pub mod traits;
pub mod types;
pub mod value;

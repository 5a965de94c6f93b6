#![forbid(unsafe_code)]

pub mod audit;
pub mod definitions;
pub mod gates;
pub mod requirements;
pub mod subject;

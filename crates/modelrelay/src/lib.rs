pub mod billing;
pub mod http;
pub mod json;
pub mod llm;
pub mod parse;
pub mod proxy;
pub mod serdes;
pub mod store;
pub mod telemetry;

pub use serdes::*;

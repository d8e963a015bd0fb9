pub mod upstream;

pub use upstream::{ClientRequest, RelayError, UpstreamClient, build_consume_log, relay};

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;

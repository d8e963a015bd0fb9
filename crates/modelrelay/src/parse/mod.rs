pub mod ndjson;
pub mod sse;

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;

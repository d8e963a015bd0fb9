pub mod completions;
pub mod embeddings;
pub mod gemini;
pub mod messages;
pub mod ollama;
pub mod responses;

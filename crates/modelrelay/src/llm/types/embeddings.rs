//! Embeddings and rerank formats. These are passthrough at the body level;
//! only usage is extracted for accounting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::billing;

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Request {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub input: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub encoding_format: Option<String>,
	#[serde(flatten)]
	pub rest: Value,
}

impl Request {
	/// Flatten the input into its string items; non-string entries are
	/// rejected by the caller.
	pub fn input_strings(&self) -> Option<Vec<String>> {
		match &self.input {
			Value::String(s) => Some(vec![s.clone()]),
			Value::Array(items) => items
				.iter()
				.map(|v| v.as_str().map(|s| s.to_string()))
				.collect(),
			_ => None,
		}
	}
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
}

impl Usage {
	pub fn to_billing(&self) -> billing::Usage {
		billing::Usage {
			input_tokens: self.prompt_tokens,
			total_tokens: self.total_tokens,
			..Default::default()
		}
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Response {
	pub object: String,
	pub data: Vec<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten)]
	pub rest: Value,
}

pub mod rerank {
	use super::*;

	#[derive(Debug, Deserialize, Clone, Serialize)]
	pub struct Request {
		#[serde(skip_serializing_if = "Option::is_none")]
		pub model: Option<String>,
		pub query: String,
		pub documents: Vec<Value>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub top_n: Option<u32>,
		#[serde(flatten)]
		pub rest: Value,
	}

	#[derive(Debug, Deserialize, Clone, Serialize)]
	pub struct Response {
		pub results: Vec<Value>,
		#[serde(skip_serializing_if = "Option::is_none")]
		pub usage: Option<super::Usage>,
		#[serde(flatten)]
		pub rest: Value,
	}
}

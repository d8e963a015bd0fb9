//! Ollama native chat format (`/api/chat`), streamed as NDJSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::billing;

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Message {
	pub role: String,
	#[serde(default)]
	pub content: String,
	/// Base64 images attached to the turn.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub images: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ToolCall {
	pub function: FunctionCall,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct FunctionCall {
	pub name: String,
	#[serde(default)]
	pub arguments: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Options {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub num_predict: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<Value>,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Request {
	pub model: String,
	pub messages: Vec<Message>,
	pub stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub options: Option<Options>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub format: Option<Value>,
}

/// Both streamed chunks and the final non-streaming body share this shape;
/// `done` marks the terminal record carrying eval counts.
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Response {
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub created_at: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<Message>,
	#[serde(default)]
	pub done: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub done_reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub prompt_eval_count: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub eval_count: Option<u64>,
}

impl Response {
	pub fn to_billing(&self) -> billing::Usage {
		let input = self.prompt_eval_count.unwrap_or_default();
		let output = self.eval_count.unwrap_or_default();
		billing::Usage {
			input_tokens: input,
			output_tokens: output,
			total_tokens: input + output,
			..Default::default()
		}
	}
}

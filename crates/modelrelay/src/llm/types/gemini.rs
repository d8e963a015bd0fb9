//! Google Gemini `generateContent` wire format (native v1beta dialect, also
//! spoken by Vertex AI publisher endpoints).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::billing;

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";

/// The five harm categories a request must cover when safety settings are
/// supplied at all.
pub const HARM_CATEGORIES: [&str; 5] = [
	"HARM_CATEGORY_HARASSMENT",
	"HARM_CATEGORY_HATE_SPEECH",
	"HARM_CATEGORY_SEXUALLY_EXPLICIT",
	"HARM_CATEGORY_DANGEROUS_CONTENT",
	"HARM_CATEGORY_CIVIC_INTEGRITY",
];

pub const DEFAULT_SAFETY_THRESHOLD: &str = "BLOCK_NONE";

pub fn default_safety_settings(threshold: &str) -> Vec<SafetySetting> {
	HARM_CATEGORIES
		.iter()
		.map(|c| SafetySetting {
			category: c.to_string(),
			threshold: threshold.to_string(),
		})
		.collect()
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySetting {
	pub category: String,
	pub threshold: String,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
	pub mime_type: String,
	/// Base64 payload.
	pub data: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
	pub name: String,
	#[serde(default)]
	pub args: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
	pub name: String,
	#[serde(default)]
	pub response: Value,
}

/// One part of a content turn. Exactly one of the payload fields is set.
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	/// Marks a `text` part as model thought.
	#[serde(default, skip_serializing_if = "crate::serdes::is_default")]
	pub thought: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thought_signature: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub inline_data: Option<Blob>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function_call: Option<FunctionCall>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function_response: Option<FunctionResponse>,
}

impl Part {
	pub fn text(text: impl Into<String>) -> Part {
		Part {
			text: Some(text.into()),
			..Default::default()
		}
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_none()
			&& self.inline_data.is_none()
			&& self.function_call.is_none()
			&& self.function_response.is_none()
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default)]
	pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function_declarations: Option<Vec<FunctionDeclaration>>,
	#[serde(flatten)]
	pub rest: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
	#[serde(default, skip_serializing_if = "crate::serdes::is_default")]
	pub include_thoughts: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking_budget: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_mime_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_schema: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking_config: Option<ThinkingConfig>,
	#[serde(flatten)]
	pub rest: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	#[serde(default)]
	pub contents: Vec<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system_instruction: Option<Content>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<Tool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub safety_settings: Vec<SafetySetting>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub generation_config: Option<GenerationConfig>,
	#[serde(flatten)]
	pub rest: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub index: Option<u32>,
}

impl Candidate {
	pub fn is_empty(&self) -> bool {
		self
			.content
			.as_ref()
			.is_none_or(|c| c.parts.iter().all(|p| p.is_empty()))
			&& self.finish_reason.is_none()
	}
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
	#[serde(default)]
	pub prompt_token_count: u64,
	#[serde(default)]
	pub candidates_token_count: u64,
	#[serde(default)]
	pub total_token_count: u64,
	#[serde(default, skip_serializing_if = "crate::serdes::is_default")]
	pub cached_content_token_count: u64,
	#[serde(default, skip_serializing_if = "crate::serdes::is_default")]
	pub thoughts_token_count: u64,
}

impl UsageMetadata {
	pub fn to_billing(&self) -> billing::Usage {
		billing::Usage {
			input_tokens: self.prompt_token_count,
			// Gemini counts thoughts separately from candidate tokens.
			output_tokens: self.candidates_token_count + self.thoughts_token_count,
			total_tokens: self.total_token_count,
			cached_tokens: self.cached_content_token_count,
			reasoning_tokens: self.thoughts_token_count,
			..Default::default()
		}
	}

	pub fn from_billing(u: &billing::Usage) -> UsageMetadata {
		UsageMetadata {
			prompt_token_count: u.input_tokens,
			candidates_token_count: u.output_tokens.saturating_sub(u.reasoning_tokens),
			total_token_count: u.total_tokens,
			cached_content_token_count: u.cached_tokens,
			thoughts_token_count: u.reasoning_tokens,
		}
	}
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	#[serde(default)]
	pub candidates: Vec<Candidate>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage_metadata: Option<UsageMetadata>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model_version: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_id: Option<String>,
}

pub const FINISH_STOP: &str = "STOP";
pub const FINISH_MAX_TOKENS: &str = "MAX_TOKENS";
pub const FINISH_SAFETY: &str = "SAFETY";
pub const FINISH_TOOL_CALLS: &str = "TOOL_CALLS";
pub const FINISH_FUNCTION_CALL: &str = "FUNCTION_CALL";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorResponse {
	pub error: ErrorDetail,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorDetail {
	#[serde(default)]
	pub code: i32,
	pub message: String,
	#[serde(default)]
	pub status: String,
}

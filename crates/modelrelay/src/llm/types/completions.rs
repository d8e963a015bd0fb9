//! OpenAI Chat Completions wire format. This dialect doubles as the
//! gateway's internal pivot: every other chat dialect translates to or from
//! these types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::billing;

pub const OBJECT_COMPLETION: &str = "chat.completion";
pub const OBJECT_CHUNK: &str = "chat.completion.chunk";

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	System,
	Developer,
	#[default]
	User,
	Assistant,
	Tool,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Parts(Vec<ContentPart>),
}

impl MessageContent {
	/// All textual content, parts joined with newlines.
	pub fn text(&self) -> String {
		match self {
			MessageContent::Text(t) => t.clone(),
			MessageContent::Parts(parts) => parts
				.iter()
				.filter_map(|p| match p {
					ContentPart::Text { text } => Some(text.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}

	pub fn image_urls(&self) -> Vec<&str> {
		match self {
			MessageContent::Text(_) => Vec::new(),
			MessageContent::Parts(parts) => parts
				.iter()
				.filter_map(|p| match p {
					ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
					_ => None,
				})
				.collect(),
		}
	}
}

impl From<String> for MessageContent {
	fn from(t: String) -> Self {
		MessageContent::Text(t)
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	Text {
		text: String,
	},
	ImageUrl {
		image_url: ImageUrl,
	},
	InputAudio {
		input_audio: Value,
	},
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ImageUrl {
	pub url: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

/// A single chat message. Flat rather than per-role so translators can move
/// fields without re-tagging; validation of which fields belong to which
/// role stays with the upstream provider.
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct RequestMessage {
	pub role: Role,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<MessageContent>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<ToolCall>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	/// Opaque provider extras carried across turns (e.g. the Gemini thought
	/// signature).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub extra_content: Option<Value>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ToolCall {
	pub id: String,
	#[serde(rename = "type", default = "function_type")]
	pub kind: String,
	pub function: FunctionCall,
}

fn function_type() -> String {
	"function".to_string()
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct FunctionCall {
	pub name: String,
	/// JSON-encoded arguments object, as a string.
	pub arguments: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Tool {
	#[serde(rename = "type", default = "function_type")]
	pub kind: String,
	pub function: FunctionDefinition,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct FunctionDefinition {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
	/// "auto" | "none" | "required"
	Mode(String),
	Named {
		#[serde(rename = "type")]
		kind: String,
		function: FunctionName,
	},
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct FunctionName {
	pub name: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ResponseFormat {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub json_schema: Option<JsonSchemaSpec>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct JsonSchemaSpec {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct StreamOptions {
	#[serde(default)]
	pub include_usage: bool,
}

/// Claude-shaped reasoning toggle, accepted as an extension on the
/// completions dialect and mapped per provider.
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
	Enabled {
		#[serde(skip_serializing_if = "Option::is_none")]
		budget_tokens: Option<u64>,
	},
	Disabled {},
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Request {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default)]
	pub messages: Vec<RequestMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_format: Option<ResponseFormat>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub store: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking: Option<ThinkingConfig>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_effort: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub chat_template_kwargs: Option<Value>,
	#[serde(flatten)]
	pub rest: Value,
}

impl Request {
	pub fn is_stream(&self) -> bool {
		self.stream.unwrap_or_default()
	}

	/// Effective output-token cap; `max_completion_tokens` wins over the
	/// deprecated `max_tokens`.
	pub fn output_cap(&self) -> Option<u64> {
		self.max_completion_tokens.or(self.max_tokens)
	}
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct PromptTokensDetails {
	#[serde(default)]
	pub cached_tokens: u64,
	#[serde(default, skip_serializing_if = "crate::serdes::is_default")]
	pub audio_tokens: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct CompletionTokensDetails {
	#[serde(default)]
	pub reasoning_tokens: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u64,
	#[serde(default)]
	pub completion_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completion_tokens_details: Option<CompletionTokensDetails>,
}

impl Usage {
	pub fn to_billing(&self) -> billing::Usage {
		billing::Usage {
			input_tokens: self.prompt_tokens,
			output_tokens: self.completion_tokens,
			total_tokens: self.total_tokens,
			cached_tokens: self
				.prompt_tokens_details
				.as_ref()
				.map(|d| d.cached_tokens)
				.unwrap_or_default(),
			reasoning_tokens: self
				.completion_tokens_details
				.as_ref()
				.map(|d| d.reasoning_tokens)
				.unwrap_or_default(),
			..Default::default()
		}
	}

	pub fn from_billing(u: &billing::Usage) -> Usage {
		Usage {
			prompt_tokens: u.input_tokens,
			completion_tokens: u.output_tokens,
			total_tokens: u.total_tokens,
			prompt_tokens_details: (u.cached_tokens > 0).then(|| PromptTokensDetails {
				cached_tokens: u.cached_tokens,
				audio_tokens: 0,
			}),
			completion_tokens_details: (u.reasoning_tokens > 0).then(|| CompletionTokensDetails {
				reasoning_tokens: u.reasoning_tokens,
			}),
		}
	}
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
	Stop,
	Length,
	ToolCalls,
	ContentFilter,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct ResponseMessage {
	#[serde(default)]
	pub role: Role,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<MessageContent>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Choice {
	pub index: u32,
	pub message: ResponseMessage,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Response {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(flatten)]
	pub rest: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct DeltaToolCall {
	pub index: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	pub function: DeltaFunction,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct DeltaFunction {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Delta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<Role>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<DeltaToolCall>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct StreamChoice {
	pub index: u32,
	pub delta: Delta,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct StreamResponse {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	#[serde(default)]
	pub choices: Vec<StreamChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

impl StreamResponse {
	pub fn new(id: &str, model: &str, created: i64) -> StreamResponse {
		StreamResponse {
			id: id.to_string(),
			object: OBJECT_CHUNK.to_string(),
			created,
			model: model.to_string(),
			choices: Vec::new(),
			usage: None,
		}
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ErrorResponse {
	pub error: ErrorDetail,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ErrorDetail {
	pub message: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub param: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub code: Option<Value>,
}

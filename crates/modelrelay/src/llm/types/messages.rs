//! Anthropic Messages wire format.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::billing;
use crate::serdes::is_default;

#[derive(Copy, Clone, Deserialize, Serialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	#[default]
	User,
	Assistant,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ContentBlock {
	Text {
		text: String,
	},
	Image {
		source: ImageSource,
	},
	Thinking {
		thinking: String,
		#[serde(default, skip_serializing_if = "String::is_empty")]
		signature: String,
	},
	RedactedThinking {
		data: String,
	},
	ToolUse {
		id: String,
		name: String,
		input: Value,
	},
	ToolResult {
		tool_use_id: String,
		content: ToolResultContent,
		#[serde(skip_serializing_if = "Option::is_none")]
		is_error: Option<bool>,
	},
	// There are many more block kinds; pass unknown ones through untyped
	// rather than failing the request.
	#[serde(other)]
	Unknown,
}

#[derive(Clone, Deserialize, Serialize, Debug)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ImageSource {
	Base64 {
		media_type: String,
		data: String,
	},
	Url {
		url: String,
	},
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ToolResultContent {
	Text(String),
	Array(Vec<ToolResultContentPart>),
}

impl ToolResultContent {
	pub fn joined_text(&self) -> String {
		match self {
			ToolResultContent::Text(t) => t.clone(),
			ToolResultContent::Array(parts) => parts
				.iter()
				.filter_map(|p| match p {
					ToolResultContentPart::Text { text } => Some(text.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContentPart {
	Text {
		text: String,
	},
	Image {
		source: ImageSource,
	},
}

#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct Message {
	pub role: Role,
	#[serde(deserialize_with = "deserialize_content")]
	pub content: Vec<ContentBlock>,
}

// Anthropic accepts both `"content": "hi"` and `"content": [...]`.
fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;

	let value = Value::deserialize(deserializer)?;
	match value {
		Value::String(text) => Ok(vec![ContentBlock::Text { text }]),
		Value::Array(_) => Vec::<ContentBlock>::deserialize(value).map_err(D::Error::custom),
		_ => Err(D::Error::custom(
			"content must be either a string or an array",
		)),
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
	Text(String),
	Blocks(Vec<SystemContentBlock>),
}

impl SystemPrompt {
	pub fn joined_text(&self) -> String {
		match self {
			SystemPrompt::Text(t) => t.clone(),
			SystemPrompt::Blocks(blocks) => blocks
				.iter()
				.map(|SystemContentBlock::Text { text }| text.as_str())
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemContentBlock {
	Text { text: String },
}

#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ThinkingInput {
	Enabled { budget_tokens: u64 },
	Disabled {},
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Tool {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
	Auto,
	Any,
	Tool { name: String },
	None,
}

#[derive(Deserialize, Serialize, Default, Debug)]
pub struct Request {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<SystemPrompt>,
	pub max_tokens: u64,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(default, skip_serializing_if = "is_default")]
	pub stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub thinking: Option<ThinkingInput>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	EndTurn,
	MaxTokens,
	StopSequence,
	ToolUse,
	Refusal,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, Default)]
pub struct Usage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache_creation_input_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u64>,
}

impl Usage {
	pub fn to_billing(&self) -> billing::Usage {
		billing::Usage {
			input_tokens: self.input_tokens,
			output_tokens: self.output_tokens,
			total_tokens: self.input_tokens + self.output_tokens,
			cached_tokens: self.cache_read_input_tokens.unwrap_or_default(),
			cache_creation_tokens: self.cache_creation_input_tokens.unwrap_or_default(),
			..Default::default()
		}
	}

	pub fn from_billing(u: &billing::Usage) -> Usage {
		Usage {
			input_tokens: u.input_tokens,
			output_tokens: u.output_tokens,
			cache_creation_input_tokens: (u.cache_creation_tokens > 0).then_some(u.cache_creation_tokens),
			cache_read_input_tokens: (u.cached_tokens > 0).then_some(u.cached_tokens),
		}
	}
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Response {
	pub id: String,
	pub r#type: String,
	pub role: Role,
	pub content: Vec<ContentBlock>,
	pub model: String,
	pub stop_reason: Option<StopReason>,
	pub stop_sequence: Option<String>,
	pub usage: Usage,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StreamEvent {
	MessageStart {
		message: Response,
	},
	ContentBlockStart {
		index: usize,
		content_block: ContentBlock,
	},
	ContentBlockDelta {
		index: usize,
		delta: ContentBlockDelta,
	},
	ContentBlockStop {
		index: usize,
	},
	MessageDelta {
		delta: MessageDelta,
		usage: Usage,
	},
	MessageStop,
	Ping,
}

impl StreamEvent {
	pub fn event_name(&self) -> &'static str {
		match self {
			Self::MessageStart { .. } => "message_start",
			Self::ContentBlockStart { .. } => "content_block_start",
			Self::ContentBlockDelta { .. } => "content_block_delta",
			Self::ContentBlockStop { .. } => "content_block_stop",
			Self::MessageDelta { .. } => "message_delta",
			Self::MessageStop => "message_stop",
			Self::Ping => "ping",
		}
	}
}

#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
#[allow(clippy::enum_variant_names)]
pub enum ContentBlockDelta {
	TextDelta { text: String },
	InputJsonDelta { partial_json: String },
	ThinkingDelta { thinking: String },
	SignatureDelta { signature: String },
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct MessageDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<StopReason>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequence: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorResponse {
	pub r#type: String,
	pub error: ErrorDetail,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorDetail {
	pub r#type: String,
	pub message: String,
}

//! OpenAI Responses API wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::billing;

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(untagged)]
pub enum Input {
	Text(String),
	Items(Vec<InputItem>),
}

impl Default for Input {
	fn default() -> Self {
		Input::Items(Vec::new())
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
	Message {
		role: String,
		content: InputContent,
	},
	FunctionCall {
		#[serde(skip_serializing_if = "Option::is_none")]
		id: Option<String>,
		call_id: String,
		name: String,
		arguments: String,
	},
	FunctionCallOutput {
		call_id: String,
		output: String,
	},
	Reasoning {
		#[serde(skip_serializing_if = "Option::is_none")]
		id: Option<String>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		summary: Vec<SummaryPart>,
		#[serde(skip_serializing_if = "Option::is_none")]
		encrypted_content: Option<String>,
	},
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(untagged)]
pub enum InputContent {
	Text(String),
	Parts(Vec<InputContentPart>),
}

impl InputContent {
	pub fn text(&self) -> String {
		match self {
			InputContent::Text(t) => t.clone(),
			InputContent::Parts(parts) => parts
				.iter()
				.filter_map(|p| match p {
					InputContentPart::InputText { text } | InputContentPart::OutputText { text, .. } => {
						Some(text.as_str())
					},
					_ => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContentPart {
	InputText {
		text: String,
	},
	OutputText {
		text: String,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		annotations: Vec<Value>,
	},
	InputImage {
		#[serde(skip_serializing_if = "Option::is_none")]
		image_url: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		detail: Option<String>,
	},
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct SummaryPart {
	#[serde(rename = "type")]
	pub kind: String,
	pub text: String,
}

/// Responses-API tools are flat, unlike the nested completions shape.
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ToolDefinition {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
	#[serde(flatten)]
	pub rest: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct ReasoningConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub effort: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Request {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default)]
	pub input: Input,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub instructions: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub store: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<ToolDefinition>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reasoning: Option<ReasoningConfig>,
	#[serde(flatten)]
	pub rest: Value,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
	Message {
		#[serde(skip_serializing_if = "Option::is_none")]
		id: Option<String>,
		role: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		status: Option<String>,
		content: Vec<OutputContent>,
	},
	FunctionCall {
		#[serde(skip_serializing_if = "Option::is_none")]
		id: Option<String>,
		call_id: String,
		name: String,
		arguments: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		status: Option<String>,
	},
	Reasoning {
		#[serde(skip_serializing_if = "Option::is_none")]
		id: Option<String>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		summary: Vec<SummaryPart>,
		#[serde(skip_serializing_if = "Option::is_none")]
		encrypted_content: Option<String>,
	},
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
	OutputText {
		text: String,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		annotations: Vec<Value>,
	},
	Refusal {
		refusal: String,
	},
	#[serde(other)]
	Unknown,
}

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_INCOMPLETE: &str = "incomplete";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_IN_PROGRESS: &str = "in_progress";

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct InputTokensDetails {
	#[serde(default)]
	pub cached_tokens: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct OutputTokensDetails {
	#[serde(default)]
	pub reasoning_tokens: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Usage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub input_tokens_details: Option<InputTokensDetails>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output_tokens_details: Option<OutputTokensDetails>,
}

impl Usage {
	pub fn to_billing(&self) -> billing::Usage {
		billing::Usage {
			input_tokens: self.input_tokens,
			output_tokens: self.output_tokens,
			total_tokens: self.total_tokens,
			cached_tokens: self
				.input_tokens_details
				.as_ref()
				.map(|d| d.cached_tokens)
				.unwrap_or_default(),
			reasoning_tokens: self
				.output_tokens_details
				.as_ref()
				.map(|d| d.reasoning_tokens)
				.unwrap_or_default(),
			..Default::default()
		}
	}

	pub fn from_billing(u: &billing::Usage) -> Usage {
		Usage {
			input_tokens: u.input_tokens,
			output_tokens: u.output_tokens,
			total_tokens: u.total_tokens,
			input_tokens_details: (u.cached_tokens > 0).then(|| InputTokensDetails {
				cached_tokens: u.cached_tokens,
			}),
			output_tokens_details: (u.reasoning_tokens > 0).then(|| OutputTokensDetails {
				reasoning_tokens: u.reasoning_tokens,
			}),
		}
	}
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Response {
	pub id: String,
	pub object: String,
	pub created_at: i64,
	pub status: String,
	pub model: String,
	#[serde(default)]
	pub output: Vec<OutputItem>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
	#[serde(flatten)]
	pub rest: Value,
}

/// Streaming events, dispatched on the `type` discriminator.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
	#[serde(rename = "response.created")]
	Created { response: Response },
	#[serde(rename = "response.in_progress")]
	InProgress { response: Response },
	#[serde(rename = "response.output_item.added")]
	OutputItemAdded {
		output_index: usize,
		item: OutputItem,
	},
	#[serde(rename = "response.output_item.done")]
	OutputItemDone {
		output_index: usize,
		item: OutputItem,
	},
	#[serde(rename = "response.content_part.added")]
	ContentPartAdded {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
	},
	#[serde(rename = "response.content_part.done")]
	ContentPartDone {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
	},
	#[serde(rename = "response.output_text.delta")]
	OutputTextDelta {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		delta: String,
	},
	#[serde(rename = "response.output_text.done")]
	OutputTextDone {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		text: String,
	},
	#[serde(rename = "response.function_call_arguments.delta")]
	FunctionCallArgumentsDelta {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		delta: String,
	},
	#[serde(rename = "response.function_call_arguments.done")]
	FunctionCallArgumentsDone {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		arguments: String,
	},
	#[serde(rename = "response.reasoning_text.delta")]
	ReasoningTextDelta {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		delta: String,
	},
	#[serde(rename = "response.reasoning_text.done")]
	ReasoningTextDone {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		text: String,
	},
	#[serde(rename = "response.reasoning_summary_text.delta")]
	ReasoningSummaryTextDelta {
		output_index: usize,
		#[serde(skip_serializing_if = "Option::is_none")]
		item_id: Option<String>,
		delta: String,
	},
	#[serde(rename = "response.completed")]
	Completed { response: Response },
	#[serde(rename = "response.incomplete")]
	Incomplete { response: Response },
	#[serde(rename = "response.failed")]
	Failed { response: Response },
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorResponse {
	pub error: ErrorDetail,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ErrorDetail {
	pub message: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub param: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub code: Option<Value>,
}

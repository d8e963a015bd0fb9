//! Translation between client dialects and OpenAI-compatible chat upstreams,
//! plus passthrough observation for matched dialects.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Value, json};

use super::{PendingCalls, ids};
use crate::http::Body;
use crate::llm::types::completions;
use crate::llm::{AIError, StreamInfo};
use crate::parse;
use crate::parse::sse::{Event, OutFrame};
use crate::telemetry::AsyncLog;

/// Streaming without usage makes billing blind; opt every stream into the
/// trailing usage chunk unless the caller explicitly refused it.
pub fn ensure_stream_usage(req: &mut completions::Request) {
	if req.is_stream() && req.stream_options.is_none() {
		req.stream_options = Some(completions::StreamOptions {
			include_usage: true,
		});
	}
}

/// deepseek-reasoner wants its template flag, and its streams interleave
/// reasoning into `content` behind a `</think>` marker. Returns whether the
/// stream handler should arm the splitter.
pub fn apply_reasoner_quirks(req: &mut completions::Request) -> bool {
	if req.model.as_deref() != Some("deepseek-reasoner") {
		return false;
	}
	let kwargs = req
		.chat_template_kwargs
		.get_or_insert_with(|| json!({}));
	if let Some(obj) = kwargs.as_object_mut() {
		obj.insert("thinking".to_string(), Value::Bool(true));
	}
	true
}

const THINK_TAG: &str = "</think>";

/// Splits streamed `content` on the `</think>` marker: text before the tag
/// is reasoning, text after it is real content, and the tag itself vanishes.
/// A window of `len(tag) - 1` bytes is carried across chunk boundaries so a
/// split tag is still found.
pub struct ThinkSplitter {
	passed_tag: bool,
	held: String,
}

impl Default for ThinkSplitter {
	fn default() -> Self {
		ThinkSplitter {
			passed_tag: false,
			held: String::new(),
		}
	}
}

impl ThinkSplitter {
	/// Feed one content delta; returns `(reasoning, content)` to emit.
	pub fn push(&mut self, text: &str) -> (Option<String>, Option<String>) {
		if self.passed_tag {
			return (None, non_empty(text.to_string()));
		}
		self.held.push_str(text);
		if let Some(pos) = self.held.find(THINK_TAG) {
			let reasoning = self.held[..pos].to_string();
			let content = self.held[pos + THINK_TAG.len()..].to_string();
			self.passed_tag = true;
			self.held.clear();
			return (non_empty(reasoning), non_empty(content));
		}
		let keep = self.tag_prefix_len();
		let emit = self.held[..self.held.len() - keep].to_string();
		self.held.drain(..self.held.len() - keep);
		(non_empty(emit), None)
	}

	/// Flush the carried window at end of stream; a tag that never closed
	/// means everything was reasoning.
	pub fn finish(&mut self) -> Option<String> {
		non_empty(std::mem::take(&mut self.held))
	}

	fn tag_prefix_len(&self) -> usize {
		let max = THINK_TAG.len().min(self.held.len() + 1) - 1;
		for k in (1..=max).rev() {
			let at = self.held.len() - k;
			if self.held.is_char_boundary(at) && THINK_TAG.starts_with(&self.held[at..]) {
				return k;
			}
		}
		0
	}
}

fn non_empty(s: String) -> Option<String> {
	(!s.is_empty()).then_some(s)
}

/// Observe an OpenAI-to-OpenAI stream. With `split_reasoning` the
/// deepseek-style `</think>` marker is extracted en route; otherwise bytes
/// pass through untouched.
pub fn passthrough_stream(
	b: Body,
	buffer_limit: usize,
	split_reasoning: bool,
	log: AsyncLog<StreamInfo>,
) -> Body {
	if !split_reasoning {
		return parse::sse::json_passthrough::<completions::StreamResponse, _>(
			b,
			buffer_limit,
			move |ev| {
				let Some(Ok(chunk)) = ev else { return };
				observe_chunk(&chunk, &log);
			},
		);
	}
	let mut splitter = ThinkSplitter::default();
	parse::sse::json_transform_multi::<completions::StreamResponse, _>(
		b,
		buffer_limit,
		move |ev| match ev {
			Event::Data(Ok(mut chunk)) => {
				observe_chunk(&chunk, &log);
				for choice in &mut chunk.choices {
					if let Some(text) = choice.delta.content.take() {
						let (reasoning, content) = splitter.push(&text);
						choice.delta.reasoning_content = match (choice.delta.reasoning_content.take(), reasoning)
						{
							(Some(mut a), Some(b)) => {
								a.push_str(&b);
								Some(a)
							},
							(a, b) => a.or(b),
						};
						choice.delta.content = content;
					}
				}
				// Chunks whose only content was swallowed by the window still
				// flow through so ordering and usage stay intact.
				vec![OutFrame::data(&chunk)]
			},
			Event::Data(Err(_)) => Vec::new(),
			Event::Done => {
				let mut out = Vec::new();
				if let Some(rest) = splitter.finish() {
					let chunk = completions::StreamResponse {
						id: "tail".to_string(),
						object: completions::OBJECT_CHUNK.to_string(),
						created: chrono::Utc::now().timestamp(),
						model: String::new(),
						choices: vec![completions::StreamChoice {
							index: 0,
							delta: completions::Delta {
								reasoning_content: Some(rest),
								..Default::default()
							},
							finish_reason: None,
						}],
						usage: None,
					};
					out.push(OutFrame::data(&chunk));
				}
				out.push(OutFrame::done());
				out
			},
		},
	)
}

fn observe_chunk(chunk: &completions::StreamResponse, log: &AsyncLog<StreamInfo>) {
	let delta_text: Option<String> = chunk
		.choices
		.first()
		.and_then(|c| c.delta.content.clone());
	let model = chunk.model.clone();
	let usage = chunk.usage.as_ref().map(|u| u.to_billing());
	log.non_atomic_mutate(|r| {
		if r.provider_model.is_none() && !model.is_empty() {
			r.provider_model = Some(relay_core::strng::new(&model));
		}
		if let Some(text) = &delta_text {
			r.saw_token();
			r.completion.push_str(text);
		}
		if let Some(u) = usage {
			r.usage.supersede(u);
		}
	});
}

pub mod from_messages {
	use super::*;
	use crate::llm::types::messages;

	/// Translate an Anthropic messages request into an OpenAI
	/// chat-completions request.
	pub fn translate(req: &messages::Request) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(req: &messages::Request) -> completions::Request {
		let mut msgs: Vec<completions::RequestMessage> = Vec::new();
		if let Some(system) = &req.system {
			msgs.push(completions::RequestMessage {
				role: completions::Role::System,
				content: Some(completions::MessageContent::Text(system.joined_text())),
				..Default::default()
			});
		}

		// Ids are kept when OpenAI would accept them; a regenerated id must
		// be applied to both the call and its result, so remember renames.
		let mut renames: HashMap<String, String> = HashMap::new();

		for msg in &req.messages {
			match msg.role {
				messages::Role::User => {
					let mut parts: Vec<completions::ContentPart> = Vec::new();
					for block in &msg.content {
						match block {
							messages::ContentBlock::Text { text } => {
								parts.push(completions::ContentPart::Text { text: text.clone() });
							},
							messages::ContentBlock::Image { source } => {
								let url = match source {
									messages::ImageSource::Base64 { media_type, data } => {
										format!("data:{media_type};base64,{data}")
									},
									messages::ImageSource::Url { url } => url.clone(),
								};
								parts.push(completions::ContentPart::ImageUrl {
									image_url: completions::ImageUrl { url, detail: None },
								});
							},
							messages::ContentBlock::ToolResult {
								tool_use_id,
								content,
								..
							} => {
								let id = renames
									.get(tool_use_id)
									.cloned()
									.unwrap_or_else(|| tool_use_id.clone());
								msgs.push(completions::RequestMessage {
									role: completions::Role::Tool,
									content: Some(completions::MessageContent::Text(content.joined_text())),
									tool_call_id: Some(id),
									..Default::default()
								});
							},
							_ => {},
						}
					}
					if !parts.is_empty() {
						let content = if parts.len() == 1
							&& let completions::ContentPart::Text { text } = &parts[0]
						{
							completions::MessageContent::Text(text.clone())
						} else {
							completions::MessageContent::Parts(parts)
						};
						msgs.push(completions::RequestMessage {
							role: completions::Role::User,
							content: Some(content),
							..Default::default()
						});
					}
				},
				messages::Role::Assistant => {
					let mut text: Option<String> = None;
					let mut reasoning: Option<String> = None;
					let mut extra: Option<Value> = None;
					let mut tool_calls: Vec<completions::ToolCall> = Vec::new();
					for block in &msg.content {
						match block {
							messages::ContentBlock::Text { text: t } => match &mut text {
								Some(existing) => existing.push_str(t),
								None => text = Some(t.clone()),
							},
							messages::ContentBlock::Thinking {
								thinking,
								signature,
							} => {
								reasoning = Some(thinking.clone());
								if !signature.is_empty() {
									extra = Some(json!({"signature": signature}));
								}
							},
							messages::ContentBlock::ToolUse { id, name, input } => {
								let out_id = ids::sanitize_call_id(id);
								if out_id != *id {
									renames.insert(id.clone(), out_id.clone());
								}
								tool_calls.push(completions::ToolCall {
									id: out_id,
									kind: "function".to_string(),
									function: completions::FunctionCall {
										name: name.clone(),
										arguments: input.to_string(),
									},
								});
							},
							_ => {},
						}
					}
					if text.is_some() || reasoning.is_some() || !tool_calls.is_empty() {
						msgs.push(completions::RequestMessage {
							role: completions::Role::Assistant,
							content: text.map(completions::MessageContent::Text),
							reasoning_content: reasoning,
							extra_content: extra,
							tool_calls,
							..Default::default()
						});
					}
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.map(|t| completions::Tool {
					kind: "function".to_string(),
					function: completions::FunctionDefinition {
						name: t.name.clone(),
						description: t.description.clone(),
						parameters: Some(t.input_schema.clone()),
						strict: None,
					},
				})
				.collect()
		});

		let tool_choice = req.tool_choice.as_ref().map(|choice| match choice {
			messages::ToolChoice::Auto => completions::ToolChoice::Mode("auto".to_string()),
			messages::ToolChoice::Any => completions::ToolChoice::Mode("required".to_string()),
			messages::ToolChoice::None => completions::ToolChoice::Mode("none".to_string()),
			messages::ToolChoice::Tool { name } => completions::ToolChoice::Named {
				kind: "function".to_string(),
				function: completions::FunctionName { name: name.clone() },
			},
		});

		let mut out = completions::Request {
			model: Some(req.model.clone()),
			messages: msgs,
			tools,
			tool_choice,
			temperature: req.temperature,
			top_p: req.top_p,
			max_completion_tokens: Some(req.max_tokens),
			stop: (!req.stop_sequences.is_empty()).then(|| json!(req.stop_sequences)),
			stream: Some(req.stream),
			user: req
				.metadata
				.as_ref()
				.and_then(|m| m.get("user_id"))
				.and_then(|v| v.as_str())
				.map(|s| s.to_string()),
			thinking: req.thinking.as_ref().map(|t| match t {
				messages::ThinkingInput::Enabled { budget_tokens } => {
					completions::ThinkingConfig::Enabled {
						budget_tokens: Some(*budget_tokens),
					}
				},
				messages::ThinkingInput::Disabled {} => completions::ThinkingConfig::Disabled {},
			}),
			..Default::default()
		};
		ensure_stream_usage(&mut out);
		out
	}

	/// Translate an OpenAI chat completion into an Anthropic response.
	pub fn translate_response(bytes: &Bytes) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<completions::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let claude = translate_response_internal(&resp);
		serde_json::to_vec(&claude).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &completions::Response) -> messages::Response {
		let mut content: Vec<messages::ContentBlock> = Vec::new();
		let mut stop_reason = None;
		if let Some(choice) = resp.choices.first() {
			if let Some(reasoning) = &choice.message.reasoning_content {
				content.push(messages::ContentBlock::Thinking {
					thinking: reasoning.clone(),
					signature: choice.message.signature.clone().unwrap_or_default(),
				});
			}
			if let Some(text) = &choice.message.content {
				let text = text.text();
				if !text.is_empty() {
					content.push(messages::ContentBlock::Text { text });
				}
			}
			for tc in &choice.message.tool_calls {
				content.push(messages::ContentBlock::ToolUse {
					id: tc.id.clone(),
					name: tc.function.name.clone(),
					input: serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({})),
				});
			}
			stop_reason = choice.finish_reason.map(finish_to_stop_reason);
		}
		// Claude requires at least one content block.
		if content.is_empty() {
			content.push(messages::ContentBlock::Text {
				text: String::new(),
			});
		}
		messages::Response {
			id: ids::new_message_id(),
			r#type: "message".to_string(),
			role: messages::Role::Assistant,
			content,
			model: resp.model.clone(),
			stop_reason,
			stop_sequence: None,
			usage: resp
				.usage
				.as_ref()
				.map(|u| messages::Usage::from_billing(&u.to_billing()))
				.unwrap_or_default(),
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res = serde_json::from_slice::<completions::ErrorResponse>(bytes)
			.map_err(AIError::ResponseParsing)?;
		let m = messages::ErrorResponse {
			r#type: "error".to_string(),
			error: messages::ErrorDetail {
				r#type: "api_error".to_string(),
				message: res.error.message,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	enum OpenBlock {
		None,
		Text,
		Thinking,
		Tool,
	}

	/// OpenAI chunk stream to Anthropic typed events.
	pub fn translate_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
		let mut started = false;
		let mut model = String::new();
		let mut block = OpenBlock::None;
		let mut block_index: usize = 0;
		// OpenAI tool index to the Anthropic block index it opened.
		let mut tool_blocks: HashMap<u32, usize> = HashMap::new();
		let mut usage = messages::Usage::default();
		let mut stop_reason: Option<messages::StopReason> = None;
		let id = ids::new_message_id();
		parse::sse::json_transform_multi::<completions::StreamResponse, _>(
			b,
			buffer_limit,
			move |ev| {
				let ev_frame = |e: &messages::StreamEvent| OutFrame::event(e.event_name(), e);
				match ev {
					Event::Data(Ok(chunk)) => {
						observe_chunk(&chunk, &log);
						let mut out = Vec::new();
						if !started {
							started = true;
							model = chunk.model.clone();
							out.push(ev_frame(&messages::StreamEvent::MessageStart {
								message: messages::Response {
									id: id.clone(),
									r#type: "message".to_string(),
									role: messages::Role::Assistant,
									content: Vec::new(),
									model: chunk.model.clone(),
									stop_reason: None,
									stop_sequence: None,
									usage: messages::Usage::default(),
								},
							}));
						}
						if let Some(u) = &chunk.usage {
							usage = messages::Usage::from_billing(&u.to_billing());
						}
						for choice in &chunk.choices {
							if let Some(reasoning) = &choice.delta.reasoning_content {
								if !matches!(block, OpenBlock::Thinking) {
									close_block(&mut out, &mut block, &mut block_index, ev_frame);
									block = OpenBlock::Thinking;
									out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
										index: block_index,
										content_block: messages::ContentBlock::Thinking {
											thinking: String::new(),
											signature: String::new(),
										},
									}));
								}
								out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
									index: block_index,
									delta: messages::ContentBlockDelta::ThinkingDelta {
										thinking: reasoning.clone(),
									},
								}));
							}
							if let Some(sig) = &choice.delta.signature
								&& matches!(block, OpenBlock::Thinking)
							{
								out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
									index: block_index,
									delta: messages::ContentBlockDelta::SignatureDelta {
										signature: sig.clone(),
									},
								}));
							}
							if let Some(text) = &choice.delta.content {
								if !matches!(block, OpenBlock::Text) {
									close_block(&mut out, &mut block, &mut block_index, ev_frame);
									block = OpenBlock::Text;
									out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
										index: block_index,
										content_block: messages::ContentBlock::Text {
											text: String::new(),
										},
									}));
								}
								out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
									index: block_index,
									delta: messages::ContentBlockDelta::TextDelta { text: text.clone() },
								}));
							}
							for tc in &choice.delta.tool_calls {
								if let Some(name) = &tc.function.name {
									// A named delta opens a new tool_use block.
									close_block(&mut out, &mut block, &mut block_index, ev_frame);
									block = OpenBlock::Tool;
									tool_blocks.insert(tc.index, block_index);
									out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
										index: block_index,
										content_block: messages::ContentBlock::ToolUse {
											id: tc.id.clone().unwrap_or_else(ids::new_call_id),
											name: name.clone(),
											input: json!({}),
										},
									}));
								}
								if let Some(args) = &tc.function.arguments
									&& !args.is_empty()
									&& let Some(idx) = tool_blocks.get(&tc.index)
								{
									out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
										index: *idx,
										delta: messages::ContentBlockDelta::InputJsonDelta {
											partial_json: args.clone(),
										},
									}));
								}
							}
							if let Some(finish) = choice.finish_reason {
								stop_reason = Some(finish_to_stop_reason(finish));
							}
						}
						out
					},
					Event::Data(Err(_)) => Vec::new(),
					Event::Done => {
						let mut out = Vec::new();
						close_block(&mut out, &mut block, &mut block_index, |e| {
							OutFrame::event(e.event_name(), e)
						});
						out.push(OutFrame::event(
							"message_delta",
							&messages::StreamEvent::MessageDelta {
								delta: messages::MessageDelta {
									stop_reason: Some(stop_reason.take().unwrap_or(messages::StopReason::EndTurn)),
									stop_sequence: None,
								},
								usage,
							},
						));
						out.push(OutFrame::event(
							"message_stop",
							&messages::StreamEvent::MessageStop,
						));
						out
					},
				}
			},
		)
	}

	fn close_block(
		out: &mut Vec<OutFrame>,
		block: &mut OpenBlock,
		block_index: &mut usize,
		ev_frame: impl Fn(&messages::StreamEvent) -> OutFrame,
	) {
		if !matches!(block, OpenBlock::None) {
			out.push(ev_frame(&messages::StreamEvent::ContentBlockStop {
				index: *block_index,
			}));
			*block_index += 1;
			*block = OpenBlock::None;
		}
	}

	fn finish_to_stop_reason(finish: completions::FinishReason) -> messages::StopReason {
		match finish {
			completions::FinishReason::Stop => messages::StopReason::EndTurn,
			completions::FinishReason::Length => messages::StopReason::MaxTokens,
			completions::FinishReason::ToolCalls => messages::StopReason::ToolUse,
			completions::FinishReason::ContentFilter => messages::StopReason::Refusal,
		}
	}

}

pub mod from_gemini {
	use super::*;
	use crate::llm::types::gemini;

	/// Translate a Gemini-native request into an OpenAI chat-completions
	/// request. `stream` comes from the route (`:streamGenerateContent`),
	/// not the body.
	pub fn translate(
		req: &gemini::Request,
		model: &str,
		stream: bool,
	) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req, model, stream);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	pub(crate) fn translate_internal(
		req: &gemini::Request,
		model: &str,
		stream: bool,
	) -> completions::Request {
		let mut msgs: Vec<completions::RequestMessage> = Vec::new();
		if let Some(system) = &req.system_instruction {
			let text = system
				.parts
				.iter()
				.filter_map(|p| p.text.as_deref())
				.collect::<Vec<_>>()
				.join("\n");
			if !text.is_empty() {
				msgs.push(completions::RequestMessage {
					role: completions::Role::System,
					content: Some(completions::MessageContent::Text(text)),
					..Default::default()
				});
			}
		}

		// Tool responses are matched to earlier calls by function name, FIFO.
		// Gemini clients do not send call ids, so ids are minted here.
		let mut pending = PendingCalls::default();

		for content in &req.contents {
			let is_model = content.role.as_deref() == Some(gemini::ROLE_MODEL);
			if is_model {
				let mut text: Option<String> = None;
				let mut reasoning: Option<String> = None;
				let mut extra: Option<Value> = None;
				let mut tool_calls: Vec<completions::ToolCall> = Vec::new();
				for part in &content.parts {
					if let Some(t) = &part.text {
						if part.thought {
							reasoning = Some(t.clone());
							if let Some(sig) = &part.thought_signature {
								extra = Some(json!({"thoughtSignature": sig}));
							}
						} else {
							match &mut text {
								Some(existing) => existing.push_str(t),
								None => text = Some(t.clone()),
							}
						}
					}
					if let Some(fc) = &part.function_call {
						let id = ids::new_call_id();
						pending.push(&fc.name, &id);
						tool_calls.push(completions::ToolCall {
							id,
							kind: "function".to_string(),
							function: completions::FunctionCall {
								name: fc.name.clone(),
								arguments: fc.args.to_string(),
							},
						});
					}
				}
				if text.is_some() || reasoning.is_some() || !tool_calls.is_empty() {
					msgs.push(completions::RequestMessage {
						role: completions::Role::Assistant,
						content: text.map(completions::MessageContent::Text),
						reasoning_content: reasoning,
						extra_content: extra,
						tool_calls,
						..Default::default()
					});
				}
				continue;
			}
			// User-role content: text, images, and function responses.
			let mut parts: Vec<completions::ContentPart> = Vec::new();
			for part in &content.parts {
				if let Some(t) = &part.text {
					parts.push(completions::ContentPart::Text { text: t.clone() });
				}
				if let Some(blob) = &part.inline_data {
					parts.push(completions::ContentPart::ImageUrl {
						image_url: completions::ImageUrl {
							url: format!("data:{};base64,{}", blob.mime_type, blob.data),
							detail: None,
						},
					});
				}
				if let Some(fr) = &part.function_response {
					let id = match pending.pop_by_name(&fr.name) {
						Some(id) => id,
						None => {
							// No model turn ever made this call (common when a
							// client replays a trimmed history): fabricate the
							// assistant call so the OpenAI schema validates.
							let id = ids::new_call_id();
							msgs.push(completions::RequestMessage {
								role: completions::Role::Assistant,
								tool_calls: vec![completions::ToolCall {
									id: id.clone(),
									kind: "function".to_string(),
									function: completions::FunctionCall {
										name: fr.name.clone(),
										arguments: "{}".to_string(),
									},
								}],
								..Default::default()
							});
							id
						},
					};
					msgs.push(completions::RequestMessage {
						role: completions::Role::Tool,
						content: Some(completions::MessageContent::Text(fr.response.to_string())),
						name: Some(fr.name.clone()),
						tool_call_id: Some(id),
						..Default::default()
					});
				}
			}
			if !parts.is_empty() {
				let content = if parts.len() == 1
					&& let completions::ContentPart::Text { text } = &parts[0]
				{
					completions::MessageContent::Text(text.clone())
				} else {
					completions::MessageContent::Parts(parts)
				};
				msgs.push(completions::RequestMessage {
					role: completions::Role::User,
					content: Some(content),
					..Default::default()
				});
			}
		}

		let tools: Vec<completions::Tool> = req
			.tools
			.iter()
			.flat_map(|t| t.function_declarations.iter().flatten())
			.map(|fd| completions::Tool {
				kind: "function".to_string(),
				function: completions::FunctionDefinition {
					name: fd.name.clone(),
					description: fd.description.clone(),
					parameters: fd.parameters.clone(),
					strict: None,
				},
			})
			.collect();

		let tool_choice = req
			.tool_config
			.as_ref()
			.and_then(|tc| tc.get("functionCallingConfig"))
			.and_then(|fcc| fcc.get("mode"))
			.and_then(|m| m.as_str())
			.map(|mode| match mode {
				"ANY" => completions::ToolChoice::Mode("required".to_string()),
				"NONE" => completions::ToolChoice::Mode("none".to_string()),
				_ => completions::ToolChoice::Mode("auto".to_string()),
			});

		let gc = req.generation_config.as_ref();
		let response_format = gc.and_then(|g| {
			g.response_mime_type.as_deref().map(|mime| match mime {
				"application/json" => match &g.response_schema {
					Some(schema) => completions::ResponseFormat {
						kind: "json_schema".to_string(),
						json_schema: Some(completions::JsonSchemaSpec {
							name: Some("response".to_string()),
							schema: Some(schema.clone()),
							strict: None,
						}),
					},
					None => completions::ResponseFormat {
						kind: "json_object".to_string(),
						json_schema: None,
					},
				},
				_ => completions::ResponseFormat {
					kind: "text".to_string(),
					json_schema: None,
				},
			})
		});

		let thinking = gc
			.and_then(|g| g.thinking_config.as_ref())
			.filter(|tc| tc.include_thoughts)
			.map(|tc| completions::ThinkingConfig::Enabled {
				budget_tokens: tc.thinking_budget,
			});

		let mut out = completions::Request {
			model: Some(model.to_string()),
			messages: msgs,
			tools: (!tools.is_empty()).then_some(tools),
			tool_choice,
			response_format,
			temperature: gc.and_then(|g| g.temperature),
			top_p: gc.and_then(|g| g.top_p),
			max_tokens: gc.and_then(|g| g.max_output_tokens),
			stop: gc.and_then(|g| (!g.stop_sequences.is_empty()).then(|| json!(g.stop_sequences))),
			stream: Some(stream),
			thinking,
			..Default::default()
		};
		ensure_stream_usage(&mut out);
		out
	}

	/// Translate an OpenAI chat completion into a Gemini response.
	pub fn translate_response(bytes: &Bytes) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<completions::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let gem = translate_response_internal(&resp);
		serde_json::to_vec(&gem).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &completions::Response) -> gemini::Response {
		let candidates = resp
			.choices
			.iter()
			.map(|choice| {
				let mut parts: Vec<gemini::Part> = Vec::new();
				if let Some(reasoning) = &choice.message.reasoning_content {
					parts.push(gemini::Part {
						text: Some(reasoning.clone()),
						thought: true,
						thought_signature: choice.message.signature.clone(),
						..Default::default()
					});
				}
				if let Some(content) = &choice.message.content {
					let text = content.text();
					if !text.is_empty() {
						parts.push(gemini::Part::text(text));
					}
				}
				for tc in &choice.message.tool_calls {
					parts.push(gemini::Part {
						function_call: Some(gemini::FunctionCall {
							name: tc.function.name.clone(),
							args: serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({})),
						}),
						..Default::default()
					});
				}
				gemini::Candidate {
					content: Some(gemini::Content {
						role: Some(gemini::ROLE_MODEL.to_string()),
						parts,
					}),
					finish_reason: choice
						.finish_reason
						.map(|f| super::super::gemini::finish_reason_from_openai(f).to_string()),
					index: Some(choice.index),
				}
			})
			.collect();
		gemini::Response {
			candidates,
			usage_metadata: resp
				.usage
				.as_ref()
				.map(|u| gemini::UsageMetadata::from_billing(&u.to_billing())),
			model_version: Some(resp.model.clone()),
			response_id: Some(resp.id.clone()),
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res = serde_json::from_slice::<completions::ErrorResponse>(bytes)
			.map_err(AIError::ResponseParsing)?;
		let code = res
			.error
			.code
			.as_ref()
			.and_then(|c| c.as_i64())
			.unwrap_or(500) as i32;
		let m = gemini::ErrorResponse {
			error: gemini::ErrorDetail {
				code,
				message: res.error.message,
				status: res.error.kind,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	#[derive(Default)]
	struct PendingTool {
		name: String,
		args: String,
	}

	/// OpenAI chunk stream to Gemini SSE. Gemini cannot express partial
	/// function-call JSON, so arguments buffer until the choice finishes;
	/// the final frame carries `usageMetadata`. Gemini streams end without a
	/// sentinel.
	pub fn translate_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
		let mut model = String::new();
		let mut tools: Vec<PendingTool> = Vec::new();
		let mut finish: Option<String> = None;
		let mut usage: Option<gemini::UsageMetadata> = None;
		parse::sse::json_transform_multi::<completions::StreamResponse, _>(
			b,
			buffer_limit,
			move |ev| match ev {
				Event::Data(Ok(chunk)) => {
					observe_chunk(&chunk, &log);
					if model.is_empty() {
						model = chunk.model.clone();
					}
					if let Some(u) = &chunk.usage {
						usage = Some(gemini::UsageMetadata::from_billing(&u.to_billing()));
					}
					let mut out = Vec::new();
					for choice in &chunk.choices {
						let mut parts: Vec<gemini::Part> = Vec::new();
						if let Some(reasoning) = &choice.delta.reasoning_content {
							parts.push(gemini::Part {
								text: Some(reasoning.clone()),
								thought: true,
								thought_signature: choice.delta.signature.clone(),
								..Default::default()
							});
						}
						if let Some(text) = &choice.delta.content {
							parts.push(gemini::Part::text(text.clone()));
						}
						for tc in &choice.delta.tool_calls {
							let idx = tc.index as usize;
							if tools.len() <= idx {
								tools.resize_with(idx + 1, PendingTool::default);
							}
							if let Some(name) = &tc.function.name {
								tools[idx].name = name.clone();
							}
							if let Some(args) = &tc.function.arguments {
								tools[idx].args.push_str(args);
							}
						}
						if !parts.is_empty() {
							out.push(OutFrame::data(&gemini::Response {
								candidates: vec![gemini::Candidate {
									content: Some(gemini::Content {
										role: Some(gemini::ROLE_MODEL.to_string()),
										parts,
									}),
									finish_reason: None,
									index: Some(choice.index),
								}],
								usage_metadata: None,
								model_version: (!model.is_empty()).then(|| model.clone()),
								response_id: None,
							}));
						}
						if let Some(f) = choice.finish_reason {
							finish = Some(super::super::gemini::finish_reason_from_openai(f).to_string());
						}
					}
					out
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					// Final frame: buffered tool calls (if any), the finish
					// reason, and usage.
					let parts: Vec<gemini::Part> = tools
						.drain(..)
						.filter(|t| !t.name.is_empty())
						.map(|t| gemini::Part {
							function_call: Some(gemini::FunctionCall {
								name: t.name,
								args: serde_json::from_str(&t.args).unwrap_or_else(|_| json!({})),
							}),
							..Default::default()
						})
						.collect();
					let finish_reason = if parts.is_empty() {
						finish.take().or_else(|| Some(gemini::FINISH_STOP.to_string()))
					} else {
						Some(gemini::FINISH_TOOL_CALLS.to_string())
					};
					vec![OutFrame::data(&gemini::Response {
						candidates: vec![gemini::Candidate {
							content: Some(gemini::Content {
								role: Some(gemini::ROLE_MODEL.to_string()),
								parts,
							}),
							finish_reason,
							index: Some(0),
						}],
						usage_metadata: usage.take(),
						model_version: (!model.is_empty()).then(|| model.clone()),
						response_id: None,
					})]
				},
			},
		)
	}
}

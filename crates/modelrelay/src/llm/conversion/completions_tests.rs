use http_body_util::BodyExt;
use serde_json::{Value, json};

use super::completions::{
	ThinkSplitter, apply_reasoner_quirks, ensure_stream_usage, from_gemini, from_messages,
	passthrough_stream,
};
use crate::http::Body;
use crate::llm::StreamInfo;
use crate::llm::types::completions;
use crate::telemetry::AsyncLog;

async fn collect(body: Body) -> String {
	let bytes = body.collect().await.unwrap().to_bytes();
	String::from_utf8(bytes.to_vec()).unwrap()
}

fn data_frames(s: &str) -> Vec<Value> {
	s.split("\n\n")
		.filter_map(|f| f.trim().strip_prefix("data: "))
		.filter(|d| *d != "[DONE]")
		.map(|d| serde_json::from_str(d).expect("frame must be json"))
		.collect()
}

fn event_frames(s: &str) -> Vec<(String, Value)> {
	s.split("\n\n")
		.filter(|f| !f.trim().is_empty())
		.map(|f| {
			let mut event = String::new();
			let mut data = String::new();
			for line in f.lines() {
				if let Some(v) = line.strip_prefix("event: ") {
					event = v.to_string();
				} else if let Some(v) = line.strip_prefix("data: ") {
					data = v.to_string();
				}
			}
			(event, serde_json::from_str(&data).expect("payload must be json"))
		})
		.collect()
}

#[test]
fn stream_usage_is_forced_on_unless_opted_out() {
	let mut req: completions::Request = serde_json::from_value(json!({
		"model": "gpt-4o", "stream": true,
		"messages": [{"role": "user", "content": "hi"}]
	}))
	.unwrap();
	ensure_stream_usage(&mut req);
	assert!(req.stream_options.as_ref().unwrap().include_usage);

	// An explicit opt-out is left alone.
	let mut req: completions::Request = serde_json::from_value(json!({
		"model": "gpt-4o", "stream": true,
		"stream_options": {"include_usage": false},
		"messages": [{"role": "user", "content": "hi"}]
	}))
	.unwrap();
	ensure_stream_usage(&mut req);
	assert!(!req.stream_options.as_ref().unwrap().include_usage);

	// Non-streaming requests stay untouched.
	let mut req: completions::Request = serde_json::from_value(json!({
		"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]
	}))
	.unwrap();
	ensure_stream_usage(&mut req);
	assert!(req.stream_options.is_none());
}

#[test]
fn reasoner_quirks_only_apply_to_deepseek_reasoner() {
	let mut req: completions::Request = serde_json::from_value(json!({
		"model": "deepseek-reasoner",
		"messages": [{"role": "user", "content": "hi"}]
	}))
	.unwrap();
	assert!(apply_reasoner_quirks(&mut req));
	assert_eq!(req.chat_template_kwargs.as_ref().unwrap()["thinking"], true);

	let mut req: completions::Request = serde_json::from_value(json!({
		"model": "deepseek-chat",
		"messages": [{"role": "user", "content": "hi"}]
	}))
	.unwrap();
	assert!(!apply_reasoner_quirks(&mut req));
	assert!(req.chat_template_kwargs.is_none());
}

#[test]
fn think_splitter_handles_tag_across_chunks() {
	let mut splitter = ThinkSplitter::default();
	let (r1, c1) = splitter.push("Hmm </th");
	assert_eq!(r1.as_deref(), Some("Hmm "));
	assert_eq!(c1, None);
	let (r2, c2) = splitter.push("ink> answer");
	assert_eq!(r2, None);
	assert_eq!(c2.as_deref(), Some(" answer"));
	assert_eq!(splitter.finish(), None);
}

#[test]
fn think_splitter_tag_in_one_chunk_and_never() {
	let mut splitter = ThinkSplitter::default();
	let (r, c) = splitter.push("a</think>b");
	assert_eq!(r.as_deref(), Some("a"));
	assert_eq!(c.as_deref(), Some("b"));
	// after the tag everything is content
	let (r, c) = splitter.push("</think>");
	assert_eq!(r, None);
	assert_eq!(c.as_deref(), Some("</think>"));

	let mut splitter = ThinkSplitter::default();
	let (r, _) = splitter.push("all reasoning <");
	assert_eq!(r.as_deref(), Some("all reasoning "));
	assert_eq!(splitter.finish().as_deref(), Some("<"));
}

#[tokio::test]
async fn reasoning_split_stream_redirects_content() {
	let upstream = concat!(
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-reasoner\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hmm </th\"}}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-reasoner\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ink> answer\"}}]}\n\n",
		"data: [DONE]\n\n",
	);
	let log = AsyncLog::<StreamInfo>::default();
	log.store(Some(StreamInfo::default()));
	let body = passthrough_stream(Body::from(upstream), 0, true, log);
	let out = collect(body).await;
	let frames = data_frames(&out);

	assert_eq!(frames[0]["choices"][0]["delta"]["reasoning_content"], "Hmm ");
	assert!(frames[0]["choices"][0]["delta"]["content"].is_null());
	assert_eq!(frames[1]["choices"][0]["delta"]["content"], " answer");
	assert!(frames[1]["choices"][0]["delta"]["reasoning_content"].is_null());
	// The marker itself reaches neither stream.
	assert!(!out.contains("think"));
	assert_eq!(out.matches("[DONE]").count(), 1);
}

#[test]
fn claude_request_becomes_openai_request() {
	let req: crate::llm::types::messages::Request = serde_json::from_value(json!({
		"model": "gpt-4o",
		"max_tokens": 512,
		"system": "be brief",
		"messages": [
			{"role": "user", "content": "hi"},
			{"role": "assistant", "content": [
				{"type": "tool_use", "id": "toolu_ok", "name": "alpha", "input": {"a": 1}}
			]},
			{"role": "user", "content": [
				{"type": "tool_result", "tool_use_id": "toolu_ok", "content": "ra"}
			]}
		],
		"stream": true
	}))
	.unwrap();
	let body = from_messages::translate(&req).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(v["messages"][0]["role"], "system");
	assert_eq!(v["messages"][0]["content"], "be brief");
	assert_eq!(v["messages"][2]["tool_calls"][0]["id"], "toolu_ok");
	assert_eq!(v["messages"][3]["role"], "tool");
	assert_eq!(v["messages"][3]["tool_call_id"], "toolu_ok");
	assert_eq!(v["max_completion_tokens"], 512);
	// Streaming Claude clients still get upstream usage accounting.
	assert_eq!(v["stream_options"]["include_usage"], true);
}

#[test]
fn openai_response_becomes_claude_response() {
	let resp = json!({
		"id": "chatcmpl-1", "object": "chat.completion", "created": 1,
		"model": "gpt-4o",
		"choices": [{"index": 0, "message": {
			"role": "assistant",
			"content": "hello",
			"reasoning_content": "let me think",
			"tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "alpha", "arguments": "{\"a\":1}"}}]
		}, "finish_reason": "tool_calls"}],
		"usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
	});
	let bytes = bytes::Bytes::from(serde_json::to_vec(&resp).unwrap());
	let out = from_messages::translate_response(&bytes).unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();
	let content = v["content"].as_array().unwrap();
	assert_eq!(content[0]["type"], "thinking");
	assert_eq!(content[1]["type"], "text");
	assert_eq!(content[2]["type"], "tool_use");
	assert_eq!(content[2]["input"]["a"], 1);
	assert_eq!(v["stop_reason"], "tool_use");
	assert_eq!(v["usage"]["input_tokens"], 5);
	assert_eq!(v["usage"]["output_tokens"], 7);
}

#[tokio::test]
async fn openai_stream_becomes_claude_events() {
	let upstream = concat!(
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"he\"}}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"y\"}}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2,\"total_tokens\":6}}\n\n",
		"data: [DONE]\n\n",
	);
	let log = AsyncLog::<StreamInfo>::default();
	log.store(Some(StreamInfo::default()));
	let body = from_messages::translate_stream(Body::from(upstream), 0, log);
	let out = collect(body).await;
	let frames = event_frames(&out);
	let names: Vec<&str> = frames.iter().map(|(e, _)| e.as_str()).collect();
	assert_eq!(
		names,
		vec![
			"message_start",
			"content_block_start",
			"content_block_delta",
			"content_block_delta",
			"content_block_stop",
			"message_delta",
			"message_stop",
		]
	);
	let (_, md) = &frames[5];
	assert_eq!(md["delta"]["stop_reason"], "end_turn");
	assert_eq!(md["usage"]["input_tokens"], 4);
	assert_eq!(md["usage"]["output_tokens"], 2);
	assert!(!out.contains("[DONE]"));
}

#[test]
fn gemini_request_becomes_openai_request() {
	let req: crate::llm::types::gemini::Request = serde_json::from_value(json!({
		"systemInstruction": {"role": "user", "parts": [{"text": "be good"}]},
		"contents": [
			{"role": "user", "parts": [{"text": "hello"}]},
			{"role": "model", "parts": [{"functionCall": {"name": "read_file", "args": {"path": "a"}}}]},
			{"role": "user", "parts": [{"functionResponse": {"name": "read_file", "response": {"data": "x"}}}]}
		],
		"generationConfig": {"temperature": 0.5, "maxOutputTokens": 100},
		"tools": [{"functionDeclarations": [{"name": "read_file", "parameters": {"type": "object"}}]}]
	}))
	.unwrap();
	let body = from_gemini::translate(&req, "gpt-4o", true).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();

	assert_eq!(v["messages"][0]["role"], "system");
	assert_eq!(v["messages"][1]["role"], "user");
	assert_eq!(v["messages"][2]["role"], "assistant");
	let call_id = v["messages"][2]["tool_calls"][0]["id"].as_str().unwrap();
	assert_eq!(v["messages"][3]["role"], "tool");
	// The tool response is matched to the model's call by function name.
	assert_eq!(v["messages"][3]["tool_call_id"], call_id);
	assert_eq!(v["temperature"], 0.5);
	assert_eq!(v["max_tokens"], 100);
	assert_eq!(v["stream"], true);
	assert_eq!(v["stream_options"]["include_usage"], true);
}

#[test]
fn orphan_function_response_gets_synthetic_call() {
	// A lone functionResponse with no preceding model call must still
	// produce a valid OpenAI transcript.
	let req: crate::llm::types::gemini::Request = serde_json::from_value(json!({
		"contents": [
			{"role": "user", "parts": [{"functionResponse": {"name": "read_file", "response": {"ok": true}}}]}
		]
	}))
	.unwrap();
	let body = from_gemini::translate(&req, "gpt-4o", false).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();
	let msgs = v["messages"].as_array().unwrap();
	assert_eq!(msgs.len(), 2);

	assert_eq!(msgs[0]["role"], "assistant");
	let call = &msgs[0]["tool_calls"][0];
	assert_eq!(call["function"]["name"], "read_file");
	assert_eq!(call["function"]["arguments"], "{}");
	let id = call["id"].as_str().unwrap();
	assert!(id.len() <= 40);

	assert_eq!(msgs[1]["role"], "tool");
	assert_eq!(msgs[1]["tool_call_id"], id);
	assert_eq!(msgs[1]["name"], "read_file");
}

#[tokio::test]
async fn openai_stream_becomes_gemini_frames() {
	let upstream = concat!(
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"alpha\",\"arguments\":\"{\\\"a\\\"\"}}]}}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\":1}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n\n",
		"data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":3,\"total_tokens\":5}}\n\n",
		"data: [DONE]\n\n",
	);
	let log = AsyncLog::<StreamInfo>::default();
	log.store(Some(StreamInfo::default()));
	let body = from_gemini::translate_stream(Body::from(upstream), 0, log);
	let out = collect(body).await;
	let frames = data_frames(&out);

	assert_eq!(frames[0]["candidates"][0]["content"]["parts"][0]["text"], "hi");
	// Partial tool arguments never leak; the final frame carries the parsed
	// call, the finish reason, and usage.
	let last = frames.last().unwrap();
	let fc = &last["candidates"][0]["content"]["parts"][0]["functionCall"];
	assert_eq!(fc["name"], "alpha");
	assert_eq!(fc["args"]["a"], 1);
	assert_eq!(last["candidates"][0]["finishReason"], "TOOL_CALLS");
	assert_eq!(last["usageMetadata"]["promptTokenCount"], 2);
	assert_eq!(last["usageMetadata"]["totalTokenCount"], 5);
	assert!(!out.contains("[DONE]"));
}

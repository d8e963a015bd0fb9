use http_body_util::BodyExt;
use serde_json::{Value, json};

use super::sse::{self, Event, Frame, FrameParser, OutFrame};
use crate::http::Body;

#[test]
fn scanner_reassembles_split_frames() {
	let mut parser = FrameParser::new(1024);
	let mut out = Vec::new();
	parser.push(b"data: {\"a\":", &mut out).unwrap();
	assert!(out.is_empty());
	parser.push(b"1}\n\ndata: {\"b\":2}\n\n", &mut out).unwrap();
	assert_eq!(
		out,
		vec![
			Frame {
				event: None,
				data: "{\"a\":1}".to_string()
			},
			Frame {
				event: None,
				data: "{\"b\":2}".to_string()
			},
		]
	);
}

#[test]
fn scanner_reads_event_names_and_crlf() {
	let mut parser = FrameParser::new(1024);
	let mut out = Vec::new();
	parser
		.push(b"event: message_start\r\ndata: {}\r\n\r\n", &mut out)
		.unwrap();
	assert_eq!(
		out,
		vec![Frame {
			event: Some("message_start".to_string()),
			data: "{}".to_string()
		}]
	);
}

#[test]
fn scanner_ignores_comments_and_retry() {
	let mut parser = FrameParser::new(1024);
	let mut out = Vec::new();
	parser
		.push(b": keepalive\nretry: 100\ndata: 1\n\n", &mut out)
		.unwrap();
	assert_eq!(out.len(), 1);
	assert_eq!(out[0].data, "1");
}

#[test]
fn scanner_enforces_limit() {
	let mut parser = FrameParser::new(8);
	let mut out = Vec::new();
	let err = parser.push(b"data: 123456789abcdef", &mut out);
	assert!(err.is_err());
}

#[test]
fn scanner_flushes_unterminated_tail() {
	let mut parser = FrameParser::new(1024);
	let mut out = Vec::new();
	parser.push(b"data: {\"a\":1}", &mut out).unwrap();
	parser.finish(&mut out);
	assert_eq!(out.len(), 1);
	assert_eq!(out[0].data, "{\"a\":1}");
}

#[tokio::test]
async fn transform_rewrites_and_terminates_once() {
	let body = Body::from("data: {\"n\":1}\n\ndata: {\"n\":2}\n\ndata: [DONE]\n\n");
	let out = sse::json_transform::<Value, Value, _>(body, 0, |ev| {
		let v = ev.ok()?;
		Some(json!({"seen": v["n"]}))
	});
	let bytes = out.collect().await.unwrap().to_bytes();
	let s = std::str::from_utf8(&bytes).unwrap();
	assert_eq!(
		s,
		"data: {\"seen\":1}\n\ndata: {\"seen\":2}\n\ndata: [DONE]\n\n"
	);
	assert_eq!(s.matches("[DONE]").count(), 1);
}

#[tokio::test]
async fn transform_flushes_on_eof_without_sentinel() {
	// Gemini streams end without [DONE]; Done must still fire exactly once.
	let body = Body::from("data: {\"n\":1}\n\n");
	let out = sse::json_transform_multi::<Value, _>(body, 0, |ev| match ev {
		Event::Data(_) => vec![],
		Event::Done => vec![OutFrame::data(&json!({"flushed": true})), OutFrame::done()],
	});
	let bytes = out.collect().await.unwrap().to_bytes();
	let s = std::str::from_utf8(&bytes).unwrap();
	assert_eq!(s, "data: {\"flushed\":true}\n\ndata: [DONE]\n\n");
}

#[tokio::test]
async fn passthrough_preserves_bytes() {
	let raw = "event: ping\ndata: {\"type\":\"ping\"}\n\ndata: {\"type\":\"x\"}\n\n";
	let body = Body::from(raw);
	let mut seen = 0;
	let seen_ptr = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
	let c = seen_ptr.clone();
	let out = sse::json_passthrough::<Value, _>(body, 0, move |ev| {
		if ev.is_some() {
			c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
		}
	});
	let bytes = out.collect().await.unwrap().to_bytes();
	assert_eq!(std::str::from_utf8(&bytes).unwrap(), raw);
	seen += seen_ptr.load(std::sync::atomic::Ordering::SeqCst);
	assert_eq!(seen, 2);
}

#[tokio::test]
async fn ndjson_lines_become_events() {
	let body = Body::from("{\"n\":1}\n{\"n\":2}\n");
	let out = super::ndjson::json_transform_multi::<Value, _>(body, 0, |ev| match ev {
		Event::Data(Ok(v)) => vec![OutFrame::data(&json!({"seen": v["n"]}))],
		Event::Data(Err(_)) => vec![],
		Event::Done => vec![OutFrame::done()],
	});
	let bytes = out.collect().await.unwrap().to_bytes();
	let s = std::str::from_utf8(&bytes).unwrap();
	assert_eq!(
		s,
		"data: {\"seen\":1}\n\ndata: {\"seen\":2}\n\ndata: [DONE]\n\n"
	);
}

//! Identifier generation for translated artifacts. OpenAI consumers reject
//! tool-call ids longer than 40 characters or outside `[A-Za-z0-9_-]`, so
//! ids crossing a dialect boundary are re-issued rather than passed through.

use uuid::Uuid;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Unpadded base32 over the UUID bytes: 26 characters, comfortably inside
/// the 40-char budget with the `call_` prefix.
fn base32_uuid() -> String {
	let bytes = *Uuid::new_v4().as_bytes();
	let mut out = String::with_capacity(26);
	let mut acc: u32 = 0;
	let mut bits: u32 = 0;
	for b in bytes {
		acc = (acc << 8) | b as u32;
		bits += 8;
		while bits >= 5 {
			bits -= 5;
			out.push(BASE32_ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
		}
	}
	if bits > 0 {
		out.push(BASE32_ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
	}
	out
}

pub const MAX_TOOL_CALL_ID_LEN: usize = 40;

pub fn new_call_id() -> String {
	format!("call_{}", base32_uuid())
}

pub fn new_completion_id() -> String {
	format!("chatcmpl-{}", Uuid::new_v4().simple())
}

pub fn new_message_id() -> String {
	format!("msg_{}", Uuid::new_v4().simple())
}

pub fn new_response_id() -> String {
	format!("resp_{}", Uuid::new_v4().simple())
}

pub fn is_valid_call_id(id: &str) -> bool {
	!id.is_empty()
		&& id.len() <= MAX_TOOL_CALL_ID_LEN
		&& id
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Keep a client id when it fits OpenAI's constraints, otherwise mint a
/// fresh one.
pub fn sanitize_call_id(id: &str) -> String {
	if is_valid_call_id(id) {
		id.to_string()
	} else {
		new_call_id()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_ids_fit_openai_constraints() {
		for _ in 0..64 {
			let id = new_call_id();
			assert!(is_valid_call_id(&id), "{id}");
			assert!(id.starts_with("call_"));
			assert_eq!(id.len(), 31);
		}
	}

	#[test]
	fn sanitize_replaces_oversized_ids() {
		let long = "x".repeat(41);
		let replaced = sanitize_call_id(&long);
		assert_ne!(replaced, long);
		assert!(is_valid_call_id(&replaced));

		assert_eq!(sanitize_call_id("toolu_abc123"), "toolu_abc123");
		assert_ne!(sanitize_call_id("bad id!"), "bad id!");
	}
}

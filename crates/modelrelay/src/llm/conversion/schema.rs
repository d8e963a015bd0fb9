//! JSON-schema cleanup for tool parameters. Providers accept different
//! subsets of JSON Schema; emitting an unsupported keyword fails the whole
//! request upstream, so schemas are scrubbed recursively on the way out.

use serde_json::Value;

/// Keywords Gemini's `functionDeclarations.parameters` rejects outright.
const GEMINI_BANNED_KEYS: &[&str] = &[
	"additionalProperties",
	"$schema",
	"$id",
	"$ref",
	"$defs",
	"exclusiveMinimum",
	"exclusiveMaximum",
];

/// `format` values Gemini understands; everything else is dropped.
const GEMINI_ALLOWED_FORMATS: &[&str] = &["enum", "date-time"];

/// Scrub a schema for Gemini. Banned keywords are removed at every nesting
/// level, `format` survives only for the whitelisted values, and degenerate
/// `required` entries are dropped.
pub fn clean_for_gemini(v: &Value) -> Value {
	match v {
		Value::Object(map) => {
			let mut out = serde_json::Map::with_capacity(map.len());
			for (k, val) in map {
				if GEMINI_BANNED_KEYS.contains(&k.as_str()) {
					continue;
				}
				if k == "format" {
					let keep = val
						.as_str()
						.is_some_and(|f| GEMINI_ALLOWED_FORMATS.contains(&f));
					if !keep {
						continue;
					}
				}
				if k == "required" && required_is_degenerate(val) {
					continue;
				}
				out.insert(k.clone(), clean_for_gemini(val));
			}
			Value::Object(out)
		},
		Value::Array(items) => Value::Array(items.iter().map(clean_for_gemini).collect()),
		other => other.clone(),
	}
}

/// The Responses API rejects `"required": null` and `"required": []`; strip
/// both recursively while leaving everything else alone.
pub fn clean_required(v: &Value) -> Value {
	match v {
		Value::Object(map) => {
			let mut out = serde_json::Map::with_capacity(map.len());
			for (k, val) in map {
				if k == "required" && required_is_degenerate(val) {
					continue;
				}
				out.insert(k.clone(), clean_required(val));
			}
			Value::Object(out)
		},
		Value::Array(items) => Value::Array(items.iter().map(clean_required).collect()),
		other => other.clone(),
	}
}

fn required_is_degenerate(v: &Value) -> bool {
	match v {
		Value::Null => true,
		Value::Array(items) => items.is_empty(),
		_ => false,
	}
}

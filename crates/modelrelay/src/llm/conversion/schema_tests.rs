use serde_json::json;

use super::schema::{clean_for_gemini, clean_required};

#[test]
fn gemini_cleanup_strips_banned_keywords_recursively() {
	let dirty = json!({
		"$schema": "https://json-schema.org/draft/2020-12/schema",
		"$id": "root",
		"type": "object",
		"additionalProperties": false,
		"properties": {
			"path": {"type": "string", "format": "uri"},
			"when": {"type": "string", "format": "date-time"},
			"depth": {"type": "integer", "exclusiveMinimum": 0, "exclusiveMaximum": 10},
			"nested": {
				"type": "object",
				"$defs": {"x": {"type": "string"}},
				"properties": {
					"inner": {"$ref": "#/x", "type": "string"}
				}
			}
		},
		"required": ["path"]
	});
	let clean = clean_for_gemini(&dirty);

	for key in [
		"$schema",
		"$id",
		"additionalProperties",
		"$defs",
		"$ref",
		"exclusiveMinimum",
		"exclusiveMaximum",
	] {
		assert!(
			!serde_json::to_string(&clean).unwrap().contains(key),
			"{key} must not survive cleanup"
		);
	}
	// format survives only for the whitelist
	assert!(clean["properties"]["path"].get("format").is_none());
	assert_eq!(clean["properties"]["when"]["format"], "date-time");
	// populated required is preserved
	assert_eq!(clean["required"], json!(["path"]));
}

#[test]
fn gemini_cleanup_walks_arrays() {
	let dirty = json!({
		"anyOf": [
			{"type": "string", "$schema": "x"},
			{"type": "object", "additionalProperties": true}
		]
	});
	let clean = clean_for_gemini(&dirty);
	assert!(clean["anyOf"][0].get("$schema").is_none());
	assert!(clean["anyOf"][1].get("additionalProperties").is_none());
}

#[test]
fn degenerate_required_is_dropped() {
	let null_required = json!({"type": "object", "required": null});
	assert!(clean_required(&null_required).get("required").is_none());
	assert!(clean_for_gemini(&null_required).get("required").is_none());

	let empty_required = json!({"type": "object", "required": []});
	assert!(clean_required(&empty_required).get("required").is_none());

	let kept = json!({"type": "object", "required": ["x"], "properties": {
		"x": {"type": "object", "required": []}
	}});
	let clean = clean_required(&kept);
	assert_eq!(clean["required"], json!(["x"]));
	assert!(clean["properties"]["x"].get("required").is_none());
}

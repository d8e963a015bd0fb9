use serde::Serialize;
use serde::de::DeserializeOwned;

/// Convert between two serde representations of the same JSON document.
/// Used to move between passthrough-preserving and fully typed views of a
/// wire format without touching unrelated fields.
pub fn convert<T: Serialize, U: DeserializeOwned>(t: &T) -> Result<U, serde_json::Error> {
	let v = serde_json::to_value(t)?;
	serde_json::from_value(v)
}

/// Serialize to a compact byte vector.
pub fn to_vec<T: Serialize>(t: &T) -> Result<Vec<u8>, serde_json::Error> {
	serde_json::to_vec(t)
}

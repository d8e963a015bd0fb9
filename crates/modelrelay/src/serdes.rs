pub use macro_rules_attribute::apply;

/// Standard derive set for config-shaped types. Used as `#[apply(schema!)]`.
#[macro_export]
macro_rules! schema {
	($item:item) => {
		#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
		#[serde(rename_all = "camelCase")]
		$item
	};
}
pub use schema;

pub fn is_default<T: Default + PartialEq>(t: &T) -> bool {
	*t == T::default()
}

//! Channel and model configuration as seen by the request path.
//!
//! The registry that creates and edits these records lives outside this
//! crate; requests only ever read them. Routing (which channel serves a
//! given mode+model) is likewise an external concern consumed through the
//! [`ChannelPicker`] seam.

use std::sync::Arc;

use rand::RngExt;
use relay_core::prelude::*;
use rust_decimal::Decimal;

use crate::llm::Mode;
use crate::serdes::{apply, schema};

/// A configured upstream endpoint. Immutable for the duration of a request;
/// the mutable usage tallies live in the billing aggregator.
#[apply(schema!)]
pub struct Channel {
	pub id: u64,
	pub name: Strng,
	#[serde(rename = "type")]
	pub provider: ProviderKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub base_url: Option<Strng>,
	pub key: Strng,
	#[serde(default)]
	pub supported_modes: Vec<Mode>,
	#[serde(default)]
	pub supported_models: Vec<Strng>,
	#[serde(default)]
	pub priority: u32,
}

impl Channel {
	pub fn supports(&self, mode: Mode, model: &str) -> bool {
		(self.supported_modes.is_empty() || self.supported_modes.contains(&mode))
			&& self.supported_models.iter().any(|m| m.as_str() == model)
	}
}

#[apply(schema!)]
#[derive(Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
	OpenAi,
	AzureOpenAi,
	Anthropic,
	Gemini,
	VertexAi,
	Ollama,
	Zhipu,
	Baidu,
	SiliconFlow,
	MiniMax,
	StreamLake,
	Cloudflare,
}

/// Per-token unit prices, in account currency per token. `web_search` is per
/// call rather than per token.
#[apply(schema!)]
#[derive(Default, PartialEq)]
pub struct Price {
	#[serde(default)]
	pub input: Decimal,
	#[serde(default)]
	pub output: Decimal,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_input: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_creation: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_input: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_output: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub web_search: Option<Decimal>,
}

/// Selects an alternate price vector when the request's input-token count
/// falls inside `[min_input_tokens, max_input_tokens)`.
#[apply(schema!)]
#[derive(PartialEq)]
pub struct ConditionalPrice {
	#[serde(default)]
	pub min_input_tokens: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_input_tokens: Option<u64>,
	pub price: Price,
}

#[apply(schema!)]
pub struct ModelConfig {
	pub name: Strng,
	#[serde(rename = "type")]
	pub mode: Mode,
	pub owner: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_context_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vision: Option<bool>,
	#[serde(default)]
	pub price: Price,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub conditional_prices: Vec<ConditionalPrice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rpm: Option<u64>,
}

impl ModelConfig {
	/// Resolve the effective price vector for a request with the given
	/// input-token count.
	pub fn price_for(&self, input_tokens: u64) -> &Price {
		for cp in &self.conditional_prices {
			let below_max = cp.max_input_tokens.is_none_or(|max| input_tokens < max);
			if input_tokens >= cp.min_input_tokens && below_max {
				return &cp.price;
			}
		}
		&self.price
	}
}

/// The routing collaborator: given a client protocol and model name, pick an
/// eligible channel. Implementations outside this crate apply quota and
/// health signals; [`StaticPicker`] is the reference policy.
pub trait ChannelPicker: Send + Sync {
	fn pick(&self, mode: Mode, model: &str) -> Option<Arc<Channel>>;
}

/// Priority-weighted random selection over eligible channels. Two candidates
/// are sampled and the higher priority wins, which avoids starving low
/// priority channels entirely.
pub struct StaticPicker {
	channels: Vec<Arc<Channel>>,
}

impl StaticPicker {
	pub fn new(channels: Vec<Arc<Channel>>) -> Self {
		StaticPicker { channels }
	}
}

impl ChannelPicker for StaticPicker {
	fn pick(&self, mode: Mode, model: &str) -> Option<Arc<Channel>> {
		let eligible: Vec<&Arc<Channel>> = self
			.channels
			.iter()
			.filter(|c| c.supports(mode, model))
			.collect();
		if eligible.is_empty() {
			return None;
		}
		let mut rng = rand::rng();
		let a = rng.random_range(0..eligible.len());
		let b = rng.random_range(0..eligible.len());
		let pick = if eligible[a].priority >= eligible[b].priority {
			a
		} else {
			b
		};
		Some(eligible[pick].clone())
	}
}

#[cfg(test)]
mod tests {
	use rust_decimal::Decimal;

	use super::*;

	fn model_with_tiers() -> ModelConfig {
		ModelConfig {
			name: strng::literal!("gemini-2.5-pro"),
			mode: Mode::ChatCompletions,
			owner: strng::literal!("google"),
			max_context_tokens: Some(1_000_000),
			max_output_tokens: Some(65_536),
			tool_choice: Some(true),
			vision: Some(true),
			price: Price {
				input: Decimal::new(125, 8),
				output: Decimal::new(1000, 8),
				..Default::default()
			},
			conditional_prices: vec![ConditionalPrice {
				min_input_tokens: 200_000,
				max_input_tokens: None,
				price: Price {
					input: Decimal::new(250, 8),
					output: Decimal::new(1500, 8),
					..Default::default()
				},
			}],
			rpm: None,
		}
	}

	#[test]
	fn conditional_price_selects_by_input_range() {
		let m = model_with_tiers();
		assert_eq!(m.price_for(1000).input, Decimal::new(125, 8));
		assert_eq!(m.price_for(199_999).input, Decimal::new(125, 8));
		assert_eq!(m.price_for(200_000).input, Decimal::new(250, 8));
	}

	#[test]
	fn picker_only_returns_eligible_channels() {
		let mk = |id, modes: Vec<Mode>, models: Vec<&str>, priority| {
			Arc::new(Channel {
				id,
				name: strng::format!("ch-{id}"),
				provider: ProviderKind::OpenAi,
				base_url: None,
				key: strng::literal!("sk-test"),
				supported_modes: modes,
				supported_models: models.into_iter().map(strng::new).collect(),
				priority,
			})
		};
		let picker = StaticPicker::new(vec![
			mk(1, vec![Mode::ChatCompletions], vec!["gpt-4o"], 10),
			mk(2, vec![Mode::Embeddings], vec!["gpt-4o"], 99),
		]);
		for _ in 0..32 {
			let got = picker.pick(Mode::ChatCompletions, "gpt-4o").unwrap();
			assert_eq!(got.id, 1);
		}
		assert!(picker.pick(Mode::ChatCompletions, "nope").is_none());
	}
}

//! Channel-specific message shape, built from a [`RenderedResponse`].
//! Every channel adapter implements [`ChannelFormatter`] against the
//! same small block vocabulary so the renderer stays channel-neutral.

use serde::{Deserialize, Serialize};

use crate::renderer::RenderedResponse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { content: String },
    Fields { items: Vec<(String, String)> },
    Actions { buttons: Vec<String> },
}

pub trait ChannelFormatter {
    /// Converts a rendered response into the channel's native message
    /// shape. Always includes a text-only fallback for clients that
    /// can't render the structured form.
    fn format(&self, response: &RenderedResponse) -> serde_json::Value;

    /// Reconstructs the block vocabulary from a previously formatted
    /// message, for the render/parse round-trip.
    fn parse_blocks(&self, message: &serde_json::Value) -> Vec<Block>;
}

/// A generic card formatter: `{text_fallback, elements: [Block]}`. Real
/// channel adapters (e.g. a chat platform's interactive-card schema)
/// wrap this same vocabulary in their own envelope.
pub struct CardFormatter;

impl CardFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CardFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelFormatter for CardFormatter {
    fn format(&self, response: &RenderedResponse) -> serde_json::Value {
        let blocks: Vec<Block> = response
            .blocks
            .as_ref()
            .and_then(|b| serde_json::from_value::<Vec<Block>>(b.clone()).ok())
            .unwrap_or_else(|| vec![Block::Text { content: response.text_fallback.clone() }]);

        serde_json::json!({
            "text_fallback": response.text_fallback,
            "elements": blocks,
        })
    }

    fn parse_blocks(&self, message: &serde_json::Value) -> Vec<Block> {
        message["elements"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderMeta;

    #[test]
    fn format_falls_back_to_a_single_text_block() {
        let formatter = CardFormatter::new();
        let response =
            RenderedResponse { text_fallback: "hi".to_string(), blocks: None, meta: RenderMeta { ok: true, skills_run: 1 } };
        let card = formatter.format(&response);
        assert_eq!(card["text_fallback"], "hi");
        assert_eq!(card["elements"][0]["type"], "text");
    }

    #[test]
    fn render_of_parsed_card_reproduces_the_original() {
        let formatter = CardFormatter::new();
        let original = RenderedResponse {
            text_fallback: "共找到 2 条记录".to_string(),
            blocks: Some(serde_json::json!([
                { "type": "text", "content": "共找到 2 条记录" },
                { "type": "actions", "buttons": ["确认", "取消"] },
            ])),
            meta: RenderMeta { ok: true, skills_run: 1 },
        };
        let card = formatter.format(&original);

        let blocks = formatter.parse_blocks(&card);
        let rebuilt = RenderedResponse {
            text_fallback: card["text_fallback"].as_str().unwrap().to_string(),
            blocks: Some(serde_json::to_value(&blocks).unwrap()),
            meta: original.meta.clone(),
        };
        let round_tripped = formatter.format(&rebuilt);

        assert_eq!(round_tripped, card);
    }
}

use serde::{Deserialize, Serialize};

/// Outbound message objects in the platform's JSON shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        original_content_url: String,
        preview_image_url: String,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image message that uses the same URL for the full image and its preview.
    pub fn image(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::Image { original_content_url: url.clone(), preview_image_url: url }
    }
}

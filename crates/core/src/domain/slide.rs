use serde::{Deserialize, Serialize};

use crate::domain::channel::ChannelId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidePage {
    pub channel_id: ChannelId,
    pub page: u32,
    pub url: String,
    pub current: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PrevNext {
    pub prev: u32,
    pub next: u32,
}

impl PrevNext {
    /// Circular navigation over pages `1..=last`.
    pub fn around(page: u32, last: u32) -> Self {
        let prev = if page > 1 { page - 1 } else { last };
        let next = if page < last { page + 1 } else { 1 };
        Self { prev, next }
    }
}

/// Everything the slide page view needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlideView {
    pub url: String,
    pub page: u32,
    pub prev: u32,
    pub next: u32,
}

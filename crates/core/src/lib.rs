pub mod channels;
pub mod config;
pub mod domain;
pub mod errors;
pub mod slides;

pub use channels::{ChannelLookup, ChannelProvisioning, ChannelService, ChannelStore};
pub use domain::channel::{BotInfo, Channel, ChannelId, IssuedAccessToken, NewChannel};
pub use domain::slide::{PrevNext, SlidePage, SlideView};
pub use errors::{ErrorCategory, ErrorKind, ServiceError};
pub use slides::{EnabledSlideLookup, SlidePageStore, SlideService};

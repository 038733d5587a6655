pub mod channel;
pub mod slide;

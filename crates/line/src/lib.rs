//! LINE integration - webhook intake and message delivery
//!
//! This crate provides the LINE Messaging API surface for deckbot:
//! - **Signatures** (`signature`) - `x-line-signature` HMAC-SHA256 checks
//! - **Events** (`events`) - Webhook body decoding into normalized events
//! - **Webhook** (`webhook`) - Channel lookup, verification and per-event fan-out
//! - **Bus** (`bus`) - Event bus detail payloads and publishers
//! - **Dispatch** (`dispatch`) - Reply-then-push delivery
//! - **Commands** (`commands`) - The slide download command and its bus worker
//!
//! # Architecture
//!
//! ```text
//! POST /webhook → WebhookOrchestrator → verify → decode
//!                        ↓ publish                 ↓ reply
//!                   EventPublisher      SlideCommandResponder → MessageDispatcher → LineClient
//! ```
//!
//! # Key Types
//!
//! - `WebhookOrchestrator` - Fail-closed inbound pipeline
//! - `MessageDispatcher` - Reply with push fallback
//! - `LineClient` - HTTP transport and channel provisioning
//! - `SlideCommandWorker` - Bus consumer for the slide command

pub mod bus;
pub mod client;
pub mod commands;
pub mod dispatch;
pub mod events;
pub mod messages;
pub mod signature;
pub mod webhook;

pub use bus::{BusEvent, BusEventDetail, EventPublisher, HttpEventBus, NoopEventPublisher};
pub use client::LineClient;
pub use commands::{SlideCommandResponder, SlideCommandWorker, WorkerOutcome};
pub use dispatch::{MessageDispatcher, MessagingTransport, OutboundMessageRequest};
pub use events::{InboundWebhook, LineEventType, NormalizedEvent};
pub use messages::OutboundMessage;
pub use signature::{HmacSignatureVerifier, SignatureVerifier, SIGNATURE_HEADER};
pub use webhook::{InboundOutcome, WebhookOrchestrator};

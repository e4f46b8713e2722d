//! # courier-core
//!
//! Shared leaf types for the courier relay:
//!
//! - The [`Message`](message::Message) wire envelope exchanged with clients
//!   and the external broker
//! - [`Role`](message::Role) — visitor or agent
//! - Branded ID newtypes ([`ids`])

#![deny(unsafe_code)]

pub mod ids;
pub mod message;

pub use ids::{ConnectionId, ConversationId, PeerId, WebsiteId};
pub use message::{Message, MessageType, Role};

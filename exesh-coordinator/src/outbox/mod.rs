//! Outbox delivery
//!
//! Messages are written to the outbox together with the execution update
//! that produced them; the sender drains it through a [`MessagePublisher`].

pub mod publisher;
pub mod sender;

pub use publisher::{LogPublisher, MessagePublisher, PublishError, WebhookPublisher};
pub use sender::{OutboxSender, SenderSettings};

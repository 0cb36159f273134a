//! Platform abstraction: the capability interface the interview engine
//! calls out to, and the inbound events it reacts to.

pub mod console;
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

pub use console::ConsoleSource;
pub use memory::MemoryPlatform;

/// Identifier of a participant on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Reference to a platform channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelRef(String);

impl ChannelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Operations the engine invokes but does not implement.
///
/// Every call may block on the network; callers never hold a session lock
/// across one.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn grant_role(&self, participant: &ParticipantId, role: &str) -> Result<(), CapabilityError>;

    async fn remove_role(&self, participant: &ParticipantId, role: &str) -> Result<(), CapabilityError>;

    async fn set_display_name(
        &self,
        participant: &ParticipantId,
        name: &str,
    ) -> Result<(), CapabilityError>;

    /// Open a channel only the participant (and the bot) can see.
    async fn create_private_channel(
        &self,
        participant: &ParticipantId,
    ) -> Result<ChannelRef, CapabilityError>;

    async fn delete_channel(&self, channel: &ChannelRef) -> Result<(), CapabilityError>;

    async fn send_message(&self, channel: &ChannelRef, text: &str) -> Result<(), CapabilityError>;

    /// Non-bot members of a tenant.
    async fn list_members(&self, tenant: &str) -> Result<Vec<ParticipantId>, CapabilityError>;
}

/// Events delivered by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    ParticipantJoined {
        participant: ParticipantId,
    },
    MessageReceived {
        participant: ParticipantId,
        channel: ChannelRef,
        text: String,
        /// Platform message id, when the adapter has one. Used to drop
        /// redelivered messages.
        message_id: Option<String>,
    },
    /// Text posted in the administrative command channel.
    AdminCommand {
        channel: ChannelRef,
        text: String,
    },
}

impl InboundEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::MessageReceived { .. } => "message_received",
            Self::AdminCommand { .. } => "admin_command",
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A source of inbound events (a platform gateway, a console, a test feed).
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<EventStream, CapabilityError>;
}

//! In-memory platform: keeps members, roles, names, and channels in a map.
//!
//! Used by the local console runner and by tests. Individual operations can
//! be made to fail to exercise capability-failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{ChannelRef, ParticipantId, Platform};
use crate::error::CapabilityError;

/// A message the platform was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelRef,
    pub text: String,
}

#[derive(Default)]
struct MemoryState {
    members: BTreeSet<ParticipantId>,
    roles: HashMap<ParticipantId, BTreeSet<String>>,
    display_names: HashMap<ParticipantId, String>,
    open_channels: BTreeMap<ChannelRef, ParticipantId>,
    deleted_channels: Vec<ChannelRef>,
    channels_created: usize,
    messages: Vec<SentMessage>,
    failing: HashSet<String>,
}

pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
    echo: bool,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            echo: false,
        }
    }

    /// Print every sent message to stdout.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_member(&self, participant: &ParticipantId) {
        self.state().members.insert(participant.clone());
    }

    /// Make every call to `operation` (e.g. `"grant_role"`) fail.
    pub fn fail_on(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.state().failing.remove(operation);
    }

    pub fn roles_of(&self, participant: &ParticipantId) -> BTreeSet<String> {
        self.state()
            .roles
            .get(participant)
            .cloned()
            .unwrap_or_default()
    }

    pub fn display_name(&self, participant: &ParticipantId) -> Option<String> {
        self.state().display_names.get(participant).cloned()
    }

    /// The open channel belonging to a participant, if any.
    pub fn channel_of(&self, participant: &ParticipantId) -> Option<ChannelRef> {
        self.state()
            .open_channels
            .iter()
            .find(|(_, owner)| *owner == participant)
            .map(|(channel, _)| channel.clone())
    }

    pub fn open_channels(&self) -> Vec<ChannelRef> {
        self.state().open_channels.keys().cloned().collect()
    }

    pub fn deleted_channels(&self) -> Vec<ChannelRef> {
        self.state().deleted_channels.clone()
    }

    pub fn channels_created(&self) -> usize {
        self.state().channels_created
    }

    pub fn messages_in(&self, channel: &ChannelRef) -> Vec<String> {
        self.state()
            .messages
            .iter()
            .filter(|m| &m.channel == channel)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.state().messages.clone()
    }

    fn guard(state: &MemoryState, operation: &str) -> Result<(), CapabilityError> {
        if state.failing.contains(operation) {
            return Err(CapabilityError::Failed {
                operation: operation.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn grant_role(&self, participant: &ParticipantId, role: &str) -> Result<(), CapabilityError> {
        let mut state = self.state();
        Self::guard(&state, "grant_role")?;
        state
            .roles
            .entry(participant.clone())
            .or_default()
            .insert(role.to_string());
        debug!(participant = %participant, role = %role, "Role granted");
        Ok(())
    }

    async fn remove_role(&self, participant: &ParticipantId, role: &str) -> Result<(), CapabilityError> {
        let mut state = self.state();
        Self::guard(&state, "remove_role")?;
        if let Some(roles) = state.roles.get_mut(participant) {
            roles.remove(role);
        }
        Ok(())
    }

    async fn set_display_name(
        &self,
        participant: &ParticipantId,
        name: &str,
    ) -> Result<(), CapabilityError> {
        let mut state = self.state();
        Self::guard(&state, "set_display_name")?;
        state
            .display_names
            .insert(participant.clone(), name.to_string());
        Ok(())
    }

    async fn create_private_channel(
        &self,
        participant: &ParticipantId,
    ) -> Result<ChannelRef, CapabilityError> {
        let mut state = self.state();
        Self::guard(&state, "create_private_channel")?;
        state.channels_created += 1;
        let channel = ChannelRef::new(format!(
            "registration-{}-{}",
            participant.as_str().to_lowercase(),
            state.channels_created
        ));
        state
            .open_channels
            .insert(channel.clone(), participant.clone());
        Ok(channel)
    }

    async fn delete_channel(&self, channel: &ChannelRef) -> Result<(), CapabilityError> {
        let mut state = self.state();
        Self::guard(&state, "delete_channel")?;
        if state.open_channels.remove(channel).is_none() {
            return Err(CapabilityError::NotFound {
                operation: "delete_channel".into(),
                what: format!("channel {channel}"),
            });
        }
        state.deleted_channels.push(channel.clone());
        Ok(())
    }

    async fn send_message(&self, channel: &ChannelRef, text: &str) -> Result<(), CapabilityError> {
        let mut state = self.state();
        Self::guard(&state, "send_message")?;
        if self.echo {
            println!("[{channel}] {text}\n");
        }
        state.messages.push(SentMessage {
            channel: channel.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn list_members(&self, _tenant: &str) -> Result<Vec<ParticipantId>, CapabilityError> {
        let state = self.state();
        Self::guard(&state, "list_members")?;
        Ok(state.members.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_lifecycle() {
        let platform = MemoryPlatform::new();
        let alice = ParticipantId::from("Alice");

        let channel = platform.create_private_channel(&alice).await.unwrap();
        assert_eq!(channel.as_str(), "registration-alice-1");
        assert_eq!(platform.channel_of(&alice), Some(channel.clone()));

        platform.delete_channel(&channel).await.unwrap();
        assert!(platform.channel_of(&alice).is_none());
        assert_eq!(platform.deleted_channels(), vec![channel.clone()]);

        let err = platform.delete_channel(&channel).await.unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound { .. }));
    }

    #[tokio::test]
    async fn injected_failures() {
        let platform = MemoryPlatform::new();
        let bob = ParticipantId::from("bob");

        platform.fail_on("grant_role");
        let err = platform.grant_role(&bob, "r1").await.unwrap_err();
        assert_eq!(err.operation(), "grant_role");
        assert!(platform.roles_of(&bob).is_empty());

        platform.recover("grant_role");
        platform.grant_role(&bob, "r1").await.unwrap();
        assert!(platform.roles_of(&bob).contains("r1"));
    }

    #[tokio::test]
    async fn records_messages_per_channel() {
        let platform = MemoryPlatform::new();
        let a = ChannelRef::from("a");
        let b = ChannelRef::from("b");
        platform.send_message(&a, "one").await.unwrap();
        platform.send_message(&b, "two").await.unwrap();
        platform.send_message(&a, "three").await.unwrap();
        assert_eq!(platform.messages_in(&a), vec!["one", "three"]);
        assert_eq!(platform.messages().len(), 3);
    }
}

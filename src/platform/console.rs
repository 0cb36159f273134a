//! Console event source: stdin REPL for running an interview locally.
//!
//! Input lines:
//! - `join <participant>`: the participant joins the community
//! - `say <participant> <text>`: the participant writes in their private channel
//! - `!<command> ...`: administrative command (see `admin`)

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{ChannelRef, EventSource, EventStream, InboundEvent, MemoryPlatform, ParticipantId};
use crate::error::CapabilityError;

pub struct ConsoleSource {
    platform: Arc<MemoryPlatform>,
    command_channel: ChannelRef,
}

impl ConsoleSource {
    pub fn new(platform: Arc<MemoryPlatform>, command_channel: ChannelRef) -> Self {
        Self {
            platform,
            command_channel,
        }
    }

    /// Turn one input line into an event. Joining also registers the
    /// participant as a member so bulk admin commands can see them.
    pub fn parse_line(&self, line: &str) -> Option<InboundEvent> {
        let line = line.trim();
        if line.starts_with('!') {
            return Some(InboundEvent::AdminCommand {
                channel: self.command_channel.clone(),
                text: line.to_string(),
            });
        }

        let (verb, rest) = line.split_once(char::is_whitespace)?;
        match verb {
            "join" => {
                let participant = ParticipantId::new(rest.trim());
                self.platform.add_member(&participant);
                Some(InboundEvent::ParticipantJoined { participant })
            }
            "say" => {
                let (id, text) = rest.trim().split_once(char::is_whitespace)?;
                let participant = ParticipantId::new(id);
                let channel = self
                    .platform
                    .channel_of(&participant)
                    .unwrap_or_else(|| ChannelRef::new("lobby"));
                Some(InboundEvent::MessageReceived {
                    participant,
                    channel,
                    text: text.trim().to_string(),
                    message_id: None,
                })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl EventSource for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> Result<EventStream, CapabilityError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let platform = Arc::clone(&self.platform);
        let source = ConsoleSource::new(platform, self.command_channel.clone());

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();

            eprint!("> ");
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        match source.parse_line(&line) {
                            Some(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            None if line.trim().is_empty() => {}
                            None => eprintln!("usage: join <id> | say <id> <text> | !help"),
                        }
                        eprint!("> ");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    fn source() -> (ConsoleSource, Arc<MemoryPlatform>) {
        let platform = Arc::new(MemoryPlatform::new());
        (
            ConsoleSource::new(Arc::clone(&platform), ChannelRef::from("commands")),
            platform,
        )
    }

    #[test]
    fn join_registers_member() {
        let (source, platform) = source();
        let event = source.parse_line("join alice").unwrap();
        assert_eq!(
            event,
            InboundEvent::ParticipantJoined {
                participant: ParticipantId::from("alice")
            }
        );
        let members = futures::executor::block_on(platform.list_members("t")).unwrap();
        assert_eq!(members, vec![ParticipantId::from("alice")]);
    }

    #[tokio::test]
    async fn say_routes_to_private_channel() {
        let (source, platform) = source();
        let alice = ParticipantId::from("alice");
        let channel = platform.create_private_channel(&alice).await.unwrap();

        match source.parse_line("say alice  Hello there ").unwrap() {
            InboundEvent::MessageReceived {
                participant,
                channel: got,
                text,
                ..
            } => {
                assert_eq!(participant, alice);
                assert_eq!(got, channel);
                assert_eq!(text, "Hello there");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn bang_lines_are_admin_commands() {
        let (source, _) = source();
        assert!(matches!(
            source.parse_line("!status"),
            Some(InboundEvent::AdminCommand { ref channel, .. }) if channel.as_str() == "commands"
        ));
    }

    #[test]
    fn garbage_is_ignored() {
        let (source, _) = source();
        assert!(source.parse_line("dance").is_none());
        assert!(source.parse_line("say alice").is_none());
    }
}

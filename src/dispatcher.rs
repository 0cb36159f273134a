//! Event dispatcher: fans inbound platform events out to the interviewer
//! and the admin console, one task per event.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::admin::AdminConsole;
use crate::interview::{Interviewer, SubmitOutcome};
use crate::platform::{EventStream, InboundEvent};

pub struct Dispatcher {
    interviewer: Arc<Interviewer>,
    admin: Arc<AdminConsole>,
}

impl Dispatcher {
    pub fn new(interviewer: Arc<Interviewer>, admin: Arc<AdminConsole>) -> Self {
        Self { interviewer, admin }
    }

    /// Handle one event on its own task.
    pub fn dispatch(&self, event: InboundEvent) -> JoinHandle<()> {
        let interviewer = Arc::clone(&self.interviewer);
        let admin = Arc::clone(&self.admin);
        tokio::spawn(async move { handle(&interviewer, &admin, event).await })
    }

    /// Consume events until the stream ends or Ctrl+C, then wait for the
    /// events already in flight.
    pub async fn run(&self, mut events: EventStream) {
        let mut in_flight = JoinSet::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        info!("Event stream ended, shutting down...");
                        break;
                    }
                }
            };

            let interviewer = Arc::clone(&self.interviewer);
            let admin = Arc::clone(&self.admin);
            in_flight.spawn(async move { handle(&interviewer, &admin, event).await });

            while let Some(done) = in_flight.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "Event task panicked");
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "Event task panicked");
            }
        }
    }
}

async fn handle(interviewer: &Interviewer, admin: &AdminConsole, event: InboundEvent) {
    let kind = event.label();
    match event {
        InboundEvent::ParticipantJoined { participant } => {
            if let Err(e) = interviewer.start(&participant).await {
                error!(participant = %participant, error = %e, "Could not start interview");
            }
        }
        InboundEvent::MessageReceived {
            participant,
            channel,
            text,
            message_id,
        } => match interviewer
            .submit(&participant, &channel, &text, message_id.as_deref())
            .await
        {
            Ok(SubmitOutcome::Ignored(reason)) => {
                debug!(participant = %participant, reason = reason.label(), "Message ignored");
            }
            Ok(_) => {}
            Err(e) => error!(participant = %participant, error = %e, "Could not process answer"),
        },
        InboundEvent::AdminCommand { channel, text } => admin.handle(&channel, &text).await,
    }
    debug!(event = kind, "Event handled");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;
    use crate::config::{PacingConfig, TenantConfig};
    use crate::graph::{GraphCatalog, QuestionGraph};
    use crate::interview::InMemorySessionStore;
    use crate::platform::{ChannelRef, MemoryPlatform, ParticipantId};

    async fn dispatcher() -> (Dispatcher, Arc<Interviewer>, Arc<MemoryPlatform>) {
        let platform = Arc::new(MemoryPlatform::new());
        let catalog = GraphCatalog::new();
        catalog
            .install(
                "t1",
                QuestionGraph::from_json(
                    r#"{ "version": 1, "questions": [
                        { "id": "q1", "order": 1, "type": "text_input", "text": "Name?",
                          "actions": [ { "type": "change_nickname", "format_template": "@input" } ] }
                    ] }"#,
                )
                .unwrap(),
            )
            .await;
        let interviewer = Arc::new(Interviewer::new(
            TenantConfig::new("t1"),
            catalog,
            platform.clone(),
            Arc::new(InMemorySessionStore::new()),
            Duration::from_secs(30),
        ));
        let admin = Arc::new(AdminConsole::new(Arc::clone(&interviewer), PacingConfig::default()));
        (Dispatcher::new(Arc::clone(&interviewer), admin), interviewer, platform)
    }

    #[tokio::test]
    async fn join_then_answer() {
        let (dispatcher, _, platform) = dispatcher().await;
        let p = ParticipantId::from("p1");

        dispatcher
            .dispatch(InboundEvent::ParticipantJoined { participant: p.clone() })
            .await
            .unwrap();
        let channel = platform.channel_of(&p).unwrap();

        dispatcher
            .dispatch(InboundEvent::MessageReceived {
                participant: p.clone(),
                channel,
                text: "Ann".into(),
                message_id: Some("m1".into()),
            })
            .await
            .unwrap();
        assert_eq!(platform.display_name(&p).as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn run_drains_the_stream() {
        let (dispatcher, interviewer, platform) = dispatcher().await;
        let events: EventStream = Box::pin(stream::iter(vec![
            InboundEvent::ParticipantJoined { participant: "a".into() },
            InboundEvent::ParticipantJoined { participant: "b".into() },
            InboundEvent::AdminCommand {
                channel: ChannelRef::from("commands"),
                text: "!help".into(),
            },
        ]));

        dispatcher.run(events).await;

        assert_eq!(interviewer.store().len().await, 2);
        assert_eq!(platform.messages_in(&ChannelRef::from("commands")).len(), 1);
    }
}

//! Administrative commands posted in the tenant's command channel.
//!
//! Authorization is left to the platform adapter: anything that reaches
//! `AdminConsole::handle` is trusted.

pub mod bulk;
pub mod command;

use std::sync::Arc;

use tracing::{info, warn};

pub use bulk::BulkReport;
pub use command::{AdminCommand, CommandParser, HELP, Target};

use crate::config::PacingConfig;
use crate::interview::{AbortOutcome, Interviewer, StartOutcome};
use crate::platform::ChannelRef;

pub struct AdminConsole {
    interviewer: Arc<Interviewer>,
    pacing: PacingConfig,
}

impl AdminConsole {
    pub fn new(interviewer: Arc<Interviewer>, pacing: PacingConfig) -> Self {
        Self { interviewer, pacing }
    }

    /// Handle a line posted in `channel`. Text from any channel other than
    /// the configured command channel is ignored.
    pub async fn handle(&self, channel: &ChannelRef, text: &str) {
        if channel != &self.interviewer.tenant().command_channel {
            return;
        }
        let Some(command) = CommandParser::parse(text) else {
            return;
        };

        info!(command = ?command, "Admin command received");
        if matches!(command, AdminCommand::ClearRoles) {
            self.reply(channel, "Removing roles from every member. This may take a while.")
                .await;
        }
        let reply = self.run(command).await;
        self.reply(channel, &reply).await;
    }

    /// Execute a command and return the reply text.
    pub async fn run(&self, command: AdminCommand) -> String {
        match command {
            AdminCommand::Help => HELP.to_string(),
            AdminCommand::Status => self.status().await,
            AdminCommand::Start(Target::Participant(participant)) => {
                match self.interviewer.start(&participant).await {
                    Ok(StartOutcome::Started { .. }) => format!("Started the interview for {participant}"),
                    Ok(StartOutcome::AlreadyActive) => format!("{participant} is already in an interview"),
                    Err(e) => format!("Could not start the interview for {participant}: {e}"),
                }
            }
            AdminCommand::Start(Target::All) => match self.start_all().await {
                Ok(report) => format!(
                    "Started {} interviews ({} already active, {} failed)",
                    report.succeeded, report.skipped, report.failed
                ),
                Err(e) => format!("Could not list members: {e}"),
            },
            AdminCommand::Stop(Target::Participant(participant)) => {
                match self.interviewer.abort(&participant).await {
                    AbortOutcome::Aborted { .. } => format!("Interview for {participant} aborted"),
                    AbortOutcome::NotFound => format!("{participant} is not in an interview"),
                }
            }
            AdminCommand::Stop(Target::All) => {
                let report = self.stop_all().await;
                format!("Aborted {} interviews", report.succeeded)
            }
            AdminCommand::ClearRoles => match self.clear_roles().await {
                Ok(report) => format!(
                    "Role removal finished.\nSucceeded: {}\nFailed: {}",
                    report.succeeded, report.failed
                ),
                Err(e) => format!("Could not list members: {e}"),
            },
            AdminCommand::Unknown(name) => format!("Unknown command !{name}. Type !help for the list."),
        }
    }

    async fn status(&self) -> String {
        let active = self.interviewer.store().len().await;
        let graph = match self.interviewer.graph().await {
            Some(graph) => format!("version {} ({} questions)", graph.version, graph.questions.len()),
            None => "not loaded".to_string(),
        };
        format!(
            "**Status:**\nVersion: {}\nTenant: {}\nQuestion graph: {}\nActive sessions: {}\nPending purges: {}",
            env!("CARGO_PKG_VERSION"),
            self.interviewer.tenant().tenant_id,
            graph,
            active,
            self.interviewer.scheduler().pending_count()
        )
    }

    async fn reply(&self, channel: &ChannelRef, text: &str) {
        if let Err(e) = self.interviewer.platform().send_message(channel, text).await {
            warn!(channel = %channel, error = %e, "Failed to send admin reply");
        }
    }
}

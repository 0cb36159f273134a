//! Administrative command parsing.

use crate::platform::ParticipantId;

/// Who a start/stop command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Everyone eligible. The default when no `--user_id` is given.
    All,
    Participant(ParticipantId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Status,
    Start(Target),
    Stop(Target),
    /// Strip every grantable role from every member.
    ClearRoles,
    Unknown(String),
}

/// Parses command-channel text into an `AdminCommand`.
pub struct CommandParser;

impl CommandParser {
    /// Parse a `!command [args]` line. Returns `None` for text that is not a
    /// command at all.
    pub fn parse(content: &str) -> Option<AdminCommand> {
        let trimmed = content.trim();
        let body = trimmed.strip_prefix('!')?;
        let mut words = body.split_whitespace();
        let name = words.next()?.to_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match name.as_str() {
            "help" | "?" => AdminCommand::Help,
            "status" => AdminCommand::Status,
            "start" | "startregistred" | "startregistered" => AdminCommand::Start(parse_target(&args)),
            "stop" | "stopregistred" | "stopregistered" => AdminCommand::Stop(parse_target(&args)),
            "clsroles" => AdminCommand::ClearRoles,
            _ => AdminCommand::Unknown(name),
        };
        Some(command)
    }
}

/// `--all` is accepted and is the default; `--user_id ID` narrows to one
/// participant. Unknown flags are ignored.
fn parse_target(args: &[&str]) -> Target {
    let mut target = Target::All;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.eq_ignore_ascii_case("--user_id") {
            if let Some(id) = iter.next() {
                target = Target::Participant(ParticipantId::new(*id));
            }
        }
    }
    target
}

pub const HELP: &str = "**Admin commands:**

!start [--all] [--user_id ID] - Start the interview for everyone without one, or for one member
!stop [--all] [--user_id ID] - Abort active interviews, or one member's interview
!clsroles - Remove every role the interview can grant from every member
!status - Show active interviews and the loaded question graph
!help - Show this message

Aborted interviews have to be started again with !start.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_commands() {
        assert_eq!(CommandParser::parse("!help"), Some(AdminCommand::Help));
        assert_eq!(CommandParser::parse("  !STATUS "), Some(AdminCommand::Status));
        assert_eq!(CommandParser::parse("!clsRoles"), Some(AdminCommand::ClearRoles));
    }

    #[test]
    fn start_and_stop_targets() {
        assert_eq!(
            CommandParser::parse("!startRegistred"),
            Some(AdminCommand::Start(Target::All))
        );
        assert_eq!(
            CommandParser::parse("!start --all"),
            Some(AdminCommand::Start(Target::All))
        );
        assert_eq!(
            CommandParser::parse("!stop --USER_ID AbC123"),
            Some(AdminCommand::Stop(Target::Participant(ParticipantId::from("AbC123"))))
        );
        assert_eq!(
            CommandParser::parse("!stopregistred --all --user_id 42"),
            Some(AdminCommand::Stop(Target::Participant(ParticipantId::from("42"))))
        );
    }

    #[test]
    fn dangling_user_id_falls_back_to_all() {
        assert_eq!(
            CommandParser::parse("!start --user_id"),
            Some(AdminCommand::Start(Target::All))
        );
    }

    #[test]
    fn unknown_and_non_commands() {
        assert_eq!(
            CommandParser::parse("!dance now"),
            Some(AdminCommand::Unknown("dance".into()))
        );
        assert_eq!(CommandParser::parse("hello"), None);
        assert_eq!(CommandParser::parse("!"), None);
    }
}

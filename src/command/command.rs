use super::{CommandKind, CommandState};
use crate::cmd;
use crate::rocket::PartIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A routed unit of operator- or system-issued work.
///
/// The serialised form mirrors the server's command documents, so commands
/// pushed by the server deserialise directly and completed ones are reported
/// back unchanged apart from state, timestamps and response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "_id")]
    id: Uuid,
    #[serde(rename = "_command_type")]
    kind: CommandTag,
    #[serde(rename = "_part_id", default)]
    part_id: Option<Uuid>,
    state: CommandState,
    create_time: DateTime<Utc>,
    #[serde(default)]
    dispatch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    receive_time: Option<DateTime<Utc>>,
    #[serde(default)]
    complete_time: Option<DateTime<Utc>>,
    #[serde(default)]
    response_message: Option<String>,
    #[serde(default)]
    command_payload: Option<serde_json::Value>,
    #[serde(default)]
    response: Option<serde_json::Value>,
    /// Part that emitted this command, `None` for operator commands.
    #[serde(skip)]
    issuer: Option<PartIndex>,
}

impl Command {
    /// Creates a fresh command in state `New`.
    pub fn new(kind: CommandKind, part_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: CommandTag::from(kind),
            part_id,
            state: CommandState::New,
            create_time: now,
            dispatch_time: None,
            receive_time: None,
            complete_time: None,
            response_message: None,
            command_payload: None,
            response: None,
            issuer: None,
        }
    }

    /// Shorthand for a command addressed to a single part.
    pub fn for_part(kind: CommandKind, part_id: Uuid, now: DateTime<Utc>) -> Self {
        Self::new(kind, Some(part_id), now)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn kind(&self) -> CommandKind { self.kind.kind }
    /// Wire tag, verbatim for kinds this computer does not know.
    pub fn type_tag(&self) -> String { String::from(self.kind.clone()) }
    pub fn part_id(&self) -> Option<Uuid> { self.part_id }
    pub fn state(&self) -> CommandState { self.state }
    pub fn create_time(&self) -> DateTime<Utc> { self.create_time }
    pub fn dispatch_time(&self) -> Option<DateTime<Utc>> { self.dispatch_time }
    pub fn receive_time(&self) -> Option<DateTime<Utc>> { self.receive_time }
    pub fn complete_time(&self) -> Option<DateTime<Utc>> { self.complete_time }
    pub fn response_message(&self) -> Option<&str> { self.response_message.as_deref() }
    pub fn payload(&self) -> Option<&serde_json::Value> { self.command_payload.as_ref() }
    pub fn issuer(&self) -> Option<PartIndex> { self.issuer }
    pub fn is_fresh(&self) -> bool { self.state.is_fresh() }
    pub fn is_terminal(&self) -> bool { self.state.is_terminal() }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.command_payload = Some(payload);
        self
    }

    pub(crate) fn set_issuer(&mut self, issuer: PartIndex) { self.issuer = Some(issuer); }

    pub(crate) fn set_create_time(&mut self, now: DateTime<Utc>) { self.create_time = now; }

    /// Marks a command handed to the computer by the server.
    pub fn mark_received(&mut self, now: DateTime<Utc>) {
        if self.state.is_fresh() {
            self.state = CommandState::Received;
            self.receive_time = Some(now);
        }
    }

    /// Moves a fresh command into `Processing`. Returns `false` if the
    /// command was already terminal.
    pub fn start_processing(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = CommandState::Processing;
        true
    }

    /// Completes the command successfully. Terminal commands are left untouched.
    pub fn succeed(&mut self, now: DateTime<Utc>) -> bool {
        self.finish(CommandState::Success, None, now)
    }

    /// Completes the command successfully with a message for the operator.
    pub fn succeed_with(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> bool {
        self.finish(CommandState::Success, Some(message.into()), now)
    }

    /// Fails the command with a human-readable reason. Terminal commands are
    /// left untouched.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> bool {
        self.finish(CommandState::Failed, Some(reason.into()), now)
    }

    fn finish(&mut self, state: CommandState, message: Option<String>, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        self.complete_time = Some(now);
        if let Some(msg) = message {
            cmd!("{} {} -> {}: {msg}", self.type_tag(), self.id, <&str>::from(state));
            self.response_message = Some(msg);
        } else {
            cmd!("{} {} -> {}", self.type_tag(), self.id, <&str>::from(state));
        }
        true
    }
}

/// `_command_type` of a command document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
struct CommandTag {
    kind: CommandKind,
    /// Set only for [`CommandKind::Unknown`].
    raw: Option<String>,
}

impl From<CommandKind> for CommandTag {
    fn from(kind: CommandKind) -> Self { Self { kind, raw: None } }
}

impl From<String> for CommandTag {
    fn from(tag: String) -> Self {
        let kind = CommandKind::from_wire(&tag);
        Self { kind, raw: (kind == CommandKind::Unknown).then_some(tag) }
    }
}

impl From<CommandTag> for String {
    fn from(tag: CommandTag) -> Self { tag.raw.unwrap_or_else(|| tag.kind.to_string()) }
}

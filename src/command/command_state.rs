use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`super::Command`].
///
/// `New`, `Dispatched` and `Received` all mean "not yet started", a part has
/// to treat them as fresh work. `Success` and `Failed` are terminal.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    New,
    Dispatched,
    Received,
    Processing,
    Success,
    Failed,
}

impl CommandState {
    pub fn is_fresh(self) -> bool {
        matches!(self, CommandState::New | CommandState::Dispatched | CommandState::Received)
    }

    pub fn is_terminal(self) -> bool { matches!(self, CommandState::Success | CommandState::Failed) }
}

impl From<&str> for CommandState {
    fn from(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "new" => CommandState::New,
            "dispatched" => CommandState::Dispatched,
            "received" => CommandState::Received,
            "processing" => CommandState::Processing,
            "success" => CommandState::Success,
            _ => CommandState::Failed,
        }
    }
}

impl From<CommandState> for &'static str {
    fn from(value: CommandState) -> Self {
        match value {
            CommandState::New => "new",
            CommandState::Dispatched => "dispatched",
            CommandState::Received => "received",
            CommandState::Processing => "processing",
            CommandState::Success => "success",
            CommandState::Failed => "failed",
        }
    }
}

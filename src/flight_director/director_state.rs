use crate::command::CommandKind;

/// Launch-sequence phase of the [`super::FlightDirector`].
///
/// There is no terminal phase, an abort returns to `Idle` from anywhere.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub enum DirectorState {
    #[default]
    Idle,
    Armed,
    Countdown,
    Flight,
}

impl DirectorState {
    /// Whether a fresh command of `kind` may start in this phase.
    pub fn admits(self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::Calibrate | CommandKind::Arm => self == DirectorState::Idle,
            CommandKind::StartCountdown => self == DirectorState::Armed,
            CommandKind::Abort | CommandKind::Enable | CommandKind::Disable => true,
            _ => false,
        }
    }
}

impl From<&str> for DirectorState {
    fn from(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "armed" => DirectorState::Armed,
            "countdown" => DirectorState::Countdown,
            "flight" => DirectorState::Flight,
            _ => DirectorState::Idle,
        }
    }
}

impl From<DirectorState> for &'static str {
    fn from(value: DirectorState) -> Self {
        match value {
            DirectorState::Idle => "Idle",
            DirectorState::Armed => "Armed",
            DirectorState::Countdown => "Countdown",
            DirectorState::Flight => "Flight",
        }
    }
}

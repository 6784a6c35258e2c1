use strum_macros::{Display, EnumIter};

/// Closed set of command kinds the flight computer understands.
///
/// The display form is the server-side type tag (`Control.Arm`, ...).
/// Tags the computer does not know resolve to [`CommandKind::Unknown`],
/// the raw tag itself is kept on the [`super::Command`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum CommandKind {
    #[strum(to_string = "Control.Enable")]
    Enable,
    #[strum(to_string = "Control.Disable")]
    Disable,
    #[strum(to_string = "Control.Reset")]
    Reset,
    #[strum(to_string = "Calibrate.Zero")]
    Calibrate,
    #[strum(to_string = "Control.Arm")]
    Arm,
    #[strum(to_string = "Control.Start_Countdown")]
    StartCountdown,
    #[strum(to_string = "Control.Abort")]
    Abort,
    #[strum(to_string = "Control.Open")]
    Open,
    #[strum(to_string = "Control.Close")]
    Close,
    #[strum(to_string = "Control.Ignite")]
    Ignite,
    #[strum(to_string = "Unknown")]
    Unknown,
}

impl CommandKind {
    /// Resolves a server type tag.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "Control.Enable" => CommandKind::Enable,
            "Control.Disable" => CommandKind::Disable,
            "Control.Reset" => CommandKind::Reset,
            "Calibrate.Zero" => CommandKind::Calibrate,
            "Control.Arm" => CommandKind::Arm,
            "Control.Start_Countdown" => CommandKind::StartCountdown,
            "Control.Abort" => CommandKind::Abort,
            "Control.Open" => CommandKind::Open,
            "Control.Close" => CommandKind::Close,
            "Control.Ignite" => CommandKind::Ignite,
            _ => CommandKind::Unknown,
        }
    }
}

impl From<String> for CommandKind {
    fn from(value: String) -> Self { CommandKind::from_wire(&value) }
}

impl From<CommandKind> for String {
    fn from(value: CommandKind) -> Self { value.to_string() }
}

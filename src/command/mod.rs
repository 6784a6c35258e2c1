mod command;
mod command_buffer;
mod command_kind;
mod command_state;


pub use command::Command;
pub(crate) use command_buffer::LockedCommandBuffer;
pub use command_kind::CommandKind;
pub use command_state::CommandState;

mod completion;
mod hdlc;
mod packets;
mod serial_adapter;
mod serial_command;
mod serial_link;


pub use completion::{CompletionHandle, HandleState, LinkFailure, completion_pair};
pub use hdlc::{FrameCodec, FramingError, HdlcCodec};
pub use packets::{CommandPacket, InboundPacket, PacketError, ResponsePacket, ResultCode, SensorDataPacket};
pub use serial_adapter::{DataCallback, SerialAdapter};
pub use serial_command::SerialCommandTracker;
pub use serial_link::SerialLink;

use std::fmt;

/// Outbound request to the microcontroller.
///
/// ```text
/// byte0: 1ppp pppp   request marker, part id
/// byte1: iiii iiii   message index
/// byte2: cccc vvvv   command id, inline payload
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    pub part_id: u8,
    pub index: u8,
    pub command_id: u8,
    pub payload: u8,
}

impl CommandPacket {
    pub const LEN: usize = 3;

    /// # Errors
    /// Returns [`PacketError::FieldOutOfRange`] if the part id exceeds 7 bits
    /// or command id / payload exceed 4 bits.
    pub fn encode(&self) -> Result<[u8; Self::LEN], PacketError> {
        if self.part_id > 0x7F {
            return Err(PacketError::FieldOutOfRange("part id", self.part_id));
        }
        if self.command_id > 0x0F {
            return Err(PacketError::FieldOutOfRange("command id", self.command_id));
        }
        if self.payload > 0x0F {
            return Err(PacketError::FieldOutOfRange("payload", self.payload));
        }
        Ok([0x80 | self.part_id, self.index, (self.command_id << 4) | self.payload])
    }
}

/// Result code carried in the low nibble of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    IncompatiblePhase,
    BadPartByte,
    BadCommandByte,
    Failed,
    Unknown(u8),
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "Success"),
            ResultCode::IncompatiblePhase => write!(f, "Failed : Incompatible Launch Phase"),
            ResultCode::BadPartByte => write!(f, "Failed : Incorrect Part Byte"),
            ResultCode::BadCommandByte => write!(f, "Failed : Incorrect Command Byte"),
            ResultCode::Failed => write!(f, "Failed"),
            ResultCode::Unknown(code) => write!(f, "Failed : Unknown result code {code}"),
        }
    }
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResultCode::Success,
            1 => ResultCode::IncompatiblePhase,
            2 => ResultCode::BadPartByte,
            3 => ResultCode::BadCommandByte,
            4 => ResultCode::Failed,
            other => ResultCode::Unknown(other),
        }
    }
}

/// Inbound answer to a [`CommandPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePacket {
    pub part_id: u8,
    pub index: u8,
    pub command_id: u8,
    pub result: ResultCode,
}

/// Inbound sensor sample pushed by the microcontroller.
///
/// ```text
/// byte0: 0xxp pppl   data marker, part id, length msb
/// byte1: llll tttt   length lsbs (length - 1), sensor type
/// byte2..            payload
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDataPacket {
    pub part_id: u8,
    pub sensor_type: u8,
    pub payload: Vec<u8>,
}

impl SensorDataPacket {
    pub const HEADER_LEN: usize = 2;
    pub const MAX_PAYLOAD: usize = 32;

    /// Inverse of the inbound decoder, used to simulate the microcontroller.
    ///
    /// # Errors
    /// Fails for part ids above 15, sensor types above 15 and payloads that
    /// are empty or longer than [`SensorDataPacket::MAX_PAYLOAD`].
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.part_id > 0x0F {
            return Err(PacketError::FieldOutOfRange("part id", self.part_id));
        }
        if self.sensor_type > 0x0F {
            return Err(PacketError::FieldOutOfRange("sensor type", self.sensor_type));
        }
        let len = self.payload.len();
        if len == 0 || len > Self::MAX_PAYLOAD {
            return Err(PacketError::FieldOutOfRange("payload length", u8::try_from(len).unwrap_or(u8::MAX)));
        }
        #[allow(clippy::cast_possible_truncation)]
        let len_field = (len - 1) as u8;
        let mut out = Vec::with_capacity(Self::HEADER_LEN + len);
        out.push((self.part_id << 1) | (len_field >> 4));
        out.push(((len_field & 0x0F) << 4) | self.sensor_type);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPacket {
    Response(ResponsePacket),
    SensorData(SensorDataPacket),
}

impl InboundPacket {
    /// Decodes one deframed payload.
    ///
    /// # Errors
    /// [`PacketError::Truncated`] for short frames, [`PacketError::RequestFlag`]
    /// for command-class frames without the response flag.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let Some(&b0) = bytes.first() else { return Err(PacketError::Truncated { expected: 1, got: 0 }) };
        if b0 & 0x80 != 0 {
            if bytes.len() < CommandPacket::LEN {
                return Err(PacketError::Truncated { expected: CommandPacket::LEN, got: bytes.len() });
            }
            if b0 & 0x40 == 0 {
                return Err(PacketError::RequestFlag(b0));
            }
            return Ok(InboundPacket::Response(ResponsePacket {
                part_id: b0 & 0x3F,
                index: bytes[1],
                command_id: bytes[2] >> 4,
                result: ResultCode::from(bytes[2] & 0x0F),
            }));
        }
        if bytes.len() < SensorDataPacket::HEADER_LEN {
            return Err(PacketError::Truncated { expected: SensorDataPacket::HEADER_LEN, got: bytes.len() });
        }
        let b1 = bytes[1];
        let len = ((usize::from(b0 & 0x01) << 4) | usize::from(b1 >> 4)) + 1;
        let end = SensorDataPacket::HEADER_LEN + len;
        if bytes.len() < end {
            return Err(PacketError::Truncated { expected: end, got: bytes.len() });
        }
        Ok(InboundPacket::SensorData(SensorDataPacket {
            part_id: (b0 >> 1) & 0x0F,
            sensor_type: b1 & 0x0F,
            payload: bytes[SensorDataPacket::HEADER_LEN..end].to_vec(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    Truncated { expected: usize, got: usize },
    /// A command-class frame arrived without the response flag.
    RequestFlag(u8),
    FieldOutOfRange(&'static str, u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Truncated { expected, got } => {
                write!(f, "truncated packet, expected {expected} bytes but got {got}")
            }
            PacketError::RequestFlag(b0) => write!(f, "inbound frame {b0:#04x} is not flagged as response"),
            PacketError::FieldOutOfRange(name, v) => write!(f, "{name} {v} out of range"),
        }
    }
}

impl std::error::Error for PacketError {}

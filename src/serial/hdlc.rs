use std::fmt;

/// Byte-stream framing used on the serial link.
pub trait FrameCodec: Send {
    /// Wraps one payload into a self-delimiting frame.
    fn encode(&self, payload: &[u8]) -> Vec<u8>;

    /// Consumes raw stream bytes and returns every frame completed by them.
    /// Partial frames are kept until the next call.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Vec<u8>, FramingError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    Checksum { expected: u8, got: u8 },
    TooShort,
    Overflow,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::Checksum { expected, got } => {
                write!(f, "frame checksum mismatch, expected {expected:#04x} got {got:#04x}")
            }
            FramingError::TooShort => write!(f, "frame without payload"),
            FramingError::Overflow => write!(f, "frame exceeds {} bytes", HdlcCodec::MAX_FRAME),
        }
    }
}

impl std::error::Error for FramingError {}

const CRC8: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);

/// HDLC-style framing: `0x7E` delimits frames, `0x7D` escapes delimiter and
/// escape bytes (xor `0x20`), an 8-bit CRC trails the payload.
#[derive(Debug, Default)]
pub struct HdlcCodec {
    buf: Vec<u8>,
    escaped: bool,
    overflow: bool,
}

impl HdlcCodec {
    pub const FLAG: u8 = 0x7E;
    pub const ESCAPE: u8 = 0x7D;
    const ESCAPE_XOR: u8 = 0x20;
    /// Largest unescaped frame body (payload + crc). Sensor frames are at most 34 bytes.
    pub const MAX_FRAME: usize = 64;

    pub fn new() -> Self { Self::default() }

    fn push_escaped(out: &mut Vec<u8>, byte: u8) {
        if byte == Self::FLAG || byte == Self::ESCAPE {
            out.push(Self::ESCAPE);
            out.push(byte ^ Self::ESCAPE_XOR);
        } else {
            out.push(byte);
        }
    }

    fn finish_frame(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        let overflow = std::mem::take(&mut self.overflow);
        self.escaped = false;
        let body = std::mem::take(&mut self.buf);
        if overflow {
            return Some(Err(FramingError::Overflow));
        }
        // back-to-back flags yield an empty body
        let (&crc, payload) = body.split_last()?;
        if payload.is_empty() {
            return Some(Err(FramingError::TooShort));
        }
        let expected = CRC8.checksum(payload);
        if expected != crc {
            return Some(Err(FramingError::Checksum { expected, got: crc }));
        }
        Some(Ok(payload.to_vec()))
    }
}

impl FrameCodec for HdlcCodec {
    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() * 2 + 4);
        out.push(Self::FLAG);
        for &b in payload {
            Self::push_escaped(&mut out, b);
        }
        Self::push_escaped(&mut out, CRC8.checksum(payload));
        out.push(Self::FLAG);
        out
    }

    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Vec<u8>, FramingError>> {
        let mut frames = Vec::new();
        for &b in bytes {
            match b {
                Self::FLAG => frames.extend(self.finish_frame()),
                Self::ESCAPE => self.escaped = true,
                _ => {
                    let byte = if std::mem::take(&mut self.escaped) { b ^ Self::ESCAPE_XOR } else { b };
                    if self.buf.len() >= Self::MAX_FRAME {
                        self.overflow = true;
                    } else {
                        self.buf.push(byte);
                    }
                }
            }
        }
        frames
    }
}

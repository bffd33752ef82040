//! Open Sound Control 1.0 packet codec.
//!
//! Message layout:
//! ```text
//! address      OSC-string   "/assetFind\0\0"
//! type tags    OSC-string   ",ss\0"
//! arguments    per tag      i: int32 BE, h: int64 BE, f: float32 BE,
//!                           s: OSC-string, b: int32 BE size + bytes (padded)
//! ```
//! An OSC-string is UTF-8 bytes, a NUL terminator, then NUL padding up to a
//! multiple of four. Bundles are `#bundle\0`, an 8-byte time tag, then
//! elements each prefixed with their int32 size.

use crate::{WireError, WireResult};

/// Leading OSC-string of every bundle
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Time tag meaning "immediately"
pub const IMMEDIATE: u64 = 1;

/// Nesting limit for inbound bundles
pub const MAX_BUNDLE_DEPTH: usize = 8;

/// A single typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Long(i64),
    Float(f32),
    Str(String),
    Blob(Vec<u8>),
}

impl OscArg {
    /// Type tag character
    pub fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Long(_) => 'h',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<i64> for OscArg {
    fn from(v: i64) -> Self {
        OscArg::Long(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Str(v)
    }
}

impl From<Vec<u8>> for OscArg {
    fn from(v: Vec<u8>) -> Self {
        OscArg::Blob(v)
    }
}

/// Address pattern plus ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument (builder style).
    pub fn arg(mut self, arg: impl Into<OscArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        write_string(&mut out, &self.address);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        write_string(&mut out, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Str(s) => write_string(&mut out, s),
                OscArg::Blob(b) => {
                    out.extend_from_slice(&(b.len() as i32).to_be_bytes());
                    out.extend_from_slice(b);
                    pad(&mut out);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(bytes);
        let address = reader.string()?;
        if !address.starts_with('/') {
            return Err(WireError::BadAddress(address));
        }

        let args = if reader.is_empty() {
            // Pre-1.0 senders may omit the type tag string entirely.
            Vec::new()
        } else {
            let tags = reader.string()?;
            let Some(tags) = tags.strip_prefix(',') else {
                return Err(WireError::MissingTypeTags);
            };
            let mut args = Vec::with_capacity(tags.len());
            for tag in tags.chars() {
                args.push(match tag {
                    'i' => OscArg::Int(reader.i32()?),
                    'h' => OscArg::Long(i64::from_be_bytes(reader.array::<8>()?)),
                    'f' => OscArg::Float(f32::from_be_bytes(reader.array::<4>()?)),
                    's' => OscArg::Str(reader.string()?),
                    'b' => OscArg::Blob(reader.blob()?),
                    other => return Err(WireError::UnsupportedType(other)),
                });
            }
            args
        };

        if !reader.is_empty() {
            return Err(WireError::TrailingBytes(reader.remaining()));
        }
        Ok(Self { address, args })
    }
}

/// A message or a (possibly nested) bundle of packets.
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle { time_tag: u64, packets: Vec<OscPacket> },
}

impl OscPacket {
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        Self::decode_at_depth(bytes, 0)
    }

    fn decode_at_depth(bytes: &[u8], depth: usize) -> WireResult<Self> {
        if !bytes.starts_with(BUNDLE_TAG) {
            return OscMessage::decode(bytes).map(OscPacket::Message);
        }
        if depth >= MAX_BUNDLE_DEPTH {
            return Err(WireError::BundleTooDeep);
        }

        let mut reader = Reader::new(&bytes[BUNDLE_TAG.len()..]);
        let time_tag = u64::from_be_bytes(reader.array::<8>()?);
        let mut packets = Vec::new();
        while !reader.is_empty() {
            let size = reader.i32()?;
            if size < 0 || size % 4 != 0 {
                return Err(WireError::InvalidSize(size));
            }
            let element = reader.take(size as usize)?;
            packets.push(Self::decode_at_depth(element, depth + 1)?);
        }
        Ok(OscPacket::Bundle { time_tag, packets })
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            OscPacket::Message(m) => m.encode(),
            OscPacket::Bundle { time_tag, packets } => {
                let mut out = BUNDLE_TAG.to_vec();
                out.extend_from_slice(&time_tag.to_be_bytes());
                for p in packets {
                    let element = p.encode();
                    out.extend_from_slice(&(element.len() as i32).to_be_bytes());
                    out.extend_from_slice(&element);
                }
                out
            }
        }
    }

    /// Flatten bundles into their messages, depth first.
    pub fn into_messages(self) -> Vec<OscMessage> {
        match self {
            OscPacket::Message(m) => vec![m],
            OscPacket::Bundle { packets, .. } => {
                packets.into_iter().flat_map(OscPacket::into_messages).collect()
            }
        }
    }
}

fn pad(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    pad(out);
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(WireError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn i32(&mut self) -> WireResult<i32> {
        Ok(i32::from_be_bytes(self.array::<4>()?))
    }

    fn string(&mut self) -> WireResult<String> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(WireError::UnterminatedString)?;
        let bytes = self.take(padded(nul + 1))?;
        std::str::from_utf8(&bytes[..nul])
            .map(str::to_string)
            .map_err(|_| WireError::InvalidUtf8)
    }

    fn blob(&mut self) -> WireResult<Vec<u8>> {
        let size = self.i32()?;
        if size < 0 {
            return Err(WireError::InvalidSize(size));
        }
        let size = size as usize;
        let bytes = self.take(padded(size))?;
        Ok(bytes[..size].to_vec())
    }
}

//! # vasset-wire
//!
//! Datagram protocol spoken between clients and the asset broker.
//!
//! Clients send OSC messages (optionally grouped in bundles) to the broker's
//! listen address. Every reply is a single OSC message sent to the broker's
//! configured reply address, so a client that wants answers must listen
//! there. Keys travel as lowercase hex strings.

pub mod command;
pub mod osc;
pub mod reply;

pub use command::Command;
pub use osc::{OscArg, OscMessage, OscPacket};
pub use reply::{FoundAsset, Reply};

/// OSC address patterns.
pub mod address {
    pub const ASSET_FIND: &str = "/assetFind";
    pub const ASSET_FIND_NAME: &str = "/assetFindName";
    pub const ASSET_LOAD: &str = "/assetLoad";
    pub const ASSET_ADD_FILE: &str = "/assetAddFile";
    pub const ASSET_ADD_STRING: &str = "/assetAddString";
    pub const LIST_ADD: &str = "/listAdd";
    pub const LIST_FIND: &str = "/listFind";
    pub const LIST_NEXT: &str = "/listNext";

    pub const ASSET_FOUND: &str = "/assetFound";
    pub const ASSET_ERROR: &str = "/assetError";
    pub const ASSET_LOADED: &str = "/assetLoaded";
    pub const ASSET_ADDED: &str = "/assetAdded";
    pub const LIST_FOUND: &str = "/listFound";
    pub const LIST_ERROR: &str = "/listError";
    pub const LIST_ITEMS: &str = "/listItems";
}

/// Largest datagram the broker will read in one receive
pub const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("packet truncated")]
    Truncated,

    #[error("OSC-string missing NUL terminator")]
    UnterminatedString,

    #[error("OSC-string is not valid UTF-8")]
    InvalidUtf8,

    #[error("bad address pattern: {0:?}")]
    BadAddress(String),

    #[error("message has arguments but no type tag string")]
    MissingTypeTags,

    #[error("unsupported type tag '{0}'")]
    UnsupportedType(char),

    #[error("invalid element size {0}")]
    InvalidSize(i32),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("bundles nested too deeply")]
    BundleTooDeep,

    #[error("unknown address {0}")]
    UnknownAddress(String),

    #[error("{address}: missing argument `{name}`")]
    MissingArgument {
        address: String,
        name: &'static str,
    },

    #[error("{address}: argument `{name}` should be '{expected}', got '{found}'")]
    WrongType {
        address: String,
        name: &'static str,
        expected: char,
        found: char,
    },

    #[error("{address}: invalid value {value:?} for `{name}`")]
    InvalidValue {
        address: String,
        name: &'static str,
        value: String,
    },

    #[error("{address}: expected {expected} arguments, got {found}")]
    ExcessArguments {
        address: String,
        expected: usize,
        found: usize,
    },

    #[error("encoded size {size} exceeds limit {max}")]
    TooLarge { size: usize, max: usize },
}

pub type WireResult<T> = std::result::Result<T, WireError>;

/// UDP client for talking to a running broker.
#[cfg(feature = "tokio")]
pub mod client {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    pub enum ClientError {
        #[error("socket error: {0}")]
        Io(#[from] std::io::Error),

        #[error(transparent)]
        Wire(#[from] WireError),

        #[error("no reply within {0:?}")]
        Timeout(Duration),
    }

    pub struct BrokerClient {
        socket: UdpSocket,
        broker: SocketAddr,
        timeout: Duration,
    }

    impl BrokerClient {
        /// Bind `local` (normally the broker's reply address) and target `broker`.
        pub async fn bind(local: SocketAddr, broker: SocketAddr) -> Result<Self, ClientError> {
            let socket = UdpSocket::bind(local).await?;
            Ok(Self {
                socket,
                broker,
                timeout: Duration::from_secs(5),
            })
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }

        pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
            Ok(self.socket.local_addr()?)
        }

        /// Send one command without waiting for a reply.
        pub async fn send(&self, command: &Command) -> Result<(), ClientError> {
            self.send_message(&command.to_message()).await
        }

        /// Send an arbitrary message, valid or not.
        pub async fn send_message(&self, message: &OscMessage) -> Result<(), ClientError> {
            self.socket.send_to(&message.encode(), self.broker).await?;
            Ok(())
        }

        /// Send several commands in a single bundle datagram.
        pub async fn send_bundle(&self, commands: &[Command]) -> Result<(), ClientError> {
            let packet = OscPacket::Bundle {
                time_tag: osc::IMMEDIATE,
                packets: commands
                    .iter()
                    .map(|c| OscPacket::Message(c.to_message()))
                    .collect(),
            };
            self.socket.send_to(&packet.encode(), self.broker).await?;
            Ok(())
        }

        /// Wait for the next reply datagram.
        pub async fn recv(&self) -> Result<Reply, ClientError> {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            let (len, _) = timeout(self.timeout, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| ClientError::Timeout(self.timeout))??;
            let message = OscMessage::decode(&buf[..len])?;
            Ok(Reply::parse(&message)?)
        }

        /// Send a command and wait for the next reply.
        pub async fn request(&self, command: &Command) -> Result<Reply, ClientError> {
            self.send(command).await?;
            self.recv().await
        }
    }
}

//! UDP receive loop for the broker.
//!
//! Each datagram is decoded inline; every contained message that parses
//! into a [`Command`] is handed to its own task. Nothing is awaited on the
//! receive path except the socket itself.

use crate::resolver::Resolver;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use vasset_config::{
    log_dispatch_debug, log_dispatch_error, log_dispatch_info, log_dispatch_warn,
};
use vasset_wire::{Command, OscPacket, Reply, MAX_DATAGRAM};

/// Shared state of the dispatcher's tasks
pub struct Dispatcher {
    resolver: Arc<Resolver>,
    reply_socket: Arc<UdpSocket>,
    reply_addr: SocketAddr,
    max_reply_size: usize,
    in_flight: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// `reply_socket` is a separate socket from the listener; replies always
    /// go to `reply_addr`.
    pub fn new(
        resolver: Arc<Resolver>,
        reply_socket: UdpSocket,
        reply_addr: SocketAddr,
        max_reply_size: usize,
        max_in_flight: Option<usize>,
    ) -> Self {
        Self {
            resolver,
            reply_socket: Arc::new(reply_socket),
            reply_addr,
            max_reply_size,
            in_flight: max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Decode one datagram and spawn a task per accepted command.
    ///
    /// Returns the number of tasks spawned.
    pub fn dispatch_datagram(&self, bytes: &[u8], peer: SocketAddr) -> usize {
        let packet = match OscPacket::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                log_dispatch_error!("Malformed datagram", peer = %peer, error = %e);
                return 0;
            }
        };

        let mut spawned = 0;
        for message in packet.into_messages() {
            match Command::parse(&message) {
                Ok(command) => {
                    log_dispatch_info!("Processing", address = %message.address, peer = %peer);
                    self.spawn(command);
                    spawned += 1;
                }
                Err(e) => {
                    log_dispatch_error!(
                        "Rejected message",
                        address = %message.address,
                        peer = %peer,
                        error = %e
                    );
                }
            }
        }
        spawned
    }

    fn spawn(&self, command: Command) {
        let resolver = Arc::clone(&self.resolver);
        let socket = Arc::clone(&self.reply_socket);
        let in_flight = self.in_flight.clone();
        let reply_addr = self.reply_addr;
        let max_reply_size = self.max_reply_size;

        tokio::spawn(async move {
            let _permit = match in_flight {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            let reply = resolver.handle(command).await;
            send_reply(&socket, reply_addr, &reply, max_reply_size).await;
        });
    }
}

/// Encode and send one reply; oversized replies and send errors are logged.
async fn send_reply(socket: &UdpSocket, to: SocketAddr, reply: &Reply, max_size: usize) {
    let bytes = match reply.encode(max_size) {
        Ok(bytes) => bytes,
        Err(e) => {
            log_dispatch_warn!("Dropping reply", address = reply.address(), error = %e);
            return;
        }
    };
    match socket.send_to(&bytes, to).await {
        Ok(_) => log_dispatch_debug!("Sent reply", address = reply.address(), to = %to),
        Err(e) => log_dispatch_error!("Reply send failed", to = %to, error = %e),
    }
}

/// Run the receive loop until the socket fails.
pub async fn run_listener(socket: UdpSocket, dispatcher: Dispatcher) -> Result<()> {
    log_dispatch_info!("Listening for commands", addr = %socket.local_addr()?);

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                dispatcher.dispatch_datagram(&buf[..len], peer);
            }
            Err(e) => {
                // e.g. ICMP port unreachable from an earlier send on some platforms
                log_dispatch_warn!("Receive failed", error = %e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFileCache, MockOrigin};
    use std::time::Duration;
    use tempfile::tempdir;
    use vasset_record::{AssetRecord, AssetType};
    use vasset_store::AssetStore;
    use vasset_wire::osc::OscMessage;

    async fn setup(
        max_reply_size: usize,
    ) -> (tempfile::TempDir, Arc<AssetStore>, Dispatcher, UdpSocket) {
        let temp = tempdir().unwrap();
        let store = Arc::new(AssetStore::open(temp.path().join("store"), true).unwrap());
        let resolver = Arc::new(Resolver::new(
            store.clone(),
            Arc::new(MockOrigin::default()),
            Arc::new(MockFileCache::default()),
        ));
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reply_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dispatcher = Dispatcher::new(
            resolver,
            reply_socket,
            receiver.local_addr().unwrap(),
            max_reply_size,
            Some(4),
        );
        (temp, store, dispatcher, receiver)
    }

    async fn recv_reply(socket: &UdpSocket) -> Option<Reply> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Reply::parse(&OscMessage::decode(&buf[..len]).ok()?).ok()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_accepted_command_replies() {
        let (_temp, store, dispatcher, receiver) = setup(8192).await;
        let asset = AssetRecord::new_inline(0x42, AssetType::Snippet, "s", vec![7]);
        store.put_asset_metadata(0x42, &asset).unwrap();

        let msg = Command::AssetFind { key: 0x42 }.to_message();
        assert_eq!(dispatcher.dispatch_datagram(&msg.encode(), peer()), 1);
        assert_eq!(
            recv_reply(&receiver).await,
            Some(Reply::asset_found("42", &asset))
        );
    }

    #[tokio::test]
    async fn test_rejected_messages_spawn_nothing() {
        let (_temp, _store, dispatcher, receiver) = setup(8192).await;
        let unknown = OscMessage::new("/fooBar").arg("1").encode();
        let excess = OscMessage::new("/assetFind").arg("1").arg("2").encode();
        let zero_key = OscMessage::new("/assetLoad").arg("0").encode();

        for bytes in [unknown, excess, zero_key, b"garbage".to_vec()] {
            assert_eq!(dispatcher.dispatch_datagram(&bytes, peer()), 0);
        }
        assert_eq!(recv_reply(&receiver).await, None);
    }

    #[tokio::test]
    async fn test_bundle_messages_dispatch_independently() {
        let (_temp, _store, dispatcher, receiver) = setup(8192).await;
        let bundle = OscPacket::Bundle {
            time_tag: vasset_wire::osc::IMMEDIATE,
            packets: vec![
                OscPacket::Message(Command::ListNext { key: 1, token: 0 }.to_message()),
                OscPacket::Message(OscMessage::new("/nope")),
                OscPacket::Message(Command::ListNext { key: 2, token: 0 }.to_message()),
            ],
        };
        assert_eq!(dispatcher.dispatch_datagram(&bundle.encode(), peer()), 2);

        let mut keys = vec![];
        for _ in 0..2 {
            match recv_reply(&receiver).await {
                Some(Reply::ListItems { key, .. }) => keys.push(key),
                other => panic!("unexpected reply {other:?}"),
            }
        }
        keys.sort();
        assert_eq!(keys, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_oversized_reply_is_dropped() {
        let (_temp, store, dispatcher, receiver) = setup(64).await;
        let asset = AssetRecord::new_inline(0x42, AssetType::Snippet, "big", vec![0; 256]);
        store.put_asset_metadata(0x42, &asset).unwrap();

        let msg = Command::AssetFind { key: 0x42 }.to_message();
        assert_eq!(dispatcher.dispatch_datagram(&msg.encode(), peer()), 1);
        assert_eq!(recv_reply(&receiver).await, None);
    }
}

//! Integration tests for vasset-broker
//!
//! These tests run a real broker on loopback UDP with in-memory origin and
//! file cache, and talk to it through the wire crate's client.

use std::sync::Arc;
use std::time::Duration;
use vasset_broker::resolver::Resolver;
use vasset_broker::testing::{MockFileCache, MockOrigin};
use vasset_broker::{open_store, Broker};
use vasset_config::testing::TestEnvironment;
use vasset_record::{AssetDraft, AssetRecord, AssetType, NO_KEY};
use vasset_store::AssetStore;
use vasset_wire::client::{BrokerClient, ClientError};
use vasset_wire::{Command, OscMessage, Reply};

struct Harness {
    _env: TestEnvironment,
    store: Arc<AssetStore>,
    origin: Arc<MockOrigin>,
    files: Arc<MockFileCache>,
    client: BrokerClient,
    server: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    async fn start() -> Self {
        let env = TestEnvironment::new().unwrap();
        let config = env.config();
        let store = Arc::new(open_store(&config.store).unwrap());
        let origin = Arc::new(MockOrigin::default());
        let files = Arc::new(MockFileCache::default());
        let resolver = Arc::new(Resolver::new(store.clone(), origin.clone(), files.clone()));

        let broker = Broker::bind(&config.network, resolver).await.unwrap();
        let server = tokio::spawn(broker.run());

        let client = BrokerClient::bind(env.reply_addr, env.listen_addr)
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(2));

        Self {
            _env: env,
            store,
            origin,
            files,
            client,
            server,
        }
    }

    /// Expect silence for a short while.
    async fn assert_no_reply(&self) {
        let quiet = BrokerClient::recv(&self.client);
        match tokio::time::timeout(Duration::from_millis(300), quiet).await {
            Err(_) | Ok(Err(ClientError::Timeout(_))) => {}
            Ok(other) => panic!("expected no reply, got {other:?}"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[tokio::test]
async fn test_asset_find_served_from_store() {
    let h = Harness::start().await;
    let asset = AssetRecord::new_inline(0x42, AssetType::Snippet, "sine", b"SinOsc.ar".to_vec());
    h.store.put_asset_metadata(0x42, &asset).unwrap();

    let reply = h
        .client
        .request(&Command::AssetFind { key: 0x42 })
        .await
        .unwrap();
    assert_eq!(reply, Reply::asset_found("42", &asset));
    assert_eq!(h.origin.calls(), 0);
}

#[tokio::test]
async fn test_asset_find_origin_hit_then_store_hit() {
    let h = Harness::start().await;
    let asset = AssetRecord::new_file(0x43, AssetType::Audio, "kick", 512, 1, "wav");
    h.origin.insert_asset(asset.clone());

    for _ in 0..2 {
        let reply = h
            .client
            .request(&Command::AssetFind { key: 0x43 })
            .await
            .unwrap();
        assert_eq!(reply, Reply::asset_found("43", &asset));
    }
    assert_eq!(h.origin.calls(), 1);
}

#[tokio::test]
async fn test_asset_find_miss_replies_error() {
    let h = Harness::start().await;
    let reply = h
        .client
        .request(&Command::AssetFind { key: 0xBEEF })
        .await
        .unwrap();
    assert_eq!(
        reply,
        Reply::AssetError {
            requested: "beef".into(),
            reason: "Failed to find asset associated with key.".into(),
        }
    );
}

#[tokio::test]
async fn test_asset_load_reports_cached_path() {
    let h = Harness::start().await;
    h.origin.insert_asset(AssetRecord::new_file(
        0x44,
        AssetType::Image,
        "logo",
        2048,
        2,
        "png",
    ));

    let reply = h
        .client
        .request(&Command::AssetLoad { key: 0x44 })
        .await
        .unwrap();
    assert_eq!(
        reply,
        Reply::AssetLoaded {
            requested: 0x44,
            resolved: 0x44,
            path: "/mock-cache/44.png".into(),
        }
    );
    assert_eq!(h.files.downloads(), vec![(0x44, 2048, 2, "png".to_string())]);
}

#[tokio::test]
async fn test_asset_add_string_round_trip() {
    let h = Harness::start().await;
    h.origin.set_next_key(0x42);
    let draft = AssetDraft {
        asset_type: AssetType::Snippet,
        name: "bass".into(),
        author: 0x1,
        deprecates: NO_KEY,
        list_ids: String::new(),
    };

    let reply = h
        .client
        .request(&Command::AssetAddString {
            serial: 7,
            draft,
            data: "{ Saw.ar(55) }".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::AssetAdded { serial: 7, key: 0x42 });
    assert_eq!(h.origin.inline_posts(), vec![b"{ Saw.ar(55) }".to_vec()]);
}

#[tokio::test]
async fn test_list_next_forwards_page() {
    let h = Harness::start().await;
    h.origin.set_list_page(0x9, "a1\nb2\n");
    let reply = h
        .client
        .request(&Command::ListNext { key: 0x9, token: 0 })
        .await
        .unwrap();
    assert_eq!(
        reply,
        Reply::ListItems {
            key: 0x9,
            items: "a1\nb2\n".into(),
        }
    );
}

#[tokio::test]
async fn test_invalid_commands_get_no_reply() {
    let h = Harness::start().await;
    h.client
        .send_message(&OscMessage::new("/fooBar").arg("1"))
        .await
        .unwrap();
    h.client
        .send_message(&OscMessage::new("/assetFind").arg("42").arg("43"))
        .await
        .unwrap();
    h.client
        .send_message(&OscMessage::new("/assetFind").arg(42))
        .await
        .unwrap();
    h.assert_no_reply().await;
    assert_eq!(h.origin.calls(), 0);

    // The broker is still serving afterwards
    let reply = h
        .client
        .request(&Command::ListNext { key: 0x1, token: 0 })
        .await
        .unwrap();
    assert!(matches!(reply, Reply::ListItems { key: 0x1, .. }));
}

#[tokio::test]
async fn test_bundle_yields_one_reply_per_command() {
    let h = Harness::start().await;
    h.origin.set_next_key(0x77);
    h.client
        .send_bundle(&[
            Command::ListAdd {
                name: "drums".into(),
            },
            Command::ListNext { key: 0x5, token: 0 },
        ])
        .await
        .unwrap();

    let mut replies = vec![h.client.recv().await.unwrap(), h.client.recv().await.unwrap()];
    replies.sort_by_key(|r| r.address());
    assert_eq!(
        replies,
        vec![
            Reply::ListFound {
                name: "drums".into(),
                key: 0x77,
            },
            Reply::ListItems {
                key: 0x5,
                items: String::new(),
            },
        ]
    );
}

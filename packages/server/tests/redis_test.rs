//! Behaviour of the Redis store scripts and the Pub/Sub relay against a live
//! Redis server.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RedisRoomStore の Lua スクリプト（作成・参加・追記・キック・条件付き削除）
//! - update_message_details の再読み込み付き置き換え
//! - RedisRoomEvents の PSUBSCRIBE 中継
//!
//! ### なぜこのテストが必要か
//! - 複数プロセス構成での原子性は Redis 側のスクリプトだけが保証している
//! - 削除済みルームへの書き込みや補助キーの TTL 漏れは単体テストでは検出できない
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加・追記・分類結果の反映・イベント中継
//! - 異常系：キック後の参加と送信、削除後の書き込み
//! - エッジケース：並行参加での admin 決定、上限での切り詰め
//!
//! 実行には Redis が必要: `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`

use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;
use redis::AsyncCommands;
use roomcast_server::{
    domain::{
        AppendOutcome, DisplayName, JoinOutcome, Member, Message, MessageAuthor, MessageDetails,
        MessageId, MessagePayload, RoomCode, RoomEvent, RoomEventPublisher, RoomMeta, RoomStore,
        SubscriptionRecv, Timestamp,
    },
    infrastructure::{
        publisher::{BroadcastRoomEvents, RedisRoomEvents},
        repository::RedisRoomStore,
    },
};
use tokio_util::sync::CancellationToken;

const TTL: Duration = Duration::from_secs(60);

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn code(value: &str) -> RoomCode {
    RoomCode::new(value.to_string()).unwrap()
}

fn name(value: &str) -> DisplayName {
    DisplayName::new(value.to_string()).unwrap()
}

fn member(value: &str, at: i64) -> Member {
    Member {
        name: name(value),
        avatar_url: format!("https://avatar/{value}"),
        joined_at: Timestamp::new(at),
    }
}

fn message(id: &str, sender: &str, at: i64) -> Message {
    Message::new(
        MessageId::new(id.to_string()).unwrap(),
        MessageAuthor {
            name: name(sender),
            avatar_url: String::new(),
        },
        MessagePayload::new(Some(format!("text {id}")), None).unwrap(),
        Timestamp::new(at),
    )
}

/// A store with a fresh room under `value`; leftovers of earlier runs are removed.
async fn store_with_room(value: &str) -> (RedisRoomStore, RoomCode) {
    let store = RedisRoomStore::new(&redis_url()).unwrap();
    let code = code(value);
    store.delete_room(&code).await.unwrap();
    let meta = RoomMeta::new(code.clone(), Timestamp::new(1_000), 60_000, false, None);
    assert!(store.create_room(&meta, TTL).await.unwrap());
    (store, code)
}

async fn raw_connection() -> redis::aio::MultiplexedConnection {
    redis::Client::open(redis_url())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_concurrent_joins_assign_admin_exactly_once() {
    // テスト項目: 並行して参加しても admin になるのは 1 人だけ
    // given (前提条件):
    let (store, code) = store_with_room("9101").await;
    let names: Vec<String> = (0..16).map(|i| format!("user{i}")).collect();

    let members: Vec<Member> = names.iter().map(|value| member(value, 2_000)).collect();

    // when (操作):
    let outcomes = join_all(
        members
            .iter()
            .map(|value| store.join_member(&code, value)),
    )
    .await;

    // then (期待する結果):
    let admins = outcomes
        .iter()
        .filter(|outcome| {
            matches!(
                outcome,
                Ok(JoinOutcome::Joined {
                    became_admin: true
                })
            )
        })
        .count();
    assert_eq!(admins, 1);
    let room = store.load_room(&code).await.unwrap().unwrap();
    assert_eq!(room.members.len(), names.len());
    let admin = room.meta.admin.unwrap();
    assert!(names.iter().any(|value| value == admin.as_str()));
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_kicked_name_cannot_join_or_send() {
    // テスト項目: キックされた名前は再参加もメッセージ送信もできない
    // given (前提条件):
    let (store, code) = store_with_room("9102").await;
    store.join_member(&code, &member("alice", 1)).await.unwrap();
    store.join_member(&code, &member("bob", 2)).await.unwrap();

    // when (操作):
    assert!(store.kick_member(&code, &name("bob")).await.unwrap());
    let rejoin = store.join_member(&code, &member("bob", 3)).await.unwrap();
    let send = store
        .append_message(&code, &message("m1", "bob", 4), 100)
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(rejoin, JoinOutcome::Kicked);
    assert_eq!(send, AppendOutcome::SenderKicked);
    let room = store.load_room(&code).await.unwrap().unwrap();
    assert!(room.member(&name("bob")).is_none());
    assert!(room.is_kicked(&name("bob")));
    assert!(room.messages.is_empty());
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_append_trims_to_cap_in_order() {
    // テスト項目: 追記後は上限まで古い順に切り詰められ、残りの順序は保たれる
    // given (前提条件):
    let (store, code) = store_with_room("9103").await;
    store.join_member(&code, &member("alice", 1)).await.unwrap();

    // when (操作):
    for i in 0..7 {
        let outcome = store
            .append_message(&code, &message(&format!("m{i}"), "alice", 10 + i), 4)
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);
    }

    // then (期待する結果):
    let room = store.load_room(&code).await.unwrap().unwrap();
    let ids: Vec<&str> = room.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m3", "m4", "m5", "m6"]);
    assert_eq!(room.members[0].joined_at, Timestamp::new(16));
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_writes_after_delete_create_no_keys() {
    // テスト項目: 削除後の書き込みはどのキーも作らない
    // given (前提条件):
    let (store, code) = store_with_room("9104").await;
    store.delete_room(&code).await.unwrap();

    // when (操作):
    let join = store.join_member(&code, &member("alice", 1)).await.unwrap();
    let append = store
        .append_message(&code, &message("m1", "alice", 2), 100)
        .await
        .unwrap();
    let typing = store
        .set_typing(&code, &name("alice"), Timestamp::new(3))
        .await
        .unwrap();
    let kicked = store.kick_member(&code, &name("bob")).await.unwrap();
    let pinned = store.set_pinned(&code, None).await.unwrap();

    // then (期待する結果):
    assert_eq!(join, JoinOutcome::RoomMissing);
    assert_eq!(append, AppendOutcome::RoomMissing);
    assert!(!typing && !kicked && !pinned);
    let mut conn = raw_connection().await;
    let leftovers: Vec<String> = conn.keys("room:9104*").await.unwrap();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_aux_keys_follow_room_ttl() {
    // テスト項目: 補助キーはメタデータキーの TTL を引き継ぐ
    // given (前提条件):
    let (store, code) = store_with_room("9105").await;

    // when (操作):
    store.join_member(&code, &member("alice", 1)).await.unwrap();
    store
        .append_message(&code, &message("m1", "alice", 2), 100)
        .await
        .unwrap();
    store
        .set_typing(&code, &name("alice"), Timestamp::new(3))
        .await
        .unwrap();
    store.kick_member(&code, &name("mallory")).await.unwrap();

    // then (期待する結果):
    let mut conn = raw_connection().await;
    let meta_ttl: i64 = conn.pttl("room:9105").await.unwrap();
    assert!(meta_ttl > 0);
    for suffix in ["messages", "users", "seen", "typing", "kicked"] {
        let ttl: i64 = conn.pttl(format!("room:9105:{suffix}")).await.unwrap();
        assert!(ttl > 0 && ttl <= meta_ttl, "{suffix} has TTL {ttl}");
    }
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_conditional_delete_spares_recreated_room() {
    // テスト項目: 条件付き削除は同じコードで作り直されたルームを消さない
    // given (前提条件):
    let (store, code) = store_with_room("9106").await;
    store.delete_room(&code).await.unwrap();
    let newer = RoomMeta::new(code.clone(), Timestamp::new(5_000), 60_000, false, None);
    store.create_room(&newer, TTL).await.unwrap();

    // when (操作):
    let stale = store
        .delete_room_if_created_at(&code, Timestamp::new(1_000))
        .await
        .unwrap();

    // then (期待する結果):
    assert!(!stale);
    let meta = store.load_meta(&code).await.unwrap().unwrap();
    assert_eq!(meta.created_at, Timestamp::new(5_000));
    assert!(
        store
            .delete_room_if_created_at(&code, Timestamp::new(5_000))
            .await
            .unwrap()
    );
    assert!(store.load_meta(&code).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_message_details_survive_concurrent_appends() {
    // テスト項目: 追記と並行しても分類結果が対象のメッセージにだけ反映される
    // given (前提条件):
    let (store, code) = store_with_room("9107").await;
    store
        .append_message(&code, &message("target", "alice", 1), 100)
        .await
        .unwrap();
    let details = MessageDetails {
        language: Some("Rust".to_string()),
        explanation: None,
    };
    let target = MessageId::new("target".to_string()).unwrap();

    // when (操作):
    let appends = join_all((0..8).map(|i| {
        let store = &store;
        let code = &code;
        async move {
            store
                .append_message(code, &message(&format!("m{i}"), "bob", 10 + i), 100)
                .await
                .unwrap()
        }
    }));
    let (_, updated) = tokio::join!(
        appends,
        store.update_message_details(&code, &target, &details)
    );

    // then (期待する結果):
    assert!(updated.unwrap());
    let room = store.load_room(&code).await.unwrap().unwrap();
    assert_eq!(room.messages.len(), 9);
    assert_eq!(room.message(&target).unwrap().language.as_deref(), Some("Rust"));
    assert!(
        room.messages
            .iter()
            .filter(|m| m.id != target)
            .all(|m| m.language.is_none())
    );
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_relay_delivers_published_events_to_local_subscribers() {
    // テスト項目: Redis に配信したイベントが中継されてプロセス内の購読者に届く
    // given (前提条件):
    let local = Arc::new(BroadcastRoomEvents::default());
    let events = RedisRoomEvents::new(&redis_url(), local.clone()).unwrap();
    let cancel = CancellationToken::new();
    let relay = events.spawn_relay(cancel.clone());
    let code = code("9108");
    let mut subscription = events.subscribe(&code).await.unwrap();

    // when (操作): 中継タスクの購読が始まるまで配信を繰り返す
    let deleted = RoomEvent::Deleted { code: code.clone() };
    let mut relays = 0;
    for _ in 0..50 {
        relays = events.publish(deleted.clone()).await.unwrap();
        if relays > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // then (期待する結果):
    assert!(relays >= 1);
    let received = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap();
    assert_eq!(received, SubscriptionRecv::Event(deleted));

    cancel.cancel();
    relay.await.unwrap();
}

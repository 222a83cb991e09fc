//! Redis room store.
//!
//! Key layout per room (every key follows the metadata key's TTL):
//!
//! ```text
//! room:{code}            hash  code, createdAt, expiresAt, isPrivate, passwordHash, admin, pinnedMessageId
//! room:{code}:messages   list  message JSON, oldest first, capped
//! room:{code}:users      hash  name -> avatarUrl
//! room:{code}:seen       hash  name -> joinedAt (ms)
//! room:{code}:typing     hash  name -> last typed (ms)
//! room:{code}:kicked     set   names
//! ```
//!
//! Conditional primitives are Lua scripts, so each one is a single atomic
//! step on the server and none of them writes once the metadata key is gone.

use std::{collections::HashMap, sync::LazyLock, time::Duration};

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, RedisError, Script};

use crate::domain::{
    AppendOutcome, DisplayName, JoinOutcome, Member, Message, MessageDetails, MessageId,
    PasswordHash, Room, RoomCode, RoomMeta, RoomStore, StoreError, Timestamp,
};

/// Matches metadata keys only (`room:` followed by exactly four characters)
const META_KEY_PATTERN: &str = "room:????";

const DETAILS_CAS_ATTEMPTS: usize = 3;

const PRELUDE: &str = r#"
local function follow_ttl(key)
  local ttl = redis.call('PTTL', KEYS[1])
  if ttl > 0 then redis.call('PEXPIRE', key, ttl) end
end
"#;

static CREATE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('DEL', KEYS[2], KEYS[3], KEYS[4], KEYS[5], KEYS[6])
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
redis.call('PEXPIRE', KEYS[1], ARGV[1])
return 1
"#,
    )
});

static APPEND_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    with_prelude(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
if redis.call('SISMEMBER', KEYS[6], ARGV[1]) == 1 then return 2 end
redis.call('RPUSH', KEYS[2], ARGV[2])
redis.call('LTRIM', KEYS[2], -tonumber(ARGV[3]), -1)
follow_ttl(KEYS[2])
redis.call('HDEL', KEYS[5], ARGV[1])
if redis.call('HEXISTS', KEYS[3], ARGV[1]) == 1 then
  redis.call('HSET', KEYS[4], ARGV[1], ARGV[4])
end
return 1
"#,
    )
});

static JOIN_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    with_prelude(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return {0, 0} end
if redis.call('SISMEMBER', KEYS[6], ARGV[1]) == 1 then return {2, 0} end
local status = 3
if redis.call('HSETNX', KEYS[3], ARGV[1], ARGV[2]) == 1 then status = 1 end
redis.call('HSET', KEYS[4], ARGV[1], ARGV[3])
follow_ttl(KEYS[3])
follow_ttl(KEYS[4])
local admin = redis.call('HSETNX', KEYS[1], 'admin', ARGV[1])
return {status, admin}
"#,
    )
});

static TYPING_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    with_prelude(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
redis.call('HSET', KEYS[5], ARGV[1], ARGV[2])
follow_ttl(KEYS[5])
if redis.call('HEXISTS', KEYS[3], ARGV[1]) == 1 then
  redis.call('HSET', KEYS[4], ARGV[1], ARGV[2])
end
return 1
"#,
    )
});

static REMOVE_MEMBER_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
redis.call('HDEL', KEYS[5], ARGV[1])
return 1
"#,
    )
});

static KICK_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    with_prelude(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
redis.call('SADD', KEYS[6], ARGV[1])
follow_ttl(KEYS[6])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
redis.call('HDEL', KEYS[5], ARGV[1])
return 1
"#,
    )
});

static PIN_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
if ARGV[1] == '' then
  redis.call('HDEL', KEYS[1], 'pinnedMessageId')
else
  redis.call('HSET', KEYS[1], 'pinnedMessageId', ARGV[1])
end
return 1
"#,
    )
});

/// Swap one list element by value; the list may have shifted since it was read.
static REPLACE_MESSAGE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
local items = redis.call('LRANGE', KEYS[2], 0, -1)
for i, item in ipairs(items) do
  if item == ARGV[1] then
    redis.call('LSET', KEYS[2], i - 1, ARGV[2])
    return 1
  end
end
return 0
"#,
    )
});

static DELETE_IF_CREATED_AT_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('HGET', KEYS[1], 'createdAt') == ARGV[1] then
  redis.call('DEL', KEYS[1], KEYS[2], KEYS[3], KEYS[4], KEYS[5], KEYS[6])
  return 1
end
return 0
"#,
    )
});

fn with_prelude(body: &str) -> Script {
    Script::new(&format!("{PRELUDE}{body}"))
}

/// Every key of one room
struct RoomKeys {
    meta: String,
    messages: String,
    users: String,
    seen: String,
    typing: String,
    kicked: String,
}

impl RoomKeys {
    fn new(code: &RoomCode) -> Self {
        let meta = format!("room:{}", code.as_str());
        Self {
            messages: format!("{meta}:messages"),
            users: format!("{meta}:users"),
            seen: format!("{meta}:seen"),
            typing: format!("{meta}:typing"),
            kicked: format!("{meta}:kicked"),
            meta,
        }
    }

    fn all(&self) -> Vec<&str> {
        vec![
            &self.meta,
            &self.messages,
            &self.users,
            &self.seen,
            &self.typing,
            &self.kicked,
        ]
    }

    fn invocation<'a>(&self, script: &'a Script) -> redis::ScriptInvocation<'a> {
        let mut invocation = script.prepare_invoke();
        for key in self.all() {
            invocation.key(key);
        }
        invocation
    }
}

/// Redis Room Store 実装
pub struct RedisRoomStore {
    pool: Pool,
}

impl RedisRoomStore {
    /// Build a pooled store. No connection is made until the first command.
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }
}

fn command_error(err: RedisError) -> StoreError {
    if err.is_io_error() || err.is_timeout() || err.is_connection_refusal() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

fn corrupt(code: &RoomCode, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        code: code.as_str().to_string(),
        reason: reason.to_string(),
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

fn meta_fields(meta: &RoomMeta) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("code", meta.code.as_str().to_string()),
        ("createdAt", meta.created_at.value().to_string()),
        ("expiresAt", meta.expires_at.value().to_string()),
        ("isPrivate", if meta.is_private { "1" } else { "0" }.to_string()),
    ];
    if let Some(hash) = &meta.password_hash {
        fields.push(("passwordHash", hash.as_str().to_string()));
    }
    if let Some(admin) = &meta.admin {
        fields.push(("admin", admin.as_str().to_string()));
    }
    if let Some(pinned) = &meta.pinned_message_id {
        fields.push(("pinnedMessageId", pinned.as_str().to_string()));
    }
    fields
}

fn parse_meta(
    code: &RoomCode,
    mut fields: HashMap<String, String>,
) -> Result<Option<RoomMeta>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }
    let millis = |fields: &HashMap<String, String>, key: &str| -> Result<Timestamp, StoreError> {
        fields
            .get(key)
            .ok_or_else(|| corrupt(code, format!("missing {key}")))?
            .parse::<i64>()
            .map(Timestamp::new)
            .map_err(|err| corrupt(code, format!("{key}: {err}")))
    };
    let created_at = millis(&fields, "createdAt")?;
    let expires_at = millis(&fields, "expiresAt")?;
    let is_private = fields.get("isPrivate").is_some_and(|flag| flag == "1");
    let password_hash = fields
        .remove("passwordHash")
        .map(PasswordHash::new)
        .transpose()
        .map_err(|err| corrupt(code, err))?;
    let admin = fields
        .remove("admin")
        .map(DisplayName::new)
        .transpose()
        .map_err(|err| corrupt(code, err))?;
    let pinned_message_id = fields
        .remove("pinnedMessageId")
        .map(MessageId::new)
        .transpose()
        .map_err(|err| corrupt(code, err))?;

    Ok(Some(RoomMeta {
        code: code.clone(),
        created_at,
        expires_at,
        is_private,
        password_hash,
        admin,
        pinned_message_id,
    }))
}

fn encode_message(code: &RoomCode, message: &Message) -> Result<String, StoreError> {
    serde_json::to_string(message).map_err(|err| corrupt(code, err))
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn create_room(&self, meta: &RoomMeta, ttl: Duration) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(&meta.code);
        let mut invocation = keys.invocation(&CREATE_SCRIPT);
        invocation.arg(ttl_millis(ttl));
        for (field, value) in meta_fields(meta) {
            invocation.arg(field).arg(value);
        }
        let mut conn = self.connection().await?;
        let created: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(created == 1)
    }

    async fn load_room(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        let keys = RoomKeys::new(code);
        let mut conn = self.connection().await?;
        #[allow(clippy::type_complexity)]
        let (meta, messages, users, seen, typing, kicked): (
            HashMap<String, String>,
            Vec<String>,
            HashMap<String, String>,
            HashMap<String, i64>,
            HashMap<String, i64>,
            Vec<String>,
        ) = redis::pipe()
            .atomic()
            .hgetall(&keys.meta)
            .lrange(&keys.messages, 0, -1)
            .hgetall(&keys.users)
            .hgetall(&keys.seen)
            .hgetall(&keys.typing)
            .smembers(&keys.kicked)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        let Some(meta) = parse_meta(code, meta)? else {
            return Ok(None);
        };
        let messages = messages
            .iter()
            .map(|raw| serde_json::from_str::<Message>(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| corrupt(code, err))?;
        let members = users
            .into_iter()
            .map(|(name, avatar_url)| {
                let joined_at = Timestamp::new(seen.get(&name).copied().unwrap_or_default());
                DisplayName::new(name).map(|name| Member {
                    name,
                    avatar_url,
                    joined_at,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| corrupt(code, err))?;
        let typing = typing
            .into_iter()
            .map(|(name, at)| DisplayName::new(name).map(|name| (name, Timestamp::new(at))))
            .collect::<Result<_, _>>()
            .map_err(|err| corrupt(code, err))?;
        let kicked = kicked
            .into_iter()
            .map(DisplayName::new)
            .collect::<Result<_, _>>()
            .map_err(|err| corrupt(code, err))?;

        Ok(Some(Room {
            meta,
            messages,
            members,
            typing,
            kicked,
        }))
    }

    async fn load_meta(&self, code: &RoomCode) -> Result<Option<RoomMeta>, StoreError> {
        let keys = RoomKeys::new(code);
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(&keys.meta).await.map_err(command_error)?;
        parse_meta(code, fields)
    }

    async fn append_message(
        &self,
        code: &RoomCode,
        message: &Message,
        max_messages: usize,
    ) -> Result<AppendOutcome, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&APPEND_SCRIPT);
        invocation
            .arg(message.user.name.as_str())
            .arg(encode_message(code, message)?)
            .arg(max_messages.max(1))
            .arg(message.timestamp.value());
        let mut conn = self.connection().await?;
        let status: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(match status {
            1 => AppendOutcome::Appended,
            2 => AppendOutcome::SenderKicked,
            _ => AppendOutcome::RoomMissing,
        })
    }

    async fn update_message_details(
        &self,
        code: &RoomCode,
        message_id: &MessageId,
        details: &MessageDetails,
    ) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(code);
        let mut conn = self.connection().await?;
        for _ in 0..DETAILS_CAS_ATTEMPTS {
            let items: Vec<String> = conn
                .lrange(&keys.messages, 0, -1)
                .await
                .map_err(command_error)?;
            let found = items.into_iter().find_map(|raw| {
                serde_json::from_str::<Message>(&raw)
                    .ok()
                    .filter(|message| &message.id == message_id)
                    .map(|message| (raw, message))
            });
            let Some((old, mut message)) = found else {
                return Ok(false);
            };
            message.apply_details(details);

            let mut invocation = keys.invocation(&REPLACE_MESSAGE_SCRIPT);
            invocation.arg(old).arg(encode_message(code, &message)?);
            let replaced: i64 = invocation
                .invoke_async(&mut conn)
                .await
                .map_err(command_error)?;
            if replaced == 1 {
                return Ok(true);
            }
            tracing::debug!(
                "Message '{}' in room '{}' changed during details update, re-reading",
                message_id,
                code
            );
        }
        Ok(false)
    }

    async fn set_typing(
        &self,
        code: &RoomCode,
        name: &DisplayName,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&TYPING_SCRIPT);
        invocation.arg(name.as_str()).arg(at.value());
        let mut conn = self.connection().await?;
        let updated: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(updated == 1)
    }

    async fn join_member(
        &self,
        code: &RoomCode,
        member: &Member,
    ) -> Result<JoinOutcome, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&JOIN_SCRIPT);
        invocation
            .arg(member.name.as_str())
            .arg(member.avatar_url.as_str())
            .arg(member.joined_at.value());
        let mut conn = self.connection().await?;
        let (status, admin): (i64, i64) = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        let became_admin = admin == 1;
        Ok(match status {
            1 => JoinOutcome::Joined { became_admin },
            2 => JoinOutcome::Kicked,
            3 => JoinOutcome::Refreshed { became_admin },
            _ => JoinOutcome::RoomMissing,
        })
    }

    async fn remove_member(
        &self,
        code: &RoomCode,
        name: &DisplayName,
    ) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&REMOVE_MEMBER_SCRIPT);
        invocation.arg(name.as_str());
        let mut conn = self.connection().await?;
        let removed: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(removed == 1)
    }

    async fn kick_member(&self, code: &RoomCode, name: &DisplayName) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&KICK_SCRIPT);
        invocation.arg(name.as_str());
        let mut conn = self.connection().await?;
        let kicked: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(kicked == 1)
    }

    async fn set_pinned(
        &self,
        code: &RoomCode,
        message_id: Option<MessageId>,
    ) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&PIN_SCRIPT);
        invocation.arg(message_id.map(MessageId::into_string).unwrap_or_default());
        let mut conn = self.connection().await?;
        let pinned: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(pinned == 1)
    }

    async fn delete_room(&self, code: &RoomCode) -> Result<(), StoreError> {
        let keys = RoomKeys::new(code);
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(keys.all())
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn delete_room_if_created_at(
        &self,
        code: &RoomCode,
        created_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let keys = RoomKeys::new(code);
        let mut invocation = keys.invocation(&DELETE_IF_CREATED_AT_SCRIPT);
        invocation.arg(created_at.value().to_string());
        let mut conn = self.connection().await?;
        let deleted: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(deleted == 1)
    }

    async fn room_codes(&self) -> Result<Vec<RoomCode>, StoreError> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut codes = Vec::new();
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(META_KEY_PATTERN)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;
            codes.extend(
                keys.into_iter()
                    .filter_map(|key| key.strip_prefix("room:").map(str::to_string))
                    .filter_map(|raw| RoomCode::new(raw).ok()),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode::new("5150".to_string()).unwrap()
    }

    #[test]
    fn test_room_keys_share_the_meta_prefix() {
        // テスト項目: ルームの全キーがメタデータキーを接頭辞に持つ
        // given (前提条件):
        let keys = RoomKeys::new(&code());

        // when (操作):
        let all = keys.all();

        // then (期待する結果):
        assert_eq!(all[0], "room:5150");
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|key| key.starts_with("room:5150")));
        assert_eq!(keys.kicked, "room:5150:kicked");
    }

    #[test]
    fn test_meta_fields_round_trip_through_parse() {
        // テスト項目: メタデータのハッシュフィールドから RoomMeta を復元できる
        // given (前提条件):
        let mut meta = RoomMeta::new(
            code(),
            Timestamp::new(1_000),
            7_200_000,
            true,
            Some(PasswordHash::new("salt$digest".to_string()).unwrap()),
        );
        meta.admin = Some(DisplayName::new("alice".to_string()).unwrap());

        // when (操作):
        let fields: HashMap<String, String> = meta_fields(&meta)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = parse_meta(&code(), fields).unwrap();

        // then (期待する結果):
        assert_eq!(parsed, Some(meta));
    }

    #[test]
    fn test_parse_meta_of_missing_key_is_none() {
        // テスト項目: 空のハッシュ（キーが存在しない）は None になる
        // given (前提条件) / when (操作):
        let parsed = parse_meta(&code(), HashMap::new()).unwrap();

        // then (期待する結果):
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_meta_reports_corrupt_timestamps() {
        // テスト項目: 不正なタイムスタンプは Corrupt エラーとして報告される
        // given (前提条件):
        let fields: HashMap<String, String> = [
            ("createdAt".to_string(), "soon".to_string()),
            ("expiresAt".to_string(), "1".to_string()),
        ]
        .into_iter()
        .collect();

        // when (操作):
        let result = parse_meta(&code(), fields);

        // then (期待する結果):
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}

//! Redis Stack backed cache
//!
//! Chats are RedisJSON documents searched through a RediSearch index,
//! contact lists are sorted sets scored by last activity.

use super::decode;
use crate::settings::StoreConfig;
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use parley_core::keys::{self, MAX_CREATE_ATTEMPTS};
use parley_core::ordering::{rank_contacts, sort_chats};
use parley_core::query::check_username;
use parley_core::{
    Cache, Chat, ChatKeyGenerator, ChatRangeQuery, Clock, ContactList, Document, ParleyError,
    Result, SystemClock,
};
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{Cmd, FromRedisValue, IntoConnectionInfo, RedisError, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RedisCache<C = ConnectionManager> {
    conn: C,
    clock: Arc<dyn Clock>,
    keys: ChatKeyGenerator,
    command_timeout: Duration,
    search_limit: usize,
}

impl RedisCache<ConnectionManager> {
    /// Open a multiplexed connection to the store.
    pub async fn connect(config: &StoreConfig) -> AnyResult<Self> {
        let (host, port) = split_address(&config.address)?;
        let mut info = (host, port)
            .into_connection_info()
            .context("Invalid store address")?;
        info.redis.db = config.db;
        info.redis.password = config.password().map(str::to_string);

        info!("Connecting to store at {} (db {})", config.address, config.db);
        let client = redis::Client::open(info).context("Invalid store connection info")?;

        let command_timeout = Duration::from_millis(config.command_timeout_ms);
        let conn = tokio::time::timeout(command_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out connecting to {}", config.address))?
            .with_context(|| format!("Failed to connect to store at {}", config.address))?;

        info!("Store connection established");
        Ok(Self::with_connection(conn, config))
    }
}

impl<C> RedisCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    pub fn with_connection(conn: C, config: &StoreConfig) -> Self {
        Self {
            conn,
            clock: Arc::new(SystemClock),
            keys: ChatKeyGenerator::new(),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            search_limit: config.search_limit.max(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create the chat search index. An index that already exists counts
    /// as success.
    pub async fn create_chat_index(&self) -> Result<()> {
        match self.query::<Value>(&create_index_cmd()).await? {
            Ok(_) => {
                info!("Chat index {} created", keys::CHAT_INDEX);
                Ok(())
            }
            Err(e) if is_index_exists(&e) => {
                info!("Chat index {} already exists", keys::CHAT_INDEX);
                Ok(())
            }
            Err(e) => Err(store_error(e)),
        }
    }

    async fn set_contact(&self, username: &str, contact: &str, score: i64) -> Result<()> {
        self.run::<i64>(&add_contact_cmd(username, contact, score))
            .await
            .map(|_| ())
    }

    /// Store `body` under a fresh chat key, never replacing an existing one.
    async fn insert_chat_document(&self, body: &str) -> Result<String> {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let key = self.keys.next_key(self.clock.as_ref());

            match self.run::<Value>(&insert_chat_cmd(&key, body)).await? {
                Value::Okay => return Ok(key),
                Value::Status(status) if status == "OK" => return Ok(key),
                Value::Nil => {
                    warn!(key = %key, attempt, "Chat key already taken, trying the next one");
                }
                other => {
                    return Err(ParleyError::Store(format!(
                        "unexpected JSON.SET reply: {:?}",
                        other
                    )))
                }
            }
        }

        Err(ParleyError::KeyCollision(MAX_CREATE_ATTEMPTS))
    }

    /// Every document matching `query`, fetched `search_limit` rows at a time
    /// until the reported total is reached.
    async fn search_all(&self, query: &str) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;

        loop {
            let reply = self
                .run::<Value>(&search_cmd(query, offset, self.search_limit))
                .await?;
            let page = decode::search_documents(reply)?;
            let Some(total) = page.first().map(|doc| doc.total) else {
                break;
            };

            offset += page.len();
            // Rows shift between pages when chats land mid-scan
            docs.extend(page.into_iter().filter(|doc| seen.insert(doc.id.clone())));

            if offset as i64 >= total {
                break;
            }
            debug!(offset, total, "Fetching next search page");
        }

        Ok(docs)
    }

    /// Run a command under the deadline, keeping the store's own error.
    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<redis::RedisResult<T>> {
        let mut conn = self.conn.clone();
        tokio::time::timeout(self.command_timeout, cmd.query_async::<_, T>(&mut conn))
            .await
            .map_err(|_| ParleyError::Timeout(self.command_timeout.as_millis() as u64))
    }

    async fn run<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        self.query(cmd).await?.map_err(store_error)
    }
}

#[async_trait]
impl<C> Cache for RedisCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn update_contact_list(&self, username: &str, contact: &str) -> Result<()> {
        self.set_contact(username, contact, self.clock.now_secs())
            .await
    }

    async fn create_chat(&self, chat: &Chat) -> Result<String> {
        check_username(&chat.from)?;
        check_username(&chat.to)?;

        let mut chat = chat.clone();
        chat.id = None;

        let body = serde_json::to_string(&chat)?;
        let key = self.insert_chat_document(&body).await.map_err(|e| {
            warn!("Failed to store chat {} -> {}: {}", chat.from, chat.to, e);
            e
        })?;
        debug!(key = %key, "Stored chat");

        for (owner, contact) in [(&chat.from, &chat.to), (&chat.to, &chat.from)] {
            if let Err(e) = self.set_contact(owner, contact, chat.timestamp).await {
                warn!(
                    "Chat {} stored but contact list of {} not updated: {}",
                    key, owner, e
                );
            }
        }

        Ok(key)
    }

    async fn fetch_chat_between(
        &self,
        user_a: &str,
        user_b: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Chat>> {
        let query = ChatRangeQuery::new(user_a, user_b, from_ts, to_ts)?;
        let docs = self.search_all(&query.to_search_query()).await?;

        // The tag query also matches a user talking to themself
        let mut chats: Vec<Chat> = decode::chats(docs)?
            .into_iter()
            .filter(|chat| chat.is_between(user_a, user_b))
            .collect();
        sort_chats(&mut chats);
        Ok(chats)
    }

    async fn fetch_contact_list(&self, username: &str) -> Result<Vec<ContactList>> {
        let reply = self.run::<Value>(&contacts_cmd(username)).await?;
        let mut contacts = decode::scored_members(reply)?;
        rank_contacts(&mut contacts);
        Ok(contacts)
    }

    async fn ping(&self) -> Result<()> {
        self.run::<String>(&redis::cmd("PING")).await.map(|_| ())
    }
}

/// `FT.CREATE idx#chats ON JSON PREFIX 1 chat# SCHEMA
/// $.from AS from TAG $.to AS to TAG $.timestamp AS timestamp NUMERIC SORTABLE`
fn create_index_cmd() -> Cmd {
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(keys::CHAT_INDEX)
        .arg("ON")
        .arg("JSON")
        .arg("PREFIX")
        .arg(1)
        .arg(keys::CHAT_KEY_PREFIX)
        .arg("SCHEMA")
        .arg("$.from")
        .arg("AS")
        .arg("from")
        .arg("TAG")
        .arg("$.to")
        .arg("AS")
        .arg("to")
        .arg("TAG")
        .arg("$.timestamp")
        .arg("AS")
        .arg("timestamp")
        .arg("NUMERIC")
        .arg("SORTABLE");
    cmd
}

/// Create-if-absent write of a chat document
fn insert_chat_cmd(key: &str, body: &str) -> Cmd {
    let mut cmd = redis::cmd("JSON.SET");
    cmd.arg(key).arg("$").arg(body).arg("NX");
    cmd
}

fn add_contact_cmd(username: &str, contact: &str, score: i64) -> Cmd {
    let mut cmd = redis::cmd("ZADD");
    cmd.arg(keys::contact_list_key(username))
        .arg(score)
        .arg(contact);
    cmd
}

fn search_cmd(query: &str, offset: usize, limit: usize) -> Cmd {
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(keys::CHAT_INDEX)
        .arg(query)
        .arg("SORTBY")
        .arg("timestamp")
        .arg("DESC")
        .arg("LIMIT")
        .arg(offset)
        .arg(limit);
    cmd
}

fn contacts_cmd(username: &str) -> Cmd {
    let mut cmd = redis::cmd("ZRANGE");
    cmd.arg(keys::contact_list_key(username))
        .arg(0)
        .arg(-1)
        .arg("REV")
        .arg("WITHSCORES");
    cmd
}

fn split_address(address: &str) -> AnyResult<(String, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Store address must be host:port, got {}", address))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid store port in {}", address))?;
    Ok((host.to_string(), port))
}

/// The server replies `-Index already exists`
fn is_index_exists(e: &RedisError) -> bool {
    e.to_string().contains("already exists")
}

fn store_error(e: RedisError) -> ParleyError {
    ParleyError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ManualClock;
    use redis::ErrorKind;
    use redis_test::{MockCmd, MockRedisConnection};

    #[test]
    fn test_split_address() {
        assert_eq!(
            split_address("localhost:6379").unwrap(),
            ("localhost".to_string(), 6379)
        );
        assert!(split_address("localhost").is_err());
        assert!(split_address("localhost:redis").is_err());
    }

    fn packed(cmd: &Cmd) -> String {
        String::from_utf8(cmd.get_packed_command()).unwrap()
    }

    fn literal(name: &str, args: &[&str]) -> String {
        let mut cmd = redis::cmd(name);
        for arg in args {
            cmd.arg(*arg);
        }
        packed(&cmd)
    }

    #[test]
    fn test_command_arguments() {
        assert_eq!(
            packed(&create_index_cmd()),
            literal("FT.CREATE", &[
                "idx#chats", "ON", "JSON", "PREFIX", "1", "chat#", "SCHEMA", "$.from", "AS",
                "from", "TAG", "$.to", "AS", "to", "TAG", "$.timestamp", "AS", "timestamp",
                "NUMERIC", "SORTABLE",
            ])
        );
        assert_eq!(
            packed(&insert_chat_cmd("chat#7", "{}")),
            literal("JSON.SET", &["chat#7", "$", "{}", "NX"])
        );
        assert_eq!(
            packed(&add_contact_cmd("alice", "bob", 1700)),
            literal("ZADD", &["contacts:alice", "1700", "bob"])
        );
        assert_eq!(
            packed(&search_cmd("@from:{a|b}", 20, 10)),
            literal("FT.SEARCH", &[
                "idx#chats",
                "@from:{a|b}",
                "SORTBY",
                "timestamp",
                "DESC",
                "LIMIT",
                "20",
                "10",
            ])
        );
        assert_eq!(
            packed(&contacts_cmd("alice")),
            literal("ZRANGE", &["contacts:alice", "0", "-1", "REV", "WITHSCORES"])
        );
    }

    fn data(s: &str) -> Value {
        Value::Data(s.as_bytes().to_vec())
    }

    fn search_row(chat: &Chat, id: &str) -> [Value; 2] {
        let body = serde_json::to_string(chat).unwrap();
        [data(id), Value::Bulk(vec![data("$"), data(&body)])]
    }

    fn search_reply(total: i64, rows: &[(&Chat, &str)]) -> Value {
        let mut reply = vec![Value::Int(total)];
        for (chat, id) in rows {
            reply.extend(search_row(chat, id));
        }
        Value::Bulk(reply)
    }

    fn refused() -> RedisError {
        RedisError::from((ErrorKind::IoError, "connection refused"))
    }

    fn mock_cache(
        commands: Vec<MockCmd>,
        search_limit: usize,
    ) -> RedisCache<MockRedisConnection> {
        let config = StoreConfig {
            search_limit,
            ..StoreConfig::default()
        };
        RedisCache::with_connection(MockRedisConnection::new(commands), &config)
            .with_clock(Arc::new(ManualClock::new(5_000)))
    }

    #[tokio::test]
    async fn test_create_chat_skips_taken_key() {
        let chat = Chat::at("alice", "bob", "hi", 1234);
        let body = serde_json::to_string(&chat).unwrap();
        let cache = mock_cache(
            vec![
                MockCmd::new(insert_chat_cmd("chat#5000", &body), Ok(Value::Nil)),
                MockCmd::new(insert_chat_cmd("chat#5001", &body), Ok(Value::Okay)),
                MockCmd::new(add_contact_cmd("alice", "bob", 1234), Ok(Value::Int(1))),
                MockCmd::new(add_contact_cmd("bob", "alice", 1234), Ok(Value::Int(1))),
            ],
            10,
        );

        assert_eq!(cache.create_chat(&chat).await.unwrap(), "chat#5001");
    }

    #[tokio::test]
    async fn test_create_chat_gives_up_after_max_attempts() {
        let chat = Chat::at("alice", "bob", "hi", 1);
        let body = serde_json::to_string(&chat).unwrap();
        let commands = (0..MAX_CREATE_ATTEMPTS as i64)
            .map(|n| {
                MockCmd::new(
                    insert_chat_cmd(&keys::chat_key(5_000 + n), &body),
                    Ok(Value::Nil),
                )
            })
            .collect();
        let cache = mock_cache(commands, 10);

        let err = cache.create_chat(&chat).await.unwrap_err();
        assert!(matches!(err, ParleyError::KeyCollision(n) if n == MAX_CREATE_ATTEMPTS));
    }

    #[tokio::test]
    async fn test_create_chat_rejects_unexpected_reply() {
        let chat = Chat::at("alice", "bob", "hi", 1);
        let body = serde_json::to_string(&chat).unwrap();
        let cache = mock_cache(
            vec![MockCmd::new(
                insert_chat_cmd("chat#5000", &body),
                Ok(Value::Int(3)),
            )],
            10,
        );

        let err = cache.create_chat(&chat).await.unwrap_err();
        assert!(matches!(err, ParleyError::Store(_)));
    }

    #[tokio::test]
    async fn test_contact_list_failures_do_not_fail_create_chat() {
        let chat = Chat::at("alice", "bob", "hi", 99);
        let body = serde_json::to_string(&chat).unwrap();
        let cache = mock_cache(
            vec![
                MockCmd::new(insert_chat_cmd("chat#5000", &body), Ok(Value::Okay)),
                MockCmd::new(add_contact_cmd("alice", "bob", 99), Err::<Value, _>(refused())),
                MockCmd::new(add_contact_cmd("bob", "alice", 99), Ok(Value::Int(1))),
            ],
            10,
        );

        assert_eq!(cache.create_chat(&chat).await.unwrap(), "chat#5000");
    }

    #[tokio::test]
    async fn test_chat_write_failure_is_propagated() {
        let chat = Chat::at("alice", "bob", "hi", 99);
        let body = serde_json::to_string(&chat).unwrap();
        let cache = mock_cache(
            vec![MockCmd::new(
                insert_chat_cmd("chat#5000", &body),
                Err::<Value, _>(refused()),
            )],
            10,
        );

        let err = cache.create_chat(&chat).await.unwrap_err();
        assert!(matches!(err, ParleyError::Store(_)));
    }

    #[tokio::test]
    async fn test_fetch_chat_between_reads_every_page() {
        let query = ChatRangeQuery::new("alice", "bob", 0, 2000)
            .unwrap()
            .to_search_query();
        let newest = Chat::at("bob", "alice", "newest", 300);
        let note = Chat::at("alice", "alice", "note to self", 250);
        let middle = Chat::at("alice", "bob", "middle", 200);
        let oldest = Chat::at("alice", "bob", "oldest", 100);

        let cache = mock_cache(
            vec![
                MockCmd::new(
                    search_cmd(&query, 0, 2),
                    Ok(search_reply(4, &[(&newest, "chat#4"), (&note, "chat#3")])),
                ),
                MockCmd::new(
                    search_cmd(&query, 2, 2),
                    Ok(search_reply(4, &[(&middle, "chat#2"), (&oldest, "chat#1")])),
                ),
            ],
            2,
        );

        let chats = cache
            .fetch_chat_between("alice", "bob", 0, 2000)
            .await
            .unwrap();
        assert_eq!(
            chats,
            vec![
                newest.with_id("chat#4"),
                middle.with_id("chat#2"),
                oldest.with_id("chat#1"),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_chat_between_stops_on_short_page() {
        let query = ChatRangeQuery::new("alice", "bob", 0, 10)
            .unwrap()
            .to_search_query();
        let only = Chat::at("alice", "bob", "only", 5);

        // Total shrank after the first page was counted
        let cache = mock_cache(
            vec![
                MockCmd::new(
                    search_cmd(&query, 0, 1),
                    Ok(search_reply(3, &[(&only, "chat#1")])),
                ),
                MockCmd::new(search_cmd(&query, 1, 1), Ok(search_reply(1, &[]))),
            ],
            1,
        );

        let chats = cache.fetch_chat_between("alice", "bob", 0, 10).await.unwrap();
        assert_eq!(chats, vec![only.with_id("chat#1")]);
    }

    #[tokio::test]
    async fn test_fetch_contact_list_ranks_ties_by_name() {
        let cache = mock_cache(
            vec![MockCmd::new(
                contacts_cmd("alice"),
                Ok(Value::Bulk(vec![
                    data("erin"),
                    data("100"),
                    data("carol"),
                    data("100"),
                    data("bob"),
                    data("110"),
                ])),
            )],
            10,
        );

        assert_eq!(
            cache.fetch_contact_list("alice").await.unwrap(),
            vec![
                ContactList::new("bob", 110),
                ContactList::new("carol", 100),
                ContactList::new("erin", 100),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_contact_list_uses_clock_seconds() {
        let cache = mock_cache(
            vec![MockCmd::new(
                add_contact_cmd("alice", "bob", 5),
                Ok(Value::Int(0)),
            )],
            10,
        );

        cache.update_contact_list("alice", "bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_index_is_accepted() {
        let cache = mock_cache(
            vec![
                MockCmd::new(create_index_cmd(), Ok(Value::Okay)),
                MockCmd::new(
                    create_index_cmd(),
                    Err::<Value, _>(RedisError::from((
                        ErrorKind::ResponseError,
                        "Index already exists",
                    ))),
                ),
                MockCmd::new(create_index_cmd(), Err::<Value, _>(refused())),
            ],
            10,
        );

        cache.create_chat_index().await.unwrap();
        cache.create_chat_index().await.unwrap();
        assert!(matches!(
            cache.create_chat_index().await,
            Err(ParleyError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_ping() {
        let cache = mock_cache(
            vec![MockCmd::new(
                redis::cmd("PING"),
                Ok(Value::Status("PONG".into())),
            )],
            10,
        );
        cache.ping().await.unwrap();
    }

    fn test_config() -> Option<StoreConfig> {
        let address = std::env::var("PARLEY_TEST_REDIS").ok()?;
        Some(StoreConfig {
            address,
            ..StoreConfig::default()
        })
    }

    #[tokio::test]
    #[ignore = "requires a Redis Stack server at PARLEY_TEST_REDIS"]
    async fn test_redis_round_trip() {
        let Some(config) = test_config() else {
            return;
        };
        let cache = RedisCache::connect(&config).await.unwrap();
        cache.create_chat_index().await.unwrap();
        // Second call must be a no-op
        cache.create_chat_index().await.unwrap();

        let run = uuid::Uuid::new_v4().simple().to_string();
        let alice = format!("alice-{}", run);
        let bob = format!("bob-{}", run);

        let id = cache
            .create_chat(&Chat::at(&alice, &bob, "hello", 1000))
            .await
            .unwrap();
        assert!(id.starts_with("chat#"));

        // The index updates asynchronously with the write
        tokio::time::sleep(Duration::from_millis(200)).await;

        let chats = cache.fetch_chat_between(&alice, &bob, 0, 2000).await.unwrap();
        assert_eq!(chats, vec![Chat::at(&alice, &bob, "hello", 1000).with_id(id)]);

        let contacts = cache.fetch_contact_list(&bob).await.unwrap();
        assert_eq!(contacts, vec![ContactList::new(&alice, 1000)]);
    }

    #[tokio::test]
    #[ignore = "requires a Redis Stack server at PARLEY_TEST_REDIS"]
    async fn test_redis_same_millisecond_chats() {
        let Some(config) = test_config() else {
            return;
        };
        let clock = Arc::new(ManualClock::new(SystemClock.now_millis()));
        let first = RedisCache::connect(&config)
            .await
            .unwrap()
            .with_clock(clock.clone());
        let second = RedisCache::connect(&config)
            .await
            .unwrap()
            .with_clock(clock);

        let run = uuid::Uuid::new_v4().simple().to_string();
        let a = format!("a-{}", run);
        let b = format!("b-{}", run);

        // Separate generators, same clock: the second write must not clobber the first
        let id1 = first.create_chat(&Chat::at(&a, &b, "one", 5)).await.unwrap();
        let id2 = second.create_chat(&Chat::at(&b, &a, "two", 6)).await.unwrap();
        assert_ne!(id1, id2);
    }
}

//! Live-room replication over a Supabase-style PostgREST store.
//!
//! Two tables back live sharing: `rooms` (one state record per 6-character
//! code) and `messages` (append-only chat per room). The store is advisory:
//! every operation here degrades to "nothing happened" when the store is
//! unconfigured or unreachable, and callers are expected to consult
//! [`RoomClient::is_available`] and skip remote calls instead of surfacing
//! hard errors to the user.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context as _};
use chrono::Utc;
use log::{debug, trace, warn};
use rand::Rng;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use crate::{codec::StateRecord, Result};

/// Length of a generated room code.
const ROOM_CODE_LENGTH: usize = 6;

/// Alphabet of a generated room code.
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many fresh codes we try before giving up on room creation.
const MAX_CREATE_ATTEMPTS: usize = 10;

/// Hard deadline for any single store request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stands in for a blank chat sender name.
const ANONYMOUS_SENDER: &str = "알 수 없음";

/// Connection details for the room store, from `SUPABASE_URL` plus either
/// `SUPABASE_SERVICE_KEY` or `SUPABASE_ANON_KEY`.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Service or anon API key.
    pub key: String,
}

impl StoreConfig {
    /// Read the store configuration from the environment. `None` when
    /// either half is missing or blank, which callers treat as "live
    /// sharing is off".
    pub fn from_env() -> Option<StoreConfig> {
        let url = non_blank_env("SUPABASE_URL")?;
        let key = non_blank_env("SUPABASE_SERVICE_KEY")
            .or_else(|| non_blank_env("SUPABASE_ANON_KEY"))?;
        Some(StoreConfig { url, key })
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_owned()),
        _ => None,
    }
}

/// What a room currently holds.
#[derive(Clone, Debug)]
pub struct RoomSnapshot {
    /// The host's last published state.
    pub state: StateRecord,
    /// When the store last accepted an update, as an RFC 3339 timestamp.
    pub updated_at: Option<String>,
}

/// One chat message in a room.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Display name of the sender.
    #[serde(default)]
    pub user_name: String,
    /// Message body.
    #[serde(default)]
    pub content: String,
    /// Creation timestamp assigned by the store.
    #[serde(default)]
    pub created_at: String,
}

/// The `rooms` table client.
#[derive(Debug)]
pub struct RoomClient {
    store: Option<Store>,
}

impl RoomClient {
    /// Build a client from an explicit configuration.
    pub fn new(config: Option<StoreConfig>) -> RoomClient {
        RoomClient { store: Store::from_config(config) }
    }

    /// Build a client from the environment.
    pub fn from_env() -> RoomClient {
        RoomClient::new(StoreConfig::from_env())
    }

    /// Is the backing store configured? When this is false every operation
    /// is a cheap no-op, so callers should hide the sharing UI entirely.
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Create a room holding `state` and return its fresh code. Retries a
    /// handful of generated codes on collision, then gives up with `None`.
    pub async fn create_room(&self, state: &StateRecord) -> Option<String> {
        let store = self.store.as_ref()?;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let code = generate_room_code();
            let body = json!({ "room_code": code, "state_json": state });
            match store.insert("rooms", &body).await {
                Ok(()) => return Some(code),
                Err(err) => debug!("room code {} not created: {}", code, err),
            }
        }
        warn!("giving up on room creation after {} attempts", MAX_CREATE_ATTEMPTS);
        None
    }

    /// Fetch the current snapshot of a room, or `None` when the room does
    /// not exist, holds an unreadable state, or the store is unreachable.
    pub async fn get_room(&self, room_code: &str) -> Option<RoomSnapshot> {
        let store = self.store.as_ref()?;
        let code = normalize_room_code(room_code)?;
        let rows: Vec<RoomRow> = store
            .select(
                "rooms",
                &[
                    ("select", "state_json,updated_at".to_owned()),
                    ("room_code", format!("eq.{}", code)),
                    ("limit", "1".to_owned()),
                ],
            )
            .await
            .map_err(|err| warn!("could not fetch room {}: {}", code, err))
            .ok()?;
        let row = rows.into_iter().next()?;
        match serde_json::from_value(row.state_json) {
            Ok(state) => Some(RoomSnapshot { state, updated_at: row.updated_at }),
            Err(err) => {
                debug!("room {} holds an unreadable state: {}", code, err);
                None
            }
        }
    }

    /// Replace a room's state, stamping the update time. Returns whether
    /// the store accepted the write.
    pub async fn update_room(&self, room_code: &str, state: &StateRecord) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let Some(code) = normalize_room_code(room_code) else {
            return false;
        };
        let body = json!({
            "state_json": state,
            "updated_at": Utc::now().to_rfc3339(),
        });
        match store
            .update("rooms", &[("room_code", format!("eq.{}", code))], &body)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!("could not update room {}: {}", code, err);
                false
            }
        }
    }

    /// Publish a state update on a detached task, without waiting for the
    /// result. A failed publish is logged and forgotten; the room store is
    /// advisory, so the next publish simply supersedes it.
    pub fn publish_in_background(self: &Arc<RoomClient>, room_code: &str, state: StateRecord) {
        if !self.is_available() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; skipping background room publish");
            return;
        };
        let client = Arc::clone(self);
        let code = room_code.to_owned();
        handle.spawn(async move {
            if !client.update_room(&code, &state).await {
                debug!("background publish to room {} was dropped", code);
            }
        });
    }
}

/// The `messages` table client.
#[derive(Debug)]
pub struct ChatClient {
    store: Option<Store>,
}

impl ChatClient {
    /// Build a client from an explicit configuration.
    pub fn new(config: Option<StoreConfig>) -> ChatClient {
        ChatClient { store: Store::from_config(config) }
    }

    /// Build a client from the environment.
    pub fn from_env() -> ChatClient {
        ChatClient::new(StoreConfig::from_env())
    }

    /// Is the backing store configured?
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Append a chat message to a room. Blank content is refused without
    /// touching the store; a blank sender becomes an anonymous name.
    pub async fn send_message(&self, room_code: &str, user_name: &str, content: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let Some(code) = normalize_room_code(room_code) else {
            return false;
        };
        let content = content.trim();
        if content.is_empty() {
            return false;
        }
        let user_name = match user_name.trim() {
            "" => ANONYMOUS_SENDER,
            name => name,
        };
        let body = json!({
            "room_code": code,
            "user_name": user_name,
            "content": content,
        });
        match store.insert("messages", &body).await {
            Ok(()) => true,
            Err(err) => {
                warn!("could not send message to room {}: {}", code, err);
                false
            }
        }
    }

    /// The room's most recent messages, oldest first. Empty on any failure.
    pub async fn get_messages(&self, room_code: &str, limit: usize) -> Vec<ChatMessage> {
        let Some(store) = self.store.as_ref() else {
            return vec![];
        };
        let Some(code) = normalize_room_code(room_code) else {
            return vec![];
        };
        store
            .select(
                "messages",
                &[
                    ("select", "user_name,content,created_at".to_owned()),
                    ("room_code", format!("eq.{}", code)),
                    ("order", "created_at".to_owned()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
            .unwrap_or_else(|err| {
                warn!("could not fetch messages for room {}: {}", code, err);
                vec![]
            })
    }
}

/// One `rooms` row as the store returns it. The state travels as raw JSON
/// so an unreadable record degrades per room rather than per response.
#[derive(Debug, Deserialize)]
struct RoomRow {
    state_json: serde_json::Value,
    #[serde(default)]
    updated_at: Option<String>,
}

/// Shared PostgREST plumbing for both table clients.
#[derive(Debug)]
struct Store {
    client: Client,
    config: StoreConfig,
}

impl Store {
    fn from_config(config: Option<StoreConfig>) -> Option<Store> {
        let config = config?;
        match Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => Some(Store { client, config }),
            Err(err) => {
                warn!("could not build an HTTP client for the room store: {}", err);
                None
            }
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        trace!("room store select from {} ({:?})", table, query);
        let response = self
            .client
            .get(self.table_url(table))
            .header("apikey", &self.config.key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.key))
            .query(query)
            .send()
            .await
            .context("could not reach the room store")?;
        expect_success(table, response.status())?;
        response
            .json()
            .await
            .context("could not parse a room store response")
    }

    async fn insert(&self, table: &str, body: &serde_json::Value) -> Result<()> {
        trace!("room store insert into {}", table);
        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.config.key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.key))
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .context("could not reach the room store")?;
        expect_success(table, response.status())
    }

    async fn update(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<()> {
        trace!("room store update of {} ({:?})", table, query);
        let response = self
            .client
            .patch(self.table_url(table))
            .header("apikey", &self.config.key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.key))
            .header("Prefer", "return=minimal")
            .query(query)
            .json(body)
            .send()
            .await
            .context("could not reach the room store")?;
        expect_success(table, response.status())
    }
}

fn expect_success(table: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("room store rejected a {} request: {}", table, status))
    }
}

/// A fresh random room code: uppercase letters and digits.
fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_CHARS[rng.gen_range(0..ROOM_CODE_CHARS.len())] as char)
        .collect()
}

/// Trim and uppercase a user-entered room code. `None` when blank.
fn normalize_room_code(room_code: &str) -> Option<String> {
    let code = room_code.trim().to_uppercase();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_codes_use_the_expected_alphabet() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(ROOM_CODE_LENGTH, code.len());
            assert!(code.bytes().all(|b| ROOM_CODE_CHARS.contains(&b)));
        }
    }

    #[test]
    fn room_codes_normalize_to_uppercase() {
        assert_eq!(Some("AB12CD".to_owned()), normalize_room_code("  ab12cd "));
        assert_eq!(None, normalize_room_code("   "));
    }

    #[tokio::test]
    async fn unconfigured_clients_are_inert() {
        let rooms = RoomClient::new(None);
        assert!(!rooms.is_available());
        let state = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![],
            a: vec![],
        };
        assert_eq!(None, rooms.create_room(&state).await);
        assert_eq!(None, rooms.get_room("AB12CD").await.map(|_| ()));
        assert!(!rooms.update_room("AB12CD", &state).await);

        let chat = ChatClient::new(None);
        assert!(!chat.is_available());
        assert!(!chat.send_message("AB12CD", "tester", "hello").await);
        assert!(chat.get_messages("AB12CD", 20).await.is_empty());
    }

    #[tokio::test]
    async fn blank_inputs_never_touch_the_store() {
        // An unroutable config: these calls must all short-circuit on input
        // validation before any request is attempted.
        let config = StoreConfig {
            url: "http://localhost:1".to_owned(),
            key: "key".to_owned(),
        };
        let rooms = RoomClient::new(Some(config.clone()));
        assert!(rooms.is_available());
        assert_eq!(None, rooms.get_room("  ").await.map(|_| ()));
        let state = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![],
            a: vec![],
        };
        assert!(!rooms.update_room("", &state).await);

        let chat = ChatClient::new(Some(config));
        assert!(!chat.send_message("AB12CD", "tester", "   ").await);
        assert!(!chat.send_message("  ", "tester", "hello").await);
    }

    #[test]
    fn background_publish_outside_a_runtime_is_a_no_op() {
        let rooms = Arc::new(RoomClient::new(None));
        let state = StateRecord {
            d: "testdeck".to_owned(),
            s: "overlap".to_owned(),
            c: vec![],
            a: vec![],
        };
        rooms.publish_in_background("AB12CD", state);
    }
}

//! A reading session: catalogs, the current draw, and the room role.
//!
//! [`Session`] is the single-threaded heart of the application. One user
//! action at a time mutates the [`DrawState`]; every mutation republishes to
//! the hosted room, fire-and-forget, when one exists. A UI layer on top only
//! needs to forward clicks and button presses here and re-render the board
//! it gets back.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context as _};
use log::{debug, info};

use crate::{
    angles,
    cards::{load_decks, Deck},
    codec::{self, StateRecord},
    compose::{BoardRenderer, RenderedBoard},
    download::{prepare_download, DownloadArtifact, DownloadOptions},
    draw,
    errors::BoardError,
    geom, prompts,
    rooms::{ChatClient, ChatMessage, RoomClient},
    spreads::{load_spreads, Spread},
    state::DrawState,
    Result,
};

/// The session's relationship to a live room.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoomRole {
    /// No room; everything is local.
    Solo,
    /// We created the room and publish our state to it.
    Host {
        /// The room's 6-character code.
        code: String,
    },
    /// We follow someone else's room and never publish.
    Viewer {
        /// The room's 6-character code.
        code: String,
    },
}

/// What a board click did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClickOutcome {
    /// A face-down slot was unveiled.
    Drew {
        /// The slot that was filled.
        slot_key: String,
        /// The code of the card that was drawn.
        code: String,
    },
    /// An occupied slot was rotated to its next allowed angle.
    Flipped {
        /// The slot that was rotated.
        slot_key: String,
        /// The slot's new angle.
        angle: i32,
    },
    /// The click landed on the background.
    Miss,
    /// The click was no newer than one we already processed.
    Ignored,
}

/// Everything one user's reading needs, loaded once at startup.
#[derive(Debug)]
pub struct Session {
    data_root: PathBuf,
    decks: BTreeMap<String, Deck>,
    spreads: BTreeMap<String, Spread>,
    state: DrawState,
    renderer: BoardRenderer,
    rooms: Arc<RoomClient>,
    chat: ChatClient,
    role: RoomRole,
    // Newest processed click timestamp per "{spread}:{deck}" board, so a
    // re-delivered click event cannot flip a card twice.
    last_click: HashMap<String, f64>,
}

impl Session {
    /// Load the catalogs under `data_root` and start a solo session on the
    /// first deck and spread. Room clients come from the environment.
    pub fn new<P: Into<PathBuf>>(data_root: P) -> Result<Session> {
        Session::with_clients(
            data_root,
            Arc::new(RoomClient::from_env()),
            ChatClient::from_env(),
        )
    }

    /// Like [`Session::new`], with explicit room clients.
    pub fn with_clients<P: Into<PathBuf>>(
        data_root: P,
        rooms: Arc<RoomClient>,
        chat: ChatClient,
    ) -> Result<Session> {
        let data_root = data_root.into();
        let decks = load_decks(&data_root)?;
        let spreads = load_spreads(&data_root)?;
        let deck = decks.values().next().ok_or_else(|| BoardError::EmptyCatalog {
            kind: "decks",
            data_root: data_root.display().to_string(),
        })?;
        let spread = spreads.values().next().ok_or_else(|| BoardError::EmptyCatalog {
            kind: "spreads",
            data_root: data_root.display().to_string(),
        })?;
        info!(
            "session ready: {} decks, {} spreads, starting on {:?}/{:?}",
            decks.len(),
            spreads.len(),
            deck.id,
            spread.id
        );
        let state = DrawState::empty(deck, spread);
        let renderer = BoardRenderer::new(&data_root);
        Ok(Session {
            data_root,
            decks,
            spreads,
            state,
            renderer,
            rooms,
            chat,
            role: RoomRole::Solo,
            last_click: HashMap::new(),
        })
    }

    /// The root the catalogs and card images were loaded from.
    pub fn data_root(&self) -> &PathBuf {
        &self.data_root
    }

    /// The loaded decks, keyed by id.
    pub fn decks(&self) -> &BTreeMap<String, Deck> {
        &self.decks
    }

    /// The loaded spreads, keyed by id.
    pub fn spreads(&self) -> &BTreeMap<String, Spread> {
        &self.spreads
    }

    /// The current draw.
    pub fn state(&self) -> &DrawState {
        &self.state
    }

    /// The deck the current draw uses.
    pub fn deck(&self) -> &Deck {
        &self.decks[&self.state.deck_id]
    }

    /// The spread the current draw fills.
    pub fn spread(&self) -> &Spread {
        &self.spreads[&self.state.spread_id]
    }

    /// Our current room role.
    pub fn role(&self) -> &RoomRole {
        &self.role
    }

    /// Is live sharing even possible?
    pub fn sharing_available(&self) -> bool {
        self.rooms.is_available()
    }

    /// Start over on the given deck and spread with an all-empty board.
    pub fn reset(&mut self, deck_id: &str, spread_id: &str) -> Result<()> {
        let deck = self
            .decks
            .get(deck_id)
            .ok_or_else(|| anyhow!("unknown deck {:?}", deck_id))?;
        let spread = self
            .spreads
            .get(spread_id)
            .ok_or_else(|| anyhow!("unknown spread {:?}", spread_id))?;
        self.state = DrawState::empty(deck, spread);
        self.publish_state();
        Ok(())
    }

    /// Unveil one face-down slot with a fresh card at a random allowed
    /// angle. Fails when the slot is out of range, already occupied, or the
    /// deck is exhausted.
    pub fn draw_slot(&mut self, idx: usize) -> Result<String> {
        let (deck, spread) = catalog_pair(&self.decks, &self.spreads, &self.state)?;
        let slot = self
            .state
            .slots
            .get(idx)
            .ok_or_else(|| anyhow!("no slot {} in spread {:?}", idx, spread.id))?;
        if slot.code.is_some() {
            return Err(anyhow!("slot {} already holds a card", idx));
        }
        let exclude = self.state.used_codes_except(idx);
        let code = draw::draw_one(deck, &exclude)?;
        self.state.slots[idx].code = Some(code.clone());
        self.state.slots[idx].angle = angles::random_angle(deck, spread, idx);
        self.publish_state();
        Ok(code)
    }

    /// Unveil every remaining face-down slot at once. Already-drawn cards
    /// keep their code and angle.
    pub fn draw_all(&mut self) -> Result<()> {
        let (deck, spread) = catalog_pair(&self.decks, &self.spreads, &self.state)?;
        let need = self.state.empty_count();
        if need == 0 {
            return Ok(());
        }
        let exclude = self.state.used_codes();
        let mut fresh = draw::draw_many(deck, need, &exclude)?.into_iter();
        for (idx, slot) in self.state.slots.iter_mut().enumerate() {
            if slot.code.is_none() {
                slot.code = fresh.next();
                slot.angle = angles::random_angle(deck, spread, idx);
            }
        }
        self.publish_state();
        Ok(())
    }

    /// Rotate an occupied slot to its next allowed angle.
    pub fn flip(&mut self, idx: usize) -> Result<i32> {
        let (deck, spread) = catalog_pair(&self.decks, &self.spreads, &self.state)?;
        let slot = self
            .state
            .slots
            .get(idx)
            .ok_or_else(|| anyhow!("no slot {} in spread {:?}", idx, spread.id))?;
        if slot.code.is_none() {
            return Err(anyhow!("slot {} is still face-down", idx));
        }
        let next = angles::toggle_angle(deck, spread, idx, slot.angle);
        self.state.slots[idx].angle = next;
        self.publish_state();
        Ok(next)
    }

    /// Handle a board click at pixel `(x, y)`, stamped with the client's
    /// event time. A face-down slot draws, an occupied slot flips, the
    /// background does nothing. A click not newer than the last processed
    /// one for this board is ignored outright.
    pub fn click(&mut self, x: f64, y: f64, event_time: f64) -> Result<ClickOutcome> {
        let board_key = format!("{}:{}", self.state.spread_id, self.state.deck_id);
        if let Some(&last) = self.last_click.get(&board_key) {
            if event_time <= last {
                return Ok(ClickOutcome::Ignored);
            }
        }
        self.last_click.insert(board_key, event_time);

        let (_, spread) = catalog_pair(&self.decks, &self.spreads, &self.state)?;
        let slot_angles: Vec<i32> = self.state.slots.iter().map(|s| s.angle).collect();
        let Some(slot_key) = geom::hit_test(spread, &slot_angles, x, y) else {
            return Ok(ClickOutcome::Miss);
        };
        let slot_key = slot_key.to_owned();
        let idx = spread
            .slot_index(&slot_key)
            .ok_or_else(|| anyhow!("hit-test returned unknown slot {:?}", slot_key))?;
        if self.state.slots[idx].code.is_none() {
            let code = self.draw_slot(idx)?;
            Ok(ClickOutcome::Drew { slot_key, code })
        } else {
            let angle = self.flip(idx)?;
            Ok(ClickOutcome::Flipped { slot_key, angle })
        }
    }

    /// The current draw as a URL-safe token.
    pub fn state_token(&self) -> String {
        codec::encode_state(&self.state)
    }

    /// Restore a draw from a token, if it decodes and names a deck and
    /// spread we know. Returns whether anything was applied.
    pub fn load_token(&mut self, token: &str) -> bool {
        match codec::decode_state(token) {
            Some(record) => self.apply_record(&record),
            None => false,
        }
    }

    /// Apply a state record pulled from a live room. Same repair rules as a
    /// token load: unknown ids are refused, stale contents are normalized.
    pub fn apply_remote(&mut self, record: &StateRecord) -> bool {
        self.apply_record(record)
    }

    fn apply_record(&mut self, record: &StateRecord) -> bool {
        let (Some(deck), Some(spread)) = (self.decks.get(&record.d), self.spreads.get(&record.s))
        else {
            debug!("refusing state for unknown deck/spread {:?}/{:?}", record.d, record.s);
            return false;
        };
        self.state = codec::normalize(record, deck, spread);
        true
    }

    /// Render the current board.
    pub fn render(&self) -> Result<RenderedBoard> {
        let (deck, spread) = catalog_pair(&self.decks, &self.spreads, &self.state)?;
        self.renderer.compose_state(deck, spread, &self.state)
    }

    /// Render the current board and post-process it for sharing.
    pub fn prepare_download(&self, options: &DownloadOptions) -> Result<DownloadArtifact> {
        let board = self.render()?;
        prepare_download(&board.png_bytes, options)
    }

    /// The reading prompt for the current draw, once every slot is filled.
    pub fn prompt(&self, question: &str) -> Option<String> {
        let (deck, spread) = catalog_pair(&self.decks, &self.spreads, &self.state).ok()?;
        prompts::build_prompt(question, deck, spread, &self.state)
    }

    /// Create a room seeded with our current state and become its host.
    pub async fn create_room(&mut self) -> Option<String> {
        let record = codec::to_record(&self.state);
        let code = self.rooms.create_room(&record).await?;
        info!("hosting room {}", code);
        self.role = RoomRole::Host { code: code.clone() };
        Some(code)
    }

    /// Join someone else's room as a viewer, adopting its current state.
    /// Returns whether the room existed and its state applied.
    pub async fn join_room(&mut self, code: &str) -> bool {
        let Some(snapshot) = self.rooms.get_room(code).await else {
            return false;
        };
        if !self.apply_remote(&snapshot.state) {
            return false;
        }
        info!("viewing room {}", code);
        self.role = RoomRole::Viewer { code: code.trim().to_uppercase() };
        true
    }

    /// Pull the room's latest state, when we are a viewer. Returns whether
    /// a fresh state was applied.
    pub async fn refresh_from_room(&mut self) -> bool {
        let RoomRole::Viewer { code } = self.role.clone() else {
            return false;
        };
        match self.rooms.get_room(&code).await {
            Some(snapshot) => self.apply_remote(&snapshot.state),
            None => false,
        }
    }

    /// Drop back to a solo session. The room itself lives on in the store.
    pub fn leave_room(&mut self) {
        self.role = RoomRole::Solo;
    }

    /// Push the current state to our hosted room on a detached task. A
    /// no-op for solo sessions and viewers.
    pub fn publish_state(&self) {
        if let RoomRole::Host { code } = &self.role {
            self.rooms
                .publish_in_background(code, codec::to_record(&self.state));
        }
    }

    /// Send a chat message to the current room.
    pub async fn send_message(&self, user_name: &str, content: &str) -> bool {
        match self.room_code() {
            Some(code) => self.chat.send_message(code, user_name, content).await,
            None => false,
        }
    }

    /// The current room's recent chat, oldest first.
    pub async fn recent_messages(&self, limit: usize) -> Vec<ChatMessage> {
        match self.room_code() {
            Some(code) => self.chat.get_messages(code, limit).await,
            None => vec![],
        }
    }

    /// The code of the room we are in, if any.
    pub fn room_code(&self) -> Option<&str> {
        match &self.role {
            RoomRole::Solo => None,
            RoomRole::Host { code } | RoomRole::Viewer { code } => Some(code),
        }
    }
}

/// Resolve the deck and spread the state points at. Free-standing so
/// callers can keep mutating `state` while holding the borrows.
fn catalog_pair<'a>(
    decks: &'a BTreeMap<String, Deck>,
    spreads: &'a BTreeMap<String, Spread>,
    state: &DrawState,
) -> Result<(&'a Deck, &'a Spread)> {
    let deck = decks
        .get(&state.deck_id)
        .with_context(|| format!("state names unknown deck {:?}", state.deck_id))?;
    let spread = spreads
        .get(&state.spread_id)
        .with_context(|| format!("state names unknown spread {:?}", state.spread_id))?;
    Ok((deck, spread))
}

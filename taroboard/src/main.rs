//! Command-line interface to the tarot-reading board.

use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context as _};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use taroboard::{
    codec,
    download::DownloadOptions,
    rooms::{ChatClient, RoomClient},
    session::Session,
    Result,
};

#[derive(Debug, Parser)]
/// An interactive tarot-reading board: draw cards into a spread, render the
/// board as an image, share it as a URL token or a live room.
#[command(name = "taroboard", version)]
enum Args {
    /// List the decks and spreads found under the data directory.
    #[command(name = "list")]
    List {
        /// Directory holding `data/decks/`, `data/spreads/` and card images.
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        #[command(subcommand)]
        to_list: ToList,
    },

    /// Draw cards into every empty slot and print the resulting state token.
    #[command(name = "draw")]
    Draw {
        /// Directory holding `data/decks/`, `data/spreads/` and card images.
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Deck to draw from. Defaults to the first deck.
        #[arg(long)]
        deck: Option<String>,

        /// Spread to fill. Defaults to the first spread.
        #[arg(long)]
        spread: Option<String>,

        /// Resume from an existing state token instead of an empty board.
        #[arg(long)]
        token: Option<String>,
    },

    /// Render a board image from a state token.
    #[command(name = "render")]
    Render {
        /// Directory holding `data/decks/`, `data/spreads/` and card images.
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// The state token to render. Empty slots show the card back.
        token: String,

        /// Where to write the PNG.
        #[arg(long, short = 'o', default_value = "board.png")]
        out: PathBuf,
    },

    /// Render a board and post-process it for sharing (downscale, frame,
    /// watermark, stronger compression).
    #[command(name = "download")]
    Download {
        /// Directory holding `data/decks/`, `data/spreads/` and card images.
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// The state token to render.
        token: String,

        /// Where to write the PNG.
        #[arg(long, short = 'o', default_value = "board-share.png")]
        out: PathBuf,

        /// Watermark text drawn near the bottom-right corner.
        #[arg(long, default_value = "taroboard")]
        watermark: String,

        /// Longest allowed edge before framing.
        #[arg(long, default_value_t = 1080)]
        max_side: u32,

        /// PNG compression level, 0 (fastest) through 9 (smallest).
        #[arg(long, default_value_t = 9)]
        compress_level: u8,
    },

    /// Decode a state token and print the underlying record as JSON.
    #[command(name = "decode")]
    Decode {
        /// The state token to decode.
        token: String,
    },

    /// Build the reading prompt for a fully drawn board.
    #[command(name = "prompt")]
    Prompt {
        /// Directory holding `data/decks/`, `data/spreads/` and card images.
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// The state token to build the prompt from.
        token: String,

        /// The question the reading should answer.
        #[arg(long, default_value = "")]
        question: String,
    },

    /// Live-room operations. These need `SUPABASE_URL` and a key in the
    /// environment (a `.env` file works).
    #[command(name = "room")]
    Room {
        #[command(subcommand)]
        op: RoomOp,
    },
}

#[derive(Debug, Subcommand)]
enum ToList {
    /// List deck ids, names and card counts.
    #[command(name = "decks")]
    Decks,

    /// List spread ids, names and slot counts.
    #[command(name = "spreads")]
    Spreads,
}

#[derive(Debug, Subcommand)]
enum RoomOp {
    /// Create a room seeded with the given state token and print its code.
    #[command(name = "create")]
    Create {
        /// The state token to seed the room with.
        token: String,
    },

    /// Print a room's current state record and recent chat.
    #[command(name = "show")]
    Show {
        /// The room's 6-character code.
        code: String,
    },

    /// Replace a room's state with the given state token.
    #[command(name = "publish")]
    Publish {
        /// The room's 6-character code.
        code: String,

        /// The state token to publish.
        token: String,
    },

    /// Send a chat message to a room.
    #[command(name = "chat")]
    Chat {
        /// The room's 6-character code.
        code: String,

        /// The message to send.
        message: String,

        /// Display name to send as.
        #[arg(long, default_value = "")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    match args {
        Args::List { data_dir, to_list } => cmd_list(&data_dir, to_list),
        Args::Draw { data_dir, deck, spread, token } => {
            cmd_draw(&data_dir, deck.as_deref(), spread.as_deref(), token.as_deref())
        }
        Args::Render { data_dir, token, out } => cmd_render(&data_dir, &token, &out),
        Args::Download {
            data_dir,
            token,
            out,
            watermark,
            max_side,
            compress_level,
        } => {
            let options = DownloadOptions {
                watermark_text: watermark,
                max_side,
                compress_level,
                ..DownloadOptions::default()
            };
            cmd_download(&data_dir, &token, &out, &options)
        }
        Args::Decode { token } => cmd_decode(&token),
        Args::Prompt { data_dir, token, question } => cmd_prompt(&data_dir, &token, &question),
        Args::Room { op } => cmd_room(op).await,
    }
}

fn cmd_list(data_dir: &PathBuf, to_list: ToList) -> Result<()> {
    let session = Session::new(data_dir)?;
    match to_list {
        ToList::Decks => {
            for deck in session.decks().values() {
                let orientation = if deck.reversible { "reversible" } else { "upright only" };
                println!("{}\t{} ({} cards, {})", deck.id, deck.name, deck.cards.len(), orientation);
            }
        }
        ToList::Spreads => {
            for spread in session.spreads().values() {
                let board = if spread.layout.is_some() { "board" } else { "no board" };
                println!("{}\t{} ({} slots, {})", spread.id, spread.name, spread.n_cards(), board);
            }
        }
    }
    Ok(())
}

fn cmd_draw(
    data_dir: &PathBuf,
    deck: Option<&str>,
    spread: Option<&str>,
    token: Option<&str>,
) -> Result<()> {
    let mut session = Session::new(data_dir)?;
    match token {
        Some(token) => {
            if !session.load_token(token) {
                return Err(anyhow!("could not load the given state token"));
            }
        }
        None => {
            let deck = deck.unwrap_or(&session.state().deck_id).to_owned();
            let spread = spread.unwrap_or(&session.state().spread_id).to_owned();
            session.reset(&deck, &spread)?;
        }
    }
    session.draw_all()?;
    print_board(&session);
    println!();
    println!("token: {}", session.state_token());
    Ok(())
}

fn cmd_render(data_dir: &PathBuf, token: &str, out: &PathBuf) -> Result<()> {
    let session = session_from_token(data_dir, token)?;
    let board = session.render()?;
    fs::write(out, &board.png_bytes)
        .with_context(|| format!("could not write {}", out.display()))?;
    println!("{} ({}×{})", out.display(), board.width, board.height);
    Ok(())
}

fn cmd_download(
    data_dir: &PathBuf,
    token: &str,
    out: &PathBuf,
    options: &DownloadOptions,
) -> Result<()> {
    let session = session_from_token(data_dir, token)?;
    let artifact = session.prepare_download(options)?;
    fs::write(out, &artifact.png_bytes)
        .with_context(|| format!("could not write {}", out.display()))?;
    println!("{} ({})", out.display(), artifact.caption());
    Ok(())
}

fn cmd_decode(token: &str) -> Result<()> {
    let record = codec::decode_state(token)
        .ok_or_else(|| anyhow!("not a valid state token"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_prompt(data_dir: &PathBuf, token: &str, question: &str) -> Result<()> {
    let session = session_from_token(data_dir, token)?;
    match session.prompt(question) {
        Some(prompt) => {
            println!("{}", prompt);
            Ok(())
        }
        None => Err(anyhow!("the board is not fully drawn; fill every slot first")),
    }
}

async fn cmd_room(op: RoomOp) -> Result<()> {
    let rooms = RoomClient::from_env();
    if !rooms.is_available() {
        return Err(anyhow!(
            "the room store is not configured; set SUPABASE_URL and a key"
        ));
    }
    match op {
        RoomOp::Create { token } => {
            let record = codec::decode_state(&token)
                .ok_or_else(|| anyhow!("not a valid state token"))?;
            let code = rooms
                .create_room(&record)
                .await
                .ok_or_else(|| anyhow!("could not create a room"))?;
            println!("{}", code);
        }
        RoomOp::Show { code } => {
            let snapshot = rooms
                .get_room(&code)
                .await
                .ok_or_else(|| anyhow!("no room {:?}", code))?;
            println!("{}", serde_json::to_string_pretty(&snapshot.state)?);
            if let Some(updated_at) = snapshot.updated_at {
                println!("updated_at: {}", updated_at);
            }
            let chat = ChatClient::from_env();
            for message in chat.get_messages(&code, 20).await {
                println!("[{}] {}: {}", message.created_at, message.user_name, message.content);
            }
        }
        RoomOp::Publish { code, token } => {
            let record = codec::decode_state(&token)
                .ok_or_else(|| anyhow!("not a valid state token"))?;
            if !rooms.update_room(&code, &record).await {
                return Err(anyhow!("could not update room {:?}", code));
            }
            println!("published to {}", code.trim().to_uppercase());
        }
        RoomOp::Chat { code, message, name } => {
            let chat = ChatClient::from_env();
            if !chat.send_message(&code, &name, &message).await {
                return Err(anyhow!("could not send the message to room {:?}", code));
            }
        }
    }
    Ok(())
}

/// Build a session and load a state token into it.
fn session_from_token(data_dir: &PathBuf, token: &str) -> Result<Session> {
    let mut session = Session::new(data_dir)?;
    if !session.load_token(token) {
        return Err(anyhow!("could not load the given state token"));
    }
    Ok(session)
}

/// Print one line per slot: label, card and orientation.
fn print_board(session: &Session) {
    let deck = session.deck();
    let spread = session.spread();
    println!("{} · {}", deck.name, spread.name);
    for (slot, drawn) in spread.slots.iter().zip(&session.state().slots) {
        match &drawn.code {
            Some(code) => {
                let name = deck
                    .card_by_code(code)
                    .map(|c| c.display_name())
                    .unwrap_or_else(|| code.clone());
                println!("  {}: {} ({}°)", slot.label, name, drawn.angle);
            }
            None => println!("  {}: (face down)", slot.label),
        }
    }
}

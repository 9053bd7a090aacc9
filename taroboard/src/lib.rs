//! Tools for running an interactive tarot-reading board.
//!
//! The heart of this crate is the [`compose::BoardRenderer`], which turns a
//! declarative spread layout plus a deck's card images into a single
//! composed PNG, and the [`codec`] module, which round-trips the user's
//! draw through a compact URL-safe token or a remote room record. Everything
//! here is UI-toolkit agnostic: a front end is expected to call into
//! [`session::Session`] with clicks and button presses and display the
//! images and tokens it gets back.

#![warn(missing_docs)]

pub use anyhow::{Error, Result};

pub mod angles;
pub mod cache;
pub mod cards;
pub mod codec;
pub mod compose;
pub mod download;
pub mod draw;
pub mod errors;
pub mod fonts;
pub mod geom;
pub mod prompts;
pub mod rooms;
pub mod session;
pub mod spreads;
pub mod state;

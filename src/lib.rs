//! # chat-markdown-export
//!
//! Turns exported AI chat transcripts (a JSON array of conversations) into one
//! Markdown file per conversation, and splits bundles of such documents back
//! into individually named files.
//!
//! ## What it does
//!
//! Each conversation is reduced to its active thread. Graph-shaped exports are
//! walked from the active leaf up to the root; flat exports are taken in stored
//! order. The thread is rendered as Markdown under a small metadata header:
//!
//! ```text
//! ---
//! title: Hi There
//! create_time: 2024-01-01 00:00:00
//! update_time:
//! conversation_id:
//! ---
//!
//! # Hi There
//!
//! Creation Time: 2024-01-01 00:00:00
//!
//! Update Time:
//!
//! ## User
//!
//! Hello
//! ```
//!
//! Files are named after the title and creation date (`Hi_There_2024_0101.md`),
//! with `_1`, `_2`, … appended when a name is taken.
//!
//! ## Bundles
//!
//! Several documents can be kept in one file, separated by a line holding only
//! `* * *`. Splitting a bundle re-reads each part's `# ` heading and
//! `Creation Time:` line to name it, so a converted bundle splits back into the
//! same names conversion would have chosen.
//!
//! ## Usage
//!
//! ```sh
//! # One file per conversation
//! chat-markdown-export convert conversations.json ~/notes/chats
//!
//! # Everything in one bundle, then back again
//! chat-markdown-export convert conversations.json --bundle all.md
//! chat-markdown-export split all.md --out ~/notes/chats
//! ```
//!
//! Preferences can be persisted in `~/.config/chat-markdown-export/config.toml`.
pub mod error;
pub mod exporter;
pub mod importer;
pub mod linearize;
pub mod naming;
pub mod parallel;
pub mod renderer;
#[cfg(feature = "sequential")]
pub mod sequential;
pub mod splitter;
pub mod utils;

pub use error::ConvertError;
pub use exporter::{Document, assemble, assemble_bundle, convert};
pub use importer::{Conversation, parse_conversation, read_export};
pub use linearize::linearize;
pub use naming::{FilenameDescriptor, canonicalize, resolve_collision, sanitize};
pub use splitter::{parse_metadata, rename, split};

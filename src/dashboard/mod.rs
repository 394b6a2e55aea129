//! Dashboard server: live view over a bd workspace.
//!
//! ## Overview
//!
//! bd keeps its issues in `<workspace>/.beads/issues.jsonl` (a change-log
//! that bd rewrites after every mutation) plus a SQLite store. The dashboard
//! never writes either: reads of the log feed an in-memory snapshot that is
//! pushed to every browser over a WebSocket, and all mutations go through
//! the `bd` command itself.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    ├─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│    │     │                                       │
//!       ^               │    │     ├─ bd.rs    (BdCli: `bd ... --json`)     │
//!       │               │    │     └─ deps.rs  (read-only SQLite edges)     │
//!       │               │    │                                              │
//!       │               │    └─ ws.rs   (WsMessage, per-socket loop)        │
//!       │               │          ^                                       │
//!       │   push        │          │ outbox per connection                 │
//!       └───────────────│── hub.rs  (BroadcastHub)                         │
//!                       │          ^                                       │
//!                       │          │ publish_snapshot()                    │
//!                       │  watcher.rs  (LogWatcher on .beads/)             │
//!                       │          │                                       │
//!                       │          v                                       │
//!                       │  snapshot.rs (SnapshotCache, parse_issues)       │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                             |
//! |------------|------------------------------------------------------------|
//! | `models`   | Wire types: `Issue`, `DependencyEdge`, request payloads    |
//!
//! ## Change Flow (edit in another terminal)
//!
//! 1. `bd update bd-3 --status=closed` rewrites `.beads/issues.jsonl`.
//! 2. `watcher.rs` sees the event and arms its single reparse slot.
//! 3. The worker reparses the log; on success `hub.rs` swaps the snapshot
//!    and sends one `issues_updated` frame to every connection. On failure
//!    the previous snapshot stays and nothing is sent.
//! 4. Edits made through the API additionally push `issue_created` /
//!    `issue_updated` as soon as bd returns.

pub mod api;
pub mod bd;
pub mod deps;
pub mod hub;
pub mod models;
pub mod server;
pub mod snapshot;
pub mod watcher;
pub mod ws;

//! Client side of the dashboard.
//!
//! Everything a browser front end needs that is not rendering:
//!
//! - `api` - typed HTTP client for the REST endpoints
//! - `push` - listener for the `/ws` channel
//! - `reconciler` - edit/push conflict state machine
//! - `session` - issue list, selection and draft state driven by the two above
//! - `filter` - list filters and sort order
//! - `board` - status columns
//! - `graph` - dependency graph selection and hover highlight

pub mod api;
pub mod board;
pub mod filter;
pub mod graph;
pub mod push;
pub mod reconciler;
pub mod session;

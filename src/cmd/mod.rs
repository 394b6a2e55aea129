//! CLI command implementations.
//!
//! | Module     | Commands handled          |
//! |------------|---------------------------|
//! | `serve`    | `Serve` (and no command)  |
//! | `snapshot` | `Snapshot`                |

pub mod serve;
pub mod snapshot;

pub use serve::cmd_serve;
pub use snapshot::cmd_snapshot;

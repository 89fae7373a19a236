//! CLI command handling

pub mod context;
pub mod list;
pub mod mappings;
pub mod mark_read;
pub mod output;
pub mod watch;

pub use context::*;
pub use list::*;
pub use mappings::*;
pub use mark_read::*;
pub use output::*;
pub use watch::*;

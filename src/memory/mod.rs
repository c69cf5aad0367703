/*!
 * Memory Module
 * Reference-counted, size-classed arena allocator
 */

pub mod config;
pub mod manager;
pub mod shared;
pub mod size_class;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use config::ArenaConfig;
pub use manager::{Arena, Disposition, EmptyPoolAction, SerialTrigger};
pub use shared::SharedArena;
pub use traits::*;
pub use types::*;

mod entity;
mod registry;

pub use entity::{fallback_display_name, BlockedEntity, CountdownSnapshot};
pub use registry::BlockRegistry;

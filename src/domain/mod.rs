pub mod events;
pub mod fleet;
pub mod queue;
pub mod types;
pub mod watcher;
pub mod work;

mod matcher;
mod store;

pub use matcher::collate;
pub use store::{Calls, MemoryStore};

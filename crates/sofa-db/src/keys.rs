//! Names baked into the persisted layout. Changing any of these orphans
//! existing documents, indexes or design documents.

pub const SEPARATOR: &str = "__";
pub const ID: &str = "_id";
pub const REV: &str = "_rev";
pub const DELETED: &str = "_deleted";
pub const TABLE: &str = "??table";
pub const SEQUENCE: &str = "??sequence";
pub const DDOC: &str = "ddoc";
pub const INDEX: &str = "index";
pub const VIEW: &str = "view";
pub const DESIGN_PREFIX: &str = "_design/";

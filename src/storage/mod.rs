pub mod index;
pub mod node;
pub mod pagefile;
pub mod record;

pub use index::{BTreeIndex, IndexCursor, Lookup};
pub use pagefile::OpenMode;
pub use record::{RecordFile, RecordId};

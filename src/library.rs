//! Library index: track records parsed from an export, a tagged music
//! directory or the index cache, with O(1) path lookup and compatibility queries.

mod cache;
mod export;
mod index;
mod key;
mod model;
mod scan;

pub use export::parse_export;
pub use index::{CompatibilityQuery, LibraryIndex, LibrarySource, Match, TrackFilter};
pub use key::{Mode, WheelKey};
pub use model::{TrackEntry, TrackRecord};
pub use scan::scan;

pub mod audit;
pub mod collection;
pub mod converter;
pub mod document_store;
pub mod logging;
pub mod osm;
pub mod shaper;

pub use collection::*;
pub use converter::*;
pub use document_store::*;
pub use osm::*;
pub use shaper::*;

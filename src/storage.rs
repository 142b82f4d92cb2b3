/// Caches of previously imported nodesets.
pub mod cache;
pub mod directory;
/// External resolution of missing nodesets.
pub mod resolver;
pub mod xml;

pub use cache::{CacheError, MemoryCache, NodeSetCache, merge_document};
pub use directory::DirectoryCache;
pub use resolver::{DirectoryResolver, NodeSetResolver};
pub use xml::{NodeSet, ParseError, WriteError};

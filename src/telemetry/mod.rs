pub mod cache;
pub mod query;
pub mod reading;

pub use cache::{Cache, CacheEntry, DEFAULT_TTL};
pub use query::{Endpoint, HttpEndpoint, MemoryEndpoint, QueryLayer};
pub use reading::Reading;

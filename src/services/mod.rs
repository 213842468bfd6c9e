pub mod acceleration_operation;
pub mod cache_loader;
pub mod cache_manager;
pub mod direct_query;
pub mod notifications;
pub mod polling; // Interval poller shared by all loaders
pub mod query_builder;
pub mod session;
pub mod transport;

pub use acceleration_operation::*;
pub use cache_loader::*;
pub use cache_manager::*;
pub use direct_query::*;
pub use notifications::*;
pub use polling::*;
pub use query_builder::*;
pub use session::*;
pub use transport::{HttpQueryTransport, QueryTransport};

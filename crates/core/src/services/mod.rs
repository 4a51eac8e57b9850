mod indexer;
mod supervisor;

pub use indexer::{project, BlockIndexer};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};

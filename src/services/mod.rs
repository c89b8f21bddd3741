//! Business logic: correlation, locking, queues, dispatch

pub mod correlator;
pub mod dispatch_worker;
pub mod lock_manager;
pub mod path_queue;
pub mod state_store;

pub use correlator::Correlator;
pub use dispatch_worker::{create_dispatch_worker, DispatchWorker};
pub use lock_manager::LockManager;
pub use path_queue::PathQueue;
pub use state_store::StateStore;

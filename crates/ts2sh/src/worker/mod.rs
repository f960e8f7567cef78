pub mod pool;
pub mod shutdown;

pub use pool::WorkerPool;
pub use shutdown::ShutdownSignal;

pub mod consumer;
pub mod pool;
pub mod producer;
pub mod queue;
pub mod staggered_logger;

pub use consumer::FragmentReader;
pub use pool::{Fragment, FragmentPool};
pub use producer::FragmentWriter;
pub use queue::{AudioQueue, Dequeued, QueueSnapshot};
pub use staggered_logger::{tracing_sink, LogSink, StaggeredLogger, StaggeredReport};

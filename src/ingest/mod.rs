pub mod feed;
pub mod poller;
pub mod supervisor;

pub use feed::{FeedConnector, Venue};
pub use poller::{standard_jobs, PollJob, Poller};
pub use supervisor::spawn_supervised;

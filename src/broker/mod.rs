pub mod engine;
pub mod message;
pub mod recovery;
pub mod store;
pub mod topic;

pub use engine::TopicTable;
pub use message::{Message, Payload};
pub use recovery::{RecoveryReport, recover};
pub use store::{InFlight, TopicStore};

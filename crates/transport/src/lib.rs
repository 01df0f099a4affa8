pub mod live;
pub mod mock;
pub mod retry;
pub mod transport;
pub mod types;

pub use live::{ConnectionManager, Lease, LiveConnector, LiveEvent, LiveLink};
pub use mock::{Gate, MockReply, MockRequest, MockTransport, seed_history};
pub use retry::{RetryConfig, is_retryable_error, with_retry};
pub use transport::{HttpTransport, Transport};
pub use types::{HistoryMessage, HistoryPage, Role, SendReply};

pub use observer_core::{Error, Result, TransportError};

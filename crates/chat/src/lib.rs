pub mod entry;
pub mod pagination;
pub mod scroll;
pub mod send;
pub mod session;
pub mod store;

pub use entry::{EntryId, FailureKind, Origin, TranscriptEntry};
pub use pagination::{LoadKind, LoadPhase, PageRequest, PaginationController, PaginationState, SkipReason};
pub use scroll::{ScrollAnchorController, ScrollIntent, Viewport};
pub use send::{OptimisticSendController, Reconciliation};
pub use session::{ChangeCounts, ChatSession, LoadOutcome, SendOutcome, TranscriptChange, TranscriptSnapshot};
pub use store::{MergeMode, MessageStore, merge};

pub use observer_core::{Error, Result};
pub use observer_transport::Role;

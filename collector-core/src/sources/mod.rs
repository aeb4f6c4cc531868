//! Source walkers that converge on the orchestrator's `Source` trait:
//! a local mail archive, an IMAP mailbox (see `crate::imap`), an
//! on-device message store, and a filesystem watch.

pub mod fswatch;
pub mod imap_source;
pub mod local_mail;
pub mod message_store;
pub mod parse;

pub use fswatch::{FsChangeEvent, FsChangeKind, FsWatchSource};
pub use imap_source::ImapSource;
pub use local_mail::LocalMailSource;
pub use message_store::{MessageStorePort, MessageStoreRow, MessageStoreSource};
pub use parse::{parse_message, ParsedMessage};

pub mod ordering;
pub mod session;

pub use ordering::merge_order;
pub use session::{with_transient_retry, AsyncImapSession, Credentials, ImapError, ImapSession};

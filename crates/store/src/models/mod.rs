//! Typed records stored in the document collections.

pub mod block;
pub mod contact;
pub mod conversation;
pub mod device;
pub mod report;
pub mod user;
pub mod verification_code;

use serde::{Serialize, de::DeserializeOwned};

pub use block::BlockRelation;
pub use contact::{ContactRelation, ContactStatus};
pub use conversation::{Conversation, ConversationKind, Message};
pub use device::{Device, DeviceType};
pub use report::{Report, ReportStatus, ReportType};
pub use user::{User, UserStatus};
pub use verification_code::{CodeType, VerificationCode};

/// A record type bound to one collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection (table) name.
    const COLLECTION: &'static str;
}

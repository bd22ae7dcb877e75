//! Business logic services.

pub mod chat;
pub mod delivery;
pub mod device;
pub mod factory;
pub mod geolocation;
pub mod permission;
pub mod region;
pub mod session;
pub mod user;
pub mod verification;

pub use chat::{ChatService, CreateDirectConversationInput, StoreChatService};
pub use delivery::{CodeDelivery, LogCodeDelivery, log_delivery};
pub use device::{DeviceRegistry, ParsedUserAgent, RecordDeviceInput, parse_user_agent};
pub use factory::{ServiceRegistry, Services};
pub use geolocation::{GeoInfo, GeoLocator, GeoProvider, HttpGeoProvider};
pub use permission::{ChatPermissionEngine, DenyReason, PermissionDecision, SocialGraph};
pub use region::{RegionContext, RegionResolver, RegionSource, Resolution};
pub use session::{HttpSessionRevoker, SessionRevoker};
pub use user::{
    CreateReportInput, CreateUserInput, PrivacySettings, StatusChange, StoreUserService,
    UpdateProfileInput, UpdateReportInput, UserService,
};
pub use verification::{CodeCheck, CodeIssue, IssuedCode, VerificationService, normalize_email};

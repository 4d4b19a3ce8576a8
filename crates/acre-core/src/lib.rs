pub mod ids;
pub mod protocol;

pub use ids::{AreaId, ConnectionId, UserId, VersionId};
pub use protocol::{Envelope, FrameError, InboundFrame, UserStatus, USERS_STATUS};

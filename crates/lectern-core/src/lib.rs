pub mod assist;
pub mod events;
pub mod ids;
pub mod model;
pub mod presence;
pub mod role;

pub use assist::{AssistError, Assistant};
pub use events::{ClientFrame, SessionEvent};
pub use ids::{ConnectionId, CourseId, DeviceId, SessionId};
pub use model::{FeedbackKind, MomentTrigger, QuestionStatus};
pub use presence::{PresenceError, PresenceStore};
pub use role::{GroupKey, Role};

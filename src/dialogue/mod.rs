//! 远端对话服务边界
//!
//! 所有实现（HTTP / Mock）实现 DialogueService：create_session（POST /session）、send_turn（POST /session/{id}/turns）。

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpDialogueService;
pub use mock::MockDialogueService;
pub use traits::{DialogueService, SessionCreated, SessionRequest, TurnReply, TurnRequest};

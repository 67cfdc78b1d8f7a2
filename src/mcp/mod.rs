pub mod bridge;
pub mod dispatcher;
pub(crate) mod frame;
pub mod tools;
pub mod types;

pub use bridge::ToolBridge;
pub use dispatcher::MessageDispatcher;
pub use tools::{ApiRequest, ToolDescriptor, ToolRegistry, NOTION_API_TOOL};
pub use types::{FunctionCall, HttpMethod, OutboundEvent};

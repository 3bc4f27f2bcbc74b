//! Socket RPC: line-delimited JSON requests over TCP, a fixed resource and
//! tool registry, and polled change subscriptions.

pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod subscriptions;

pub use dispatcher::RpcDispatcher;
pub use protocol::{Method, Request, Response};
pub use registry::{Registry, Resource, ResourceKind, Tool, ToolKind, ToolResult};
pub use server::{RpcServer, RunningServer};
pub use subscriptions::{ChangeEvent, ClientId, SubscriptionTable, MAX_SUBSCRIPTIONS};

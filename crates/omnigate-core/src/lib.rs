//! The dispatch engine at the heart of the gateway: request/response types,
//! the provider adapter and plugin traits, per-provider worker pools, the
//! retry/backoff controller, and the `Dispatcher` that ties them together.
//!
//! This crate depends on no concrete provider SDK and no HTTP framework.
//! `omnigate-provider` supplies reference `Account`/`ProviderAdapter`
//! implementations; `omnigate-mcp` supplies an MCP tool-manager `Plugin`.

pub mod account;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod headers;
pub mod key;
pub mod plugin;
pub mod pool;
pub mod provider_adapter;
pub mod registry;
pub mod request;
pub mod response;
pub mod retry;
pub mod worker;

pub use account::{Account, AccountError, EmptyAccount};
pub use config::{BackpressurePolicy, ConcurrencyAndBufferSize, NetworkConfig, ProviderConfig};
pub use context::{DispatchContext, MCP_INCLUDE_CLIENTS, MCP_INCLUDE_TOOLS};
pub use dispatcher::{AdapterFactory, BifrostConfig, Dispatcher};
pub use envelope::{ChannelMessage, DispatchReply, QueuedMessage};
pub use errors::{BifrostError, ErrorDetail, ErrorType};
pub use events::{
    Event, EventHub, EventSink, FallbackEngagedEvent, OperationalEvent, ProviderUnavailableEvent,
    ProviderUpdatedEvent, RetryExhaustedEvent, TerminalEventSink,
};
pub use headers::{Headers, header_get, header_remove, header_set};
pub use key::{Key, KeySelectionError, select_key};
pub use plugin::{Plugin, PreHookOutcome, run_post_hooks, run_pre_hooks};
pub use pool::Pool;
pub use provider_adapter::{ProviderAdapter, StreamReceiver};
pub use registry::{ProviderEntry, ProviderRegistry};
pub use request::{
    BifrostRequest, ChatMessage, Fallback, Params, RequestInput, RequestKind, ToolCall,
};
pub use response::{BifrostResponse, ExtraFields, ResponseBody, StreamChunk, Usage};
pub use retry::{AttemptOutcome, backoff_delay, is_rate_limit_message, is_retryable};

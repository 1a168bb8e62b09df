/// Durable ingestion queue name
pub const CHAT_QUEUE: &str = "chat.queue";

/// Exchange the ingestion queue is bound to
pub const CHAT_EXCHANGE: &str = "chat.exchange";

/// Routing key for chat message payloads
pub const CHAT_ROUTING_KEY: &str = "chat.message";

/// Prefix of every private two-party channel name
pub const PRIVATE_CHANNEL_PREFIX: &str = "private_";

/// Default page size for channel-wide message history
pub const DEFAULT_CHAT_PAGE_SIZE: u32 = 10;

/// Default page size for conversation message history
pub const DEFAULT_CONVERSATION_PAGE_SIZE: u32 = 20;

/// Delay before pushing a friend-request snapshot to a fresh subscriber,
/// in milliseconds
pub const DEFAULT_SNAPSHOT_DELAY_MS: u64 = 200;

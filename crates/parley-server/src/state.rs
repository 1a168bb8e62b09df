//! Application state shared across all HTTP and WebSocket handlers.

use std::sync::Arc;

use parley_broker::Broker;
use parley_store::Database;
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::conversations::ConversationService;
use crate::friends::FriendService;
use crate::identity::IdentityGateway;
use crate::notify::Notifier;
use crate::relay::MessageRelay;

/// Shared handle to the single database connection.
pub type Db = Arc<Mutex<Database>>;

/// Central application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub broker: Broker,
    pub friends: Arc<FriendService<IdentityGateway>>,
    pub conversations: Arc<ConversationService>,
    pub relay: Arc<MessageRelay>,
    pub notifier: Notifier,
    pub config: Arc<ServerConfig>,
}

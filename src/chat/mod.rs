pub mod connection;
pub mod format;
pub mod store;

pub use connection::{
    CableConnection, CableConnector, ChannelConnector, ChannelError, ChannelParams, ConnectionState, Inbound,
    RealtimeChannel,
};
pub use store::{ConversationStore, StoreError, StoreEvent};

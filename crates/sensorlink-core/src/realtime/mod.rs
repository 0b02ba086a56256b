// Realtime broker connection: state machine, broker seam, and manager.

mod link;
mod manager;
mod state;

pub use link::{BrokerConnector, BrokerLink, MqttConnector};
pub use manager::{ConnectionManager, RealtimeMessage};
pub use state::{ConnectionState, SubscribeAction, SubscriptionState};

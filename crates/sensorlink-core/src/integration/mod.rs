// Backend integration: endpoint verification and forwarding state.

mod coordinator;
mod endpoint;

pub use coordinator::{ChangeSubscription, IntegrationCoordinator, IntegrationSnapshot};
pub use endpoint::normalize_endpoint;

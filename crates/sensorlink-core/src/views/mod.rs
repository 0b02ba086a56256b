// The dashboard's three screens.

mod auth;
mod device_detail;
mod device_list;

pub use auth::AuthView;
pub use device_detail::{topic_for, DeviceDetailView, LastMessage};
pub use device_list::{DeviceListView, IntegrationChange};

pub const AUTH_VIEW: &str = "auth";
pub const DEVICE_LIST_VIEW: &str = "deviceList";
pub const DEVICE_DETAIL_VIEW: &str = "deviceDetail";

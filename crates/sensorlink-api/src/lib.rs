// sensorlink-api: Async clients for the sensor backend and the realtime broker

pub mod broker;
pub mod error;
pub mod health;
pub mod sensor;
pub mod transport;

pub use broker::{BrokerEvent, BrokerOptions, BrokerSession};
pub use error::Error;
pub use sensor::{SensorApiClient, SensorReading};
pub use transport::{TlsMode, TransportConfig};

pub mod app_config;
pub mod database;
mod rows;
pub mod return_repo;
pub mod shipment_repo;
pub mod vendor_repo;

#[cfg(feature = "kafka")]
pub mod events;

pub use app_config::Config;
pub use database::DbClient;
pub use return_repo::PgReturnRepository;
pub use shipment_repo::PgShipmentRepository;
pub use vendor_repo::PgVendorOrderRepository;

#[cfg(feature = "kafka")]
pub use events::EventProducer;

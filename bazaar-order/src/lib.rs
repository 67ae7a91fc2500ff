pub mod models;
pub mod status_map;
pub mod lifecycle;
pub mod repository;
pub mod memory;
pub mod mock_carrier;
pub mod settlement;
pub mod analytics;
pub mod returns;
pub mod synchronizer;

pub use models::{
    PaymentModel, RefundLedgerEntry, ReturnRequest, ReturnStatus, ReturnType, Shipment,
    ShipmentStatus, Vendor, VendorOrder, VendorOrderStatus,
};
pub use lifecycle::{CarrierStatusEvent, Disposition, SyncOutcome};
pub use memory::MemoryStore;
pub use mock_carrier::MockCarrierGateway;
pub use returns::ReturnWorkflow;
pub use settlement::SettlementEngine;
pub use status_map::map_carrier_status;
pub use synchronizer::{GhnWebhookPayload, ShipmentSynchronizer};

pub mod models;
pub mod pii;

pub use models::events::NotificationEvent;
pub use pii::Masked;

use crate::models::ShipmentStatus;

/// Carrier status a freshly booked shipment starts in.
pub const CREATION_STATUS: &str = "ready_to_pick";
/// Carrier status recorded for a successful cancellation.
pub const CANCELLATION_STATUS: &str = "cancel";

/// Map a GHN status code onto the internal vocabulary.
///
/// Matching ignores surrounding whitespace and case. Anything unrecognised maps to
/// [`ShipmentStatus::Unknown`], which callers record but never apply.
pub fn map_carrier_status(carrier_status: &str) -> ShipmentStatus {
    match carrier_status.trim().to_ascii_lowercase().as_str() {
        "ready_to_pick" | "picking" | "money_collect_picking" => ShipmentStatus::Pending,
        "picked" | "storing" => ShipmentStatus::PickedUp,
        "transporting" | "sorting" | "delivering" | "money_collect_delivering" => {
            ShipmentStatus::InTransit
        }
        "delivered" => ShipmentStatus::Delivered,
        // Failed attempts, incidents and pending return requests go back to the
        // pending bucket; the monotonic rule keeps them from regressing an
        // advanced shipment. The carrier may still retry delivery after these.
        "delivery_fail" | "return_fail" | "exception" | "damage" | "lost"
        | "waiting_to_return" | "return" => ShipmentStatus::Pending,
        "cancel" => ShipmentStatus::Cancelled,
        "return_transporting" | "return_sorting" | "returning" | "returned" => {
            ShipmentStatus::Returned
        }
        _ => ShipmentStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_codes() {
        assert_eq!(map_carrier_status("ready_to_pick"), ShipmentStatus::Pending);
        assert_eq!(map_carrier_status("picked"), ShipmentStatus::PickedUp);
        assert_eq!(map_carrier_status("storing"), ShipmentStatus::PickedUp);
        assert_eq!(map_carrier_status("delivering"), ShipmentStatus::InTransit);
        assert_eq!(map_carrier_status("delivered"), ShipmentStatus::Delivered);
        assert_eq!(map_carrier_status("cancel"), ShipmentStatus::Cancelled);
        assert_eq!(map_carrier_status("return_sorting"), ShipmentStatus::Returned);
    }

    #[test]
    fn test_normalisation_and_unknown() {
        assert_eq!(map_carrier_status("  Delivered "), ShipmentStatus::Delivered);
        assert_eq!(map_carrier_status("PICKED"), ShipmentStatus::PickedUp);
        assert_eq!(map_carrier_status("teleported"), ShipmentStatus::Unknown);
        assert_eq!(map_carrier_status(""), ShipmentStatus::Unknown);
    }

    #[test]
    fn test_incidents_do_not_advance() {
        for code in ["delivery_fail", "lost", "damage"] {
            assert!(!ShipmentStatus::InTransit.can_transition_to(map_carrier_status(code)));
        }
    }

    #[test]
    fn test_return_requests_are_not_terminal() {
        for code in ["waiting_to_return", "return"] {
            let status = map_carrier_status(code);
            assert!(!status.is_terminal());
            assert!(!ShipmentStatus::InTransit.can_transition_to(status));
        }
        assert!(map_carrier_status("returning").is_terminal());
    }
}

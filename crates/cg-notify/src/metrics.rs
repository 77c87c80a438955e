//! Alert metrics.

use metrics::counter;

use cg_models::DeliveryMode;

/// Metric name constants for consistency.
pub mod names {
    /// Alert messages attempted, by delivery mode and result.
    pub const ALERTS_SENT_TOTAL: &str = "crowdguard_alerts_sent_total";

    /// Contacts skipped because their phone number could not be normalized.
    pub const CONTACTS_SKIPPED_TOTAL: &str = "crowdguard_alert_contacts_skipped_total";
}

pub(crate) fn record_alert(mode: DeliveryMode, delivered: bool) {
    counter!(
        names::ALERTS_SENT_TOTAL,
        "mode" => mode.as_str(),
        "delivered" => if delivered { "true" } else { "false" }
    )
    .increment(1);
}

pub(crate) fn record_skipped_contact() {
    counter!(names::CONTACTS_SKIPPED_TOTAL).increment(1);
}

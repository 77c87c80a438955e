//! Alert message text.

/// The SMS body sent to every guard at a crowded gate.
pub fn compose_alert_message(count: u32, gate: &str) -> String {
    format!(
        "High crowd detected ({} people) at {}. Deploy immediately.",
        count, gate
    )
}

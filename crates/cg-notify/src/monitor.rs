//! Alerts driven by a live feed's per-frame counts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cg_models::AccountId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::dispatcher::{AlertDispatcher, Contact};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Last live alert per (account, gate), shared by every feed of that gate.
///
/// Viewers come and go; the cooldown belongs to the gate, so a reconnect or a
/// second viewer cannot text the guards again early.
#[derive(Clone)]
pub struct AlertCooldowns {
    cooldown: Duration,
    last_alert: Arc<Mutex<HashMap<(AccountId, String), Instant>>>,
}

impl AlertCooldowns {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Claim the alert slot for a gate. Returns false while the gate is cooling down.
    pub fn try_claim(&self, account: &AccountId, gate: &str) -> bool {
        let now = Instant::now();
        let mut last_alert = match self.last_alert.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        last_alert.retain(|_, at| now.duration_since(*at) < self.cooldown);

        let key = (account.clone(), gate.to_string());
        if last_alert.contains_key(&key) {
            return false;
        }
        last_alert.insert(key, now);
        true
    }
}

impl Default for AlertCooldowns {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Watches live counts for one feed and alerts when the gate's cooldown allows.
pub struct LiveAlertMonitor {
    dispatcher: Arc<AlertDispatcher>,
    cooldowns: AlertCooldowns,
}

impl LiveAlertMonitor {
    pub fn new(dispatcher: Arc<AlertDispatcher>, cooldowns: AlertCooldowns) -> Self {
        Self { dispatcher, cooldowns }
    }

    /// Run until the count sender is dropped, which happens when the stream ends.
    pub fn spawn(
        self,
        mut counts: watch::Receiver<u32>,
        account: AccountId,
        gate: String,
        threshold: u32,
        contacts: Vec<Contact>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut alerts = 0u32;

            while counts.changed().await.is_ok() {
                let count = *counts.borrow_and_update();
                if count <= threshold {
                    continue;
                }
                if !self.cooldowns.try_claim(&account, &gate) {
                    debug!(
                        account = %account,
                        gate = %gate,
                        count,
                        "Live alert suppressed by cooldown"
                    );
                    continue;
                }

                alerts += 1;
                self.dispatcher.dispatch(count, threshold, &gate, &contacts).await;
            }

            info!(account = %account, gate = %gate, alerts, "Live alert monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyResult;
    use crate::gateway::SmsGateway;
    use async_trait::async_trait;
    use cg_models::PhoneNumber;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGateway {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl SmsGateway for CountingGateway {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn send(&self, _to: &PhoneNumber, _message: &str) -> NotifyResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup() -> (Arc<CountingGateway>, Arc<AlertDispatcher>) {
        let gateway = Arc::new(CountingGateway::default());
        let dispatcher = Arc::new(AlertDispatcher::new(gateway.clone(), Duration::from_secs(1)));
        (gateway, dispatcher)
    }

    fn account(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    fn contacts() -> Vec<Contact> {
        vec![Contact::new("Ravi", "9876543210")]
    }

    #[tokio::test]
    async fn test_cooldown_limits_alerts() {
        let (gateway, dispatcher) = setup();
        let monitor = LiveAlertMonitor::new(dispatcher, AlertCooldowns::default());
        let (tx, rx) = watch::channel(0);
        let handle = monitor.spawn(rx, account("ops@x.in"), "GateA".to_string(), 3, contacts());

        tx.send(5).unwrap();
        tokio::task::yield_now().await;
        tx.send(6).unwrap();
        tokio::task::yield_now().await;
        tx.send(8).unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(gateway.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_below_threshold_never_alerts_and_monitor_ends() {
        let (gateway, dispatcher) = setup();
        let monitor = LiveAlertMonitor::new(dispatcher, AlertCooldowns::default());
        let (tx, rx) = watch::channel(0);
        let handle = monitor.spawn(rx, account("ops@x.in"), "GateA".to_string(), 3, contacts());

        for c in [0, 1, 3, 2] {
            tx.send(c).unwrap();
            tokio::task::yield_now().await;
        }
        drop(tx);

        handle.await.unwrap();
        assert_eq!(gateway.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cooldown_survives_reconnects() {
        let (gateway, dispatcher) = setup();
        let cooldowns = AlertCooldowns::default();

        for _ in 0..4 {
            let monitor = LiveAlertMonitor::new(Arc::clone(&dispatcher), cooldowns.clone());
            let (tx, rx) = watch::channel(0);
            let handle = monitor.spawn(rx, account("ops@x.in"), "GateA".to_string(), 3, contacts());
            tx.send(7).unwrap();
            drop(tx);
            handle.await.unwrap();
        }

        assert_eq!(gateway.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_per_account_and_gate_and_expires() {
        let cooldowns = AlertCooldowns::new(Duration::from_secs(60));
        let ops = account("ops@x.in");
        let other = account("other@x.in");

        assert!(cooldowns.try_claim(&ops, "GateA"));
        assert!(!cooldowns.try_claim(&ops, "GateA"));
        assert!(cooldowns.try_claim(&ops, "GateB"));
        assert!(cooldowns.try_claim(&other, "GateA"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cooldowns.try_claim(&ops, "GateA"));
    }
}

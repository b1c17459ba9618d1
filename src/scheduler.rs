use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::database::ReminderStore;
use crate::error::DeliveryError;
use crate::model::reminder::Reminder;
use crate::recurrence::next_occurrence;

/// The outbound seam: the messaging front-end renders and sends the
/// reminder, the scheduler only needs to know whether it worked.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(
        &self,
        reminder: &Reminder,
    ) -> Result<(), DeliveryError>;
}

/// Periodic delivery driver. Each tick pulls the due set, hands every
/// reminder to the deliverer, and archives (one-shot) or re-arms
/// (recurring) the ones that went out. A failed delivery leaves the
/// reminder due, so it is retried next tick: at-least-once, not
/// exactly-once.
///
/// Run exactly one scheduler per store file. Two instances over the same
/// store deliver every due reminder twice.
pub struct Scheduler {
    store: Arc<ReminderStore>,
    deliverer: Arc<dyn Deliver>,
    period: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<ReminderStore>,
        deliverer: Arc<dyn Deliver>,
        period: Duration,
    ) -> Self {
        Self { store, deliverer, period }
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    /// Ticks never overlap: the next poll is not scheduled until the
    /// whole due set of the current one has been processed, and a
    /// shutdown observed mid-tick lets that tick finish first.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("reminder scheduler started, period {:?}", self.period);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                },
                _ = shutdown.changed() => {
                    info!("reminder scheduler stopping");
                    return;
                },
            }
        }
    }

    /// One poll: processes every reminder due at `now` independently, so
    /// a single failure never blocks the rest of the tick. Never errors;
    /// per-reminder problems are logged and retried on a later tick.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
    ) {
        let due = match self.store.due_before(now).await {
            Ok(due) => due,
            Err(why) => {
                error!("failed to read due reminders: {why}");
                return;
            },
        };

        for reminder in due {
            if let Err(why) = self.deliverer.deliver(&reminder).await {
                // Left unsent on purpose: the next tick retries it.
                warn!(
                    "delivery of reminder {} failed, will retry: {why}",
                    reminder.id
                );
                continue;
            }

            match reminder.recurrence {
                Some(recurrence) => {
                    let next =
                        next_occurrence(reminder.remind_at, &recurrence);
                    match self.store.reschedule(reminder.id, next).await {
                        Ok(()) => info!(
                            "delivered recurring reminder {}, next at {next}",
                            reminder.id
                        ),
                        Err(why) => error!(
                            "failed to reschedule reminder {}: {why}",
                            reminder.id
                        ),
                    }
                },
                None => match self.store.mark_sent(reminder.id).await {
                    Ok(()) => {
                        info!("delivered one-shot reminder {}", reminder.id)
                    },
                    Err(why) => error!(
                        "failed to mark reminder {} sent: {why}",
                        reminder.id
                    ),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;
    use crate::model::reminder::{
        Mention, NewReminder, Recurrence, RecurrenceKind,
    };

    /// Records delivered ids; fails delivery for ids in `failing`.
    #[derive(Default)]
    struct StubDeliverer {
        delivered: Mutex<Vec<i64>>,
        failing: Mutex<HashSet<i64>>,
    }

    #[async_trait]
    impl Deliver for StubDeliverer {
        async fn deliver(
            &self,
            reminder: &Reminder,
        ) -> Result<(), DeliveryError> {
            if self.failing.lock().unwrap().contains(&reminder.id) {
                return Err("channel unavailable".into());
            }
            self.delivered.lock().unwrap().push(reminder.id);
            Ok(())
        }
    }

    fn instant(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, 0, 0).unwrap()
    }

    fn reminder_at(
        remind_at: DateTime<Utc>,
        recurrence: Option<Recurrence>,
    ) -> NewReminder {
        NewReminder {
            owner_id: "u1".to_owned(),
            channel_id: "c1".to_owned(),
            guild_id: None,
            message: "stand up".to_owned(),
            remind_at,
            recurrence,
            pattern: None,
            mention: Mention::User,
        }
    }

    async fn fixture() -> (Arc<ReminderStore>, Arc<StubDeliverer>, Scheduler)
    {
        let store =
            Arc::new(ReminderStore::open(":memory:").await.unwrap());
        let deliverer = Arc::new(StubDeliverer::default());
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&deliverer) as Arc<dyn Deliver>,
            Duration::from_secs(60),
        );
        (store, deliverer, scheduler)
    }

    #[tokio::test]
    async fn one_shot_is_archived_after_delivery() {
        let (store, deliverer, scheduler) = fixture().await;
        let id = store.add(reminder_at(instant(9), None)).await.unwrap();

        scheduler.tick(instant(10)).await;

        assert_eq!(*deliverer.delivered.lock().unwrap(), vec![id]);
        assert!(store.due_before(instant(23)).await.unwrap().is_empty());

        // Nothing left for later ticks.
        scheduler.tick(instant(11)).await;
        assert_eq!(deliverer.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn not_yet_due_reminders_stay_pending() {
        let (store, deliverer, scheduler) = fixture().await;
        store.add(reminder_at(instant(12), None)).await.unwrap();

        scheduler.tick(instant(10)).await;
        assert!(deliverer.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recurring_is_rescheduled_not_archived() {
        let (store, _deliverer, scheduler) = fixture().await;
        let rec =
            Recurrence { kind: RecurrenceKind::Days, interval: 2 };
        let id = store
            .add(reminder_at(instant(9), Some(rec)))
            .await
            .unwrap();

        scheduler.tick(instant(10)).await;

        let all = store.list_all_active().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert!(!all[0].sent);
        assert_eq!(all[0].remind_at, instant(9) + ChronoDuration::days(2));
    }

    #[tokio::test]
    async fn repeated_cycles_keep_the_original_cadence() {
        let (store, deliverer, scheduler) = fixture().await;
        let rec =
            Recurrence { kind: RecurrenceKind::Daily, interval: 1 };
        let start = instant(9);
        let id =
            store.add(reminder_at(start, Some(rec))).await.unwrap();

        for n in 1..=4i64 {
            scheduler.tick(start + ChronoDuration::days(n - 1)).await;
            let current = &store.list_all_active().await.unwrap()[0];
            assert_eq!(current.remind_at, start + ChronoDuration::days(n));
            assert!(!current.sent);
        }
        assert_eq!(*deliverer.delivered.lock().unwrap(), vec![id; 4]);
    }

    #[tokio::test]
    async fn failed_delivery_leaves_the_reminder_due() {
        let (store, deliverer, scheduler) = fixture().await;
        let id = store.add(reminder_at(instant(9), None)).await.unwrap();
        deliverer.failing.lock().unwrap().insert(id);

        scheduler.tick(instant(10)).await;
        assert!(deliverer.delivered.lock().unwrap().is_empty());
        assert_eq!(store.due_before(instant(10)).await.unwrap().len(), 1);

        // Collaborator recovers; the next tick retries and archives.
        deliverer.failing.lock().unwrap().clear();
        scheduler.tick(instant(11)).await;
        assert_eq!(*deliverer.delivered.lock().unwrap(), vec![id]);
        assert!(store.due_before(instant(23)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_rest_of_the_tick() {
        let (store, deliverer, scheduler) = fixture().await;
        let failing =
            store.add(reminder_at(instant(8), None)).await.unwrap();
        let healthy =
            store.add(reminder_at(instant(9), None)).await.unwrap();
        deliverer.failing.lock().unwrap().insert(failing);

        scheduler.tick(instant(10)).await;

        assert_eq!(*deliverer.delivered.lock().unwrap(), vec![healthy]);
        let still_due = store.due_before(instant(10)).await.unwrap();
        assert_eq!(still_due.len(), 1);
        assert_eq!(still_due[0].id, failing);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let (_store, _deliverer, scheduler) = fixture().await;
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

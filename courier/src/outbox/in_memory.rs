//! 基于内存的发件箱存储
//!
//! 进程级单例，按关联 ID 分区；每个分区一把锁，不同分区之间互不争用。
//! 分区只在 `clear` 时被移除，长期运行的进程需要自行在操作结束时清理。
//!
use super::storage::{OutboxEntry, OutboxStorage};
use crate::distribution::DistributionMode;
use crate::error::{MediatorError, MediatorResult};
use crate::message::AnyEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

type Partition = Arc<Mutex<Vec<OutboxEntry>>>;

#[derive(Default)]
pub struct InMemoryOutboxStorage {
    partitions: DashMap<Uuid, Partition>,
}

impl InMemoryOutboxStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前持有的分区数量
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn is_attached(&self, correlation_id: Uuid, partition: &Partition) -> bool {
        self.partitions
            .get(&correlation_id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), partition))
    }

    fn partition(&self, correlation_id: Uuid) -> Option<Partition> {
        self.partitions.get(&correlation_id).map(|p| p.value().clone())
    }

    async fn snapshot<F>(&self, correlation_id: Uuid, filter: F) -> Vec<OutboxEntry>
    where
        F: Fn(&OutboxEntry) -> bool + Send,
    {
        let Some(partition) = self.partition(correlation_id) else {
            return Vec::new();
        };
        let entries = partition.lock().await;
        entries.iter().filter(|e| filter(e)).cloned().collect()
    }

    async fn update<F>(&self, correlation_id: Uuid, entry_id: Uuid, f: F) -> MediatorResult<()>
    where
        F: FnOnce(&mut OutboxEntry) -> bool + Send,
    {
        let partition = self
            .partition(correlation_id)
            .ok_or(MediatorError::OutboxEntryNotFound(entry_id))?;
        let mut entries = partition.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id() == entry_id)
            .ok_or(MediatorError::OutboxEntryNotFound(entry_id))?;

        if !f(entry) {
            trace!(%entry_id, status = ?entry.status(), "terminal outbox entry left unchanged");
        }
        Ok(())
    }

    async fn find(&self, correlation_id: Uuid, entry_id: Uuid) -> Option<OutboxEntry> {
        let partition = self.partition(correlation_id)?;
        let entries = partition.lock().await;
        entries.iter().find(|e| e.id() == entry_id).cloned()
    }
}

#[async_trait]
impl OutboxStorage for InMemoryOutboxStorage {
    async fn add(
        &self,
        correlation_id: Uuid,
        event: Arc<dyn AnyEvent>,
        distribution_mode: DistributionMode,
    ) -> MediatorResult<Uuid> {
        let entry = OutboxEntry::new(event, distribution_mode);
        let id = entry.id();

        // `clear` 可能在取锁期间移除分区，写入前确认分区仍挂在表上
        loop {
            let partition = self
                .partitions
                .entry(correlation_id)
                .or_default()
                .value()
                .clone();
            let mut entries = partition.lock().await;
            if !self.is_attached(correlation_id, &partition) {
                trace!(%correlation_id, "outbox partition cleared while adding, retrying");
                continue;
            }

            debug!(%correlation_id, entry_id = %id, event = entry.event_name(), mode = %distribution_mode, "outbox entry stored");
            entries.push(entry);
            return Ok(id);
        }
    }

    async fn pending(&self, correlation_id: Uuid) -> MediatorResult<Vec<OutboxEntry>> {
        let now = Utc::now();
        Ok(self.snapshot(correlation_id, |e| e.is_due(now)).await)
    }

    async fn mark_processed(&self, correlation_id: Uuid, entry_id: Uuid) -> MediatorResult<()> {
        self.update(correlation_id, entry_id, |e| e.mark_processed(Utc::now()))
            .await
    }

    async fn mark_failed(
        &self,
        correlation_id: Uuid,
        entry_id: Uuid,
        reason: &str,
        dead_letter: bool,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> MediatorResult<()> {
        self.update(correlation_id, entry_id, |e| {
            e.mark_failed(reason, dead_letter, next_attempt_at)
        })
        .await
    }

    async fn dead_letters(&self, correlation_id: Uuid) -> MediatorResult<Vec<OutboxEntry>> {
        Ok(self.snapshot(correlation_id, OutboxEntry::is_dead_letter).await)
    }

    async fn attempt_count(
        &self,
        correlation_id: Uuid,
        entry_id: Uuid,
    ) -> MediatorResult<Option<u32>> {
        Ok(self
            .find(correlation_id, entry_id)
            .await
            .map(|e| e.attempts()))
    }

    async fn distribution_mode(
        &self,
        correlation_id: Uuid,
        entry_id: Uuid,
    ) -> MediatorResult<DistributionMode> {
        Ok(self
            .find(correlation_id, entry_id)
            .await
            .map_or(DistributionMode::LOCAL, |e| e.distribution_mode()))
    }

    async fn entries(&self, correlation_id: Uuid) -> MediatorResult<Vec<OutboxEntry>> {
        Ok(self.snapshot(correlation_id, |_| true).await)
    }

    async fn clear(&self, correlation_id: Uuid) -> MediatorResult<()> {
        if self.partitions.remove(&correlation_id).is_some() {
            debug!(%correlation_id, "outbox partition cleared");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Event, Message};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Logged(u32);

    impl Message for Logged {
        const NAME: &'static str = "Logged";
    }

    impl Event for Logged {}

    fn event(n: u32) -> Arc<dyn AnyEvent> {
        Arc::new(Logged(n))
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let storage = InMemoryOutboxStorage::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        storage.add(a, event(1), DistributionMode::LOCAL).await.unwrap();
        storage.add(b, event(2), DistributionMode::EXTERNAL).await.unwrap();

        assert_eq!(storage.pending(a).await.unwrap().len(), 1);
        assert_eq!(storage.pending(b).await.unwrap().len(), 1);
        assert_eq!(storage.partition_count(), 2);

        storage.clear(a).await.unwrap();
        assert!(storage.pending(a).await.unwrap().is_empty());
        assert_eq!(storage.pending(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_keeps_insertion_order_and_skips_terminal_entries() {
        let storage = InMemoryOutboxStorage::new();
        let cid = Uuid::new_v4();

        let first = storage.add(cid, event(1), DistributionMode::LOCAL).await.unwrap();
        let second = storage.add(cid, event(2), DistributionMode::LOCAL).await.unwrap();
        let third = storage.add(cid, event(3), DistributionMode::LOCAL).await.unwrap();

        storage.mark_processed(cid, second).await.unwrap();
        storage
            .mark_failed(cid, third, "boom", true, None)
            .await
            .unwrap();

        let pending: Vec<_> = storage
            .pending(cid)
            .await
            .unwrap()
            .iter()
            .map(OutboxEntry::id)
            .collect();
        assert_eq!(pending, vec![first]);

        let dead = storage.dead_letters(cid).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id(), third);
        assert_eq!(storage.entries(cid).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn accessors_report_attempts_and_mode() {
        let storage = InMemoryOutboxStorage::new();
        let cid = Uuid::new_v4();
        let id = storage.add(cid, event(1), DistributionMode::EXTERNAL).await.unwrap();

        storage.mark_failed(cid, id, "x", false, None).await.unwrap();
        storage.mark_failed(cid, id, "y", false, None).await.unwrap();

        assert_eq!(storage.attempt_count(cid, id).await.unwrap(), Some(2));
        assert_eq!(
            storage.distribution_mode(cid, id).await.unwrap(),
            DistributionMode::EXTERNAL
        );

        let unknown = Uuid::new_v4();
        assert_eq!(storage.attempt_count(cid, unknown).await.unwrap(), None);
        assert_eq!(
            storage.distribution_mode(cid, unknown).await.unwrap(),
            DistributionMode::LOCAL
        );
    }

    #[tokio::test]
    async fn unknown_entry_cannot_be_marked() {
        let storage = InMemoryOutboxStorage::new();
        let cid = Uuid::new_v4();
        storage.add(cid, event(1), DistributionMode::LOCAL).await.unwrap();

        let missing = Uuid::new_v4();
        assert!(matches!(
            storage.mark_processed(cid, missing).await,
            Err(MediatorError::OutboxEntryNotFound(id)) if id == missing
        ));
        assert!(matches!(
            storage.mark_processed(Uuid::new_v4(), missing).await,
            Err(MediatorError::OutboxEntryNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn entries_added_after_a_clear_returns_are_kept() {
        let storage = Arc::new(InMemoryOutboxStorage::new());
        let cid = Uuid::new_v4();

        for round in 0..200 {
            let adder = {
                let storage = storage.clone();
                tokio::spawn(async move { storage.add(cid, event(round), DistributionMode::LOCAL).await })
            };
            let clearer = {
                let storage = storage.clone();
                tokio::spawn(async move { storage.clear(cid).await })
            };
            adder.await.unwrap().unwrap();
            clearer.await.unwrap().unwrap();

            // 清理全部完成之后的写入必须可见
            let id = storage.add(cid, event(round), DistributionMode::LOCAL).await.unwrap();
            let ids: Vec<_> = storage
                .pending(cid)
                .await
                .unwrap()
                .iter()
                .map(OutboxEntry::id)
                .collect();
            assert!(ids.contains(&id), "entry lost in round {round}");
            assert_eq!(storage.partition_count(), 1);
        }
    }

    #[tokio::test]
    async fn add_retries_when_the_partition_was_detached() {
        let storage = InMemoryOutboxStorage::new();
        let cid = Uuid::new_v4();
        storage.add(cid, event(1), DistributionMode::LOCAL).await.unwrap();

        let detached = storage.partition(cid).unwrap();
        storage.clear(cid).await.unwrap();
        assert!(!storage.is_attached(cid, &detached));

        let id = storage.add(cid, event(2), DistributionMode::LOCAL).await.unwrap();
        let partition = storage.partition(cid).unwrap();
        assert!(storage.is_attached(cid, &partition));
        assert!(!Arc::ptr_eq(&partition, &detached));
        assert_eq!(storage.entries(cid).await.unwrap()[0].id(), id);
        assert!(detached.lock().await.iter().all(|e| e.id() != id));
    }

    #[tokio::test]
    async fn processed_entry_is_not_resurrected_by_a_late_failure() {
        let storage = InMemoryOutboxStorage::new();
        let cid = Uuid::new_v4();
        let id = storage.add(cid, event(1), DistributionMode::LOCAL).await.unwrap();

        storage.mark_processed(cid, id).await.unwrap();
        storage.mark_failed(cid, id, "late", true, None).await.unwrap();

        let entries = storage.entries(cid).await.unwrap();
        assert!(entries[0].is_processed());
        assert!(!entries[0].is_dead_letter());
        assert_eq!(entries[0].attempts(), 0);
    }
}

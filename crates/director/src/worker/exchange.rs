use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use super::recover_poisoned;
use crate::math::Vec3;
use crate::record::EntityRecord;

#[derive(Debug, Default)]
struct SharedBuffers {
    inbox: Vec<EntityRecord>,
    observers: Vec<Vec3>,
    published: Arc<Vec<EntityRecord>>,
    ready_for_promotion: Vec<EntityRecord>,
    waypoint_requests: Vec<EntityRecord>,
    resolved_waypoints: Vec<EntityRecord>,
    replacement: Option<Vec<EntityRecord>>,
    /// Records taken by the worker this tick and not yet published back.
    in_transit: usize,
}

/// What the owning thread gets back from one exchange.
#[derive(Debug, Default)]
pub struct MainExchange {
    /// Last background snapshot published by the worker.
    pub background: Arc<Vec<EntityRecord>>,
    pub promotions: Vec<EntityRecord>,
    pub waypoint_requests: Vec<EntityRecord>,
}

/// What the worker picks up at the start of a tick.
#[derive(Debug, Default)]
pub struct WorkerIntake {
    pub replacement: Option<Vec<EntityRecord>>,
    pub new_records: Vec<EntityRecord>,
    pub observers: Vec<Vec3>,
    pub resolved: Vec<EntityRecord>,
}

/// Background pool and promotion list as of a paused worker.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub background: Vec<EntityRecord>,
    pub ready_for_promotion: Vec<EntityRecord>,
}

/// Every buffer shared by the owning thread and the worker, behind one mutex.
#[derive(Debug, Default)]
pub struct ExchangeProtocol {
    buffers: Mutex<SharedBuffers>,
}

impl ExchangeProtocol {
    fn lock(&self) -> MutexGuard<'_, SharedBuffers> {
        recover_poisoned(self.buffers.lock(), "exchange")
    }

    /// Pushes demotions and observers in; drains promotions and waypoint requests.
    pub fn exchange_main(
        &self,
        new_demotions: Vec<EntityRecord>,
        observers: Vec<Vec3>,
    ) -> MainExchange {
        let mut buffers = self.lock();
        buffers.inbox.extend(new_demotions);
        buffers.observers = observers;
        MainExchange {
            background: Arc::clone(&buffers.published),
            promotions: mem::take(&mut buffers.ready_for_promotion),
            waypoint_requests: mem::take(&mut buffers.waypoint_requests),
        }
    }

    /// Hands resolved requests back to the worker. The lock is released on return.
    pub fn exchange_waypoints_and_unlock(&self, resolved: Vec<EntityRecord>) {
        if resolved.is_empty() {
            return;
        }
        self.lock().resolved_waypoints.extend(resolved);
    }

    pub fn enqueue_demotions(&self, records: Vec<EntityRecord>) {
        self.lock().inbox.extend(records);
    }

    /// Background entities the owning thread knows about, including ones not yet
    /// picked up by the worker.
    pub fn background_count(&self) -> usize {
        let buffers = self.lock();
        buffers.published.len() + buffers.inbox.len() + buffers.in_transit
    }

    pub(crate) fn worker_intake(&self) -> WorkerIntake {
        let mut buffers = self.lock();
        buffers.in_transit = buffers.inbox.len();
        WorkerIntake {
            replacement: buffers.replacement.take(),
            new_records: mem::take(&mut buffers.inbox),
            observers: buffers.observers.clone(),
            resolved: mem::take(&mut buffers.resolved_waypoints),
        }
    }

    pub(crate) fn worker_publish(
        &self,
        background: Vec<EntityRecord>,
        promotions: Vec<EntityRecord>,
        waypoint_requests: Vec<EntityRecord>,
    ) {
        let mut buffers = self.lock();
        buffers.published = Arc::new(background);
        buffers.in_transit = 0;
        buffers.ready_for_promotion.extend(promotions);
        buffers.waypoint_requests.extend(waypoint_requests);
    }

    /// Pool contents for persistence. Call only while the worker is parked.
    ///
    /// Resolved paths the worker has not merged yet are applied to the copy.
    pub fn snapshot(&self) -> PoolSnapshot {
        let buffers = self.lock();
        let base = buffers
            .replacement
            .as_deref()
            .unwrap_or(buffers.published.as_slice());
        let resolved: HashMap<&str, &EntityRecord> = buffers
            .resolved_waypoints
            .iter()
            .map(|record| (record.unique_name.as_str(), record))
            .collect();

        let mut background: Vec<EntityRecord> = base
            .iter()
            .chain(buffers.inbox.iter())
            .cloned()
            .collect();
        for record in &mut background {
            if let Some(result) = resolved.get(record.unique_name.as_str()) {
                record.path = result.path.clone();
                record.needs_waypoint = result.needs_waypoint;
                record.random_location = result.random_location;
            }
        }

        PoolSnapshot {
            background,
            ready_for_promotion: buffers.ready_for_promotion.clone(),
        }
    }

    /// Replaces the whole pool. Call only while the worker is parked.
    pub fn replace(&self, snapshot: PoolSnapshot) {
        let mut buffers = self.lock();
        buffers.published = Arc::new(snapshot.background.clone());
        buffers.replacement = Some(snapshot.background);
        buffers.ready_for_promotion = snapshot.ready_for_promotion;
        buffers.inbox.clear();
        buffers.waypoint_requests.clear();
        buffers.resolved_waypoints.clear();
        buffers.in_transit = 0;
    }
}

//! Per-session device state with per-device locking.
//!
//! [`DeviceStore`] keeps every tracked device in a `BTreeMap` where each
//! sample is individually protected by a [`tokio::sync::RwLock`]. The map is
//! ordered by [`DeviceId`], so sorted snapshots need no extra sort pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{DeviceId, DeviceSample};
use crate::error::TelemetryError;

/// Authoritative device state for a single session.
///
/// The key set is fixed at construction. The mutation path never inserts;
/// new devices can only be added through [`DeviceStore::register`].
///
/// # Concurrency
///
/// - Writes to the same device are serialized.
/// - Writes to different devices proceed independently.
/// - Locks are held for a single read or mutation, never across I/O.
#[derive(Debug, Default)]
pub struct DeviceStore {
    devices: RwLock<BTreeMap<DeviceId, Arc<RwLock<DeviceSample>>>>,
}

impl DeviceStore {
    /// Creates a store seeded with the given samples.
    ///
    /// Later duplicates of the same identifier replace earlier ones.
    #[must_use]
    pub fn from_seed(seed: impl IntoIterator<Item = DeviceSample>) -> Self {
        let devices = seed
            .into_iter()
            .map(|sample| (sample.device_id.clone(), Arc::new(RwLock::new(sample))))
            .collect();
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Adds a new device to the store.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::DeviceExists`] if the identifier is
    /// already tracked.
    pub async fn register(&self, sample: DeviceSample) -> Result<(), TelemetryError> {
        let mut map = self.devices.write().await;
        if map.contains_key(&sample.device_id) {
            return Err(TelemetryError::DeviceExists(sample.device_id));
        }
        map.insert(sample.device_id.clone(), Arc::new(RwLock::new(sample)));
        Ok(())
    }

    /// Returns a copy of the current sample for `id`, if tracked.
    pub async fn get(&self, id: &DeviceId) -> Option<DeviceSample> {
        let entry = self.devices.read().await.get(id).map(Arc::clone)?;
        let sample = entry.read().await.clone();
        Some(sample)
    }

    /// Applies `update` to the sample for `id` under its write lock and
    /// returns the updated sample.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::DeviceNotFound`] if `id` is not tracked.
    /// The store is left unchanged in that case.
    pub async fn upsert_delta<F>(&self, id: &DeviceId, update: F) -> Result<DeviceSample, TelemetryError>
    where
        F: FnOnce(&mut DeviceSample),
    {
        let entry = self
            .devices
            .read()
            .await
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| TelemetryError::DeviceNotFound(id.clone()))?;
        let mut sample = entry.write().await;
        update(&mut sample);
        Ok(sample.clone())
    }

    /// Returns copies of all samples ordered by device identifier.
    pub async fn snapshot_sorted(&self) -> Vec<DeviceSample> {
        let map = self.devices.read().await;
        let mut samples = Vec::with_capacity(map.len());
        for entry in map.values() {
            samples.push(entry.read().await.clone());
        }
        samples
    }

    /// Applies `update` to every sample in identifier order and returns the
    /// updated samples in that order.
    ///
    /// Each sample is updated under its own write lock, so a concurrent
    /// [`DeviceStore::upsert_delta`] lands either before or after this pass
    /// for that device, never in the middle.
    pub async fn update_each_sorted<F>(&self, mut update: F) -> Vec<DeviceSample>
    where
        F: FnMut(&mut DeviceSample),
    {
        let map = self.devices.read().await;
        let mut samples = Vec::with_capacity(map.len());
        for entry in map.values() {
            let mut sample = entry.write().await;
            update(&mut sample);
            samples.push(sample.clone());
        }
        samples
    }

    /// Returns the number of tracked devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns `true` if no devices are tracked.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

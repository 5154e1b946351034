//! Device directory contract and an in-memory implementation

use crate::errors::DirectoryError;
use crate::types::{DeviceId, StreamPath};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolves a camera to the media server path of its live stream
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn resolve_stream_path(&self, device_id: &DeviceId) -> Result<StreamPath, DirectoryError>;
}

/// Directory backed by a map, typically seeded from configuration
#[derive(Default)]
pub struct StaticDeviceDirectory {
    entries: RwLock<HashMap<DeviceId, StreamPath>>,
}

impl StaticDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (DeviceId, StreamPath)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn insert(&self, device_id: DeviceId, path: StreamPath) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = entries.insert(device_id.clone(), path) {
            log::debug!("Replaced stream path {} for device {}", previous, device_id);
        }
    }

    pub fn remove(&self, device_id: &DeviceId) -> Option<StreamPath> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(device_id)
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeviceDirectory for StaticDeviceDirectory {
    async fn resolve_stream_path(&self, device_id: &DeviceId) -> Result<StreamPath, DirectoryError> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(device_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_and_unknown() {
        let directory = StaticDeviceDirectory::from_entries([(
            DeviceId::from("cam-1"),
            StreamPath::new("live", "cam1", "play"),
        )]);

        let path = directory
            .resolve_stream_path(&DeviceId::from("cam-1"))
            .await
            .unwrap();
        assert_eq!(path.stream, "cam1");

        let err = directory
            .resolve_stream_path(&DeviceId::from("cam-9"))
            .await
            .unwrap_err();
        assert_eq!(err, DirectoryError::NotFound(DeviceId::from("cam-9")));
    }

    #[test]
    fn test_insert_remove_and_listing() {
        let directory = StaticDeviceDirectory::new();
        assert!(directory.is_empty());

        directory.insert(DeviceId::from("b"), StreamPath::new("live", "b", "play"));
        directory.insert(DeviceId::from("a"), StreamPath::new("live", "a", "play"));
        assert_eq!(directory.device_ids(), vec![DeviceId::from("a"), DeviceId::from("b")]);

        assert!(directory.remove(&DeviceId::from("a")).is_some());
        assert_eq!(directory.len(), 1);
    }
}

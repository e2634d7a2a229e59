use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use groupiron_shared::MapDescriptor;

/// Descriptor JSON serialized once at startup and shared by every request.
#[derive(Debug, Clone)]
pub struct DescriptorPayload {
    pub json: Arc<Bytes>,
    pub etag: Arc<str>,
    pub tile_count: usize,
}

impl DescriptorPayload {
    pub fn new(descriptor: &MapDescriptor) -> Result<Self, serde_json::Error> {
        let json = Bytes::from(serde_json::to_vec(descriptor)?);
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        Ok(Self {
            etag: format!("\"map-{:016x}\"", hasher.finish()).into(),
            json: Arc::new(json),
            tile_count: descriptor.tile_count(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub descriptor: DescriptorPayload,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    descriptor_requests_total: AtomicU64,
    descriptor_not_modified_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub descriptor_requests_total: u64,
    pub descriptor_not_modified_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            descriptor_requests_total: self.descriptor_requests_total.load(Ordering::Relaxed),
            descriptor_not_modified_total: self
                .descriptor_not_modified_total
                .load(Ordering::Relaxed),
        }
    }

    pub fn record_descriptor_request(&self) {
        self.descriptor_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_descriptor_not_modified(&self) {
        self.descriptor_not_modified_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(descriptor: DescriptorPayload) -> Self {
        Self {
            descriptor,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupiron_shared::RegionCoord;

    #[test]
    fn etag_follows_content() {
        let empty = DescriptorPayload::new(&MapDescriptor::default()).unwrap();
        let again = DescriptorPayload::new(&MapDescriptor::default()).unwrap();
        assert_eq!(empty.etag, again.etag);

        let mut descriptor = MapDescriptor::default();
        descriptor.insert_tile(RegionCoord::new(0, 50, 50));
        let one = DescriptorPayload::new(&descriptor).unwrap();
        assert_ne!(one.etag, empty.etag);
        assert_eq!(one.tile_count, 1);
        assert!(one.etag.starts_with("\"map-") && one.etag.ends_with('"'));
    }
}

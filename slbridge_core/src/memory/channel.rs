use super::platform::check_bounds;
use super::registry::SegmentRegistry;
use crate::descriptor::qualified_name;
use crate::error::BridgeResult;
use std::sync::Arc;

/// Payload window of a channel inside its segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentView {
    pub offset: usize,
    pub len: usize,
}

impl SegmentView {
    /// View validated against the capacity of the attached segment
    pub fn new(offset: usize, len: usize, capacity: usize) -> BridgeResult<Self> {
        check_bounds(offset, len, capacity)?;
        Ok(Self { offset, len })
    }
}

/// Whole-region copy in/out of named segments
///
/// Performs no locking: callers hold the channel's semaphore around every call.
#[derive(Debug, Clone)]
pub struct RawChannel {
    namespace: String,
    registry: Arc<SegmentRegistry>,
}

impl RawChannel {
    pub fn new(namespace: &str, registry: Arc<SegmentRegistry>) -> Self {
        Self {
            namespace: namespace.to_string(),
            registry,
        }
    }

    /// Resolve the payload view of `channel`
    pub fn view(&self, channel: &str) -> BridgeResult<SegmentView> {
        let name = qualified_name(&self.namespace, channel);
        let (descriptor, segment) = self.registry.segment(&name)?;
        SegmentView::new(descriptor.offset, descriptor.payload_len(), segment.len())
    }

    /// Copy the full payload of `channel` out of shared memory
    pub fn read(&self, channel: &str) -> BridgeResult<Vec<u8>> {
        let name = qualified_name(&self.namespace, channel);
        let (descriptor, segment) = self.registry.segment(&name)?;
        let view = SegmentView::new(descriptor.offset, descriptor.payload_len(), segment.len())?;

        let mut data = vec![0u8; view.len];
        segment.read_at(view.offset, &mut data)?;
        Ok(data)
    }

    /// Copy `data` over the full payload of `channel`
    ///
    /// A length mismatch is logged; the copy is clamped to the view, with a
    /// short input zero-filled up to the channel length.
    pub fn write(&self, channel: &str, data: &[u8]) -> BridgeResult<()> {
        let name = qualified_name(&self.namespace, channel);
        let (descriptor, segment) = self.registry.segment(&name)?;
        let view = SegmentView::new(descriptor.offset, descriptor.payload_len(), segment.len())?;

        if data.len() == view.len {
            return segment.write_at(view.offset, data);
        }

        log::warn!(
            "Wrong data length for '{}': {} bytes, channel holds {}",
            name,
            data.len(),
            view.len
        );
        let mut clamped = vec![0u8; view.len];
        let n = data.len().min(view.len);
        clamped[..n].copy_from_slice(&data[..n]);
        segment.write_at(view.offset, &clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorTable;
    use crate::error::BridgeError;
    use crate::memory::fake::FakeIpc;

    fn setup() -> (Arc<FakeIpc>, RawChannel) {
        let ipc = Arc::new(FakeIpc::new());
        ipc.add_segment(10, 16);
        ipc.add_semaphore(11, 1);
        let table = DescriptorTable::parse("robot.smData 3 1 10 16 4\nrobot.smData_sem 0 2 11 0 0")
            .unwrap();
        let registry = Arc::new(SegmentRegistry::attach(&table, ipc.clone()).unwrap());
        (ipc, RawChannel::new("robot", registry))
    }

    #[test]
    fn test_read_skips_header() {
        let (ipc, channel) = setup();
        ipc.write_segment(10, 0, &[9; 4]).unwrap();
        ipc.write_segment(10, 4, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]).unwrap();

        let data = channel.read("smData").unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(channel.view("smData").unwrap(), SegmentView { offset: 4, len: 12 });
    }

    #[test]
    fn test_write_exact() {
        let (ipc, channel) = setup();
        channel.write("smData", &[7; 12]).unwrap();
        let bytes = ipc.segment_bytes(10).unwrap();
        assert_eq!(&bytes[..4], &[0; 4]);
        assert_eq!(&bytes[4..], &[7; 12]);
    }

    #[test]
    fn test_write_clamped() {
        let (ipc, channel) = setup();
        channel.write("smData", &[5; 20]).unwrap();
        assert_eq!(&ipc.segment_bytes(10).unwrap()[4..], &[5; 12]);

        channel.write("smData", &[3; 4]).unwrap();
        let bytes = ipc.segment_bytes(10).unwrap();
        assert_eq!(&bytes[4..8], &[3; 4]);
        assert_eq!(&bytes[8..], &[0; 8]);
    }

    #[test]
    fn test_unknown_and_wrong_kind() {
        let (_ipc, channel) = setup();
        assert!(matches!(channel.read("smMissing"), Err(BridgeError::UnknownChannel(_))));
        assert!(matches!(channel.read("smData_sem"), Err(BridgeError::WrongKind { .. })));
    }
}

use chrono::Utc;

/// A captured camera frame.
///
/// The payload is always a complete JPEG image; every video source in the
/// producer normalizes its input to JPEG before handing a frame over.
/// `seq` increases monotonically per source and gives the capture order.
#[derive(Debug, Clone)]
pub struct Frame {
    jpeg: Vec<u8>,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(jpeg: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            jpeg,
            captured_at_ms,
            seq,
        }
    }

    /// Create a frame stamped with the current wall-clock time.
    pub fn captured_now(jpeg: Vec<u8>, seq: u64) -> Self {
        Self::new(jpeg, Utc::now().timestamp_millis(), seq)
    }

    pub fn jpeg_data(&self) -> &[u8] {
        &self.jpeg
    }

    /// Replace the image payload, keeping capture metadata.
    pub fn with_jpeg(self, jpeg: Vec<u8>) -> Self {
        Self { jpeg, ..self }
    }

    pub fn payload_size(&self) -> usize {
        self.jpeg.len()
    }

    /// Milliseconds elapsed between capture and `now_ms`, clamped at zero.
    pub fn age_ms(&self, now_ms: i64) -> u64 {
        now_ms.saturating_sub(self.captured_at_ms).max(0) as u64
    }
}

/// Hands out monotonically increasing sequence numbers for one source.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    next: u64,
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self, jpeg: Vec<u8>) -> Frame {
        let seq = self.next;
        self.next += 1;
        Frame::captured_now(jpeg, seq)
    }
}

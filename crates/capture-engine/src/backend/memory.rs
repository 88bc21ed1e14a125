//! In-memory encoder backend.
//!
//! Writes a compact record per input instead of compressed media. Used by
//! dry runs and tests, where what matters is which frames and blocks reached
//! the encoder and in what order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cliploom_common::error::{CliploomError, CliploomResult};

use crate::artifact::ContainerFormat;
use crate::frame::{AudioBlock, VideoFrame};
use crate::pipeline::{CaptureEncoder, CaptureSpec, EncoderBackend, EncoderEvent, EncoderEventSender};

/// Magic bytes opening every dump.
pub const DUMP_HEADER: &[u8] = b"CLDUMP1\n";

/// Everything the in-memory encoders of one backend have seen.
#[derive(Debug, Default)]
struct LogInner {
    opened: usize,
    started: usize,
    closed: usize,
    end_of_stream: usize,
    video_dims: Vec<(u32, u32)>,
    audio_blocks: Vec<usize>,
    has_audio_input: Vec<bool>,
}

/// Shared view of what reached the in-memory encoders.
#[derive(Debug, Clone, Default)]
pub struct MemoryEncoderLog {
    inner: Arc<Mutex<LogInner>>,
}

impl MemoryEncoderLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Encoders opened so far.
    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    /// Encoders started so far.
    pub fn started(&self) -> usize {
        self.lock().started
    }

    /// Encoders closed so far.
    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    /// End-of-stream signals received.
    pub fn end_of_stream_count(&self) -> usize {
        self.lock().end_of_stream
    }

    /// Dimensions of every frame pushed, in order.
    pub fn video_dims(&self) -> Vec<(u32, u32)> {
        self.lock().video_dims.clone()
    }

    /// Sample-frame counts of every audio block pushed, in order.
    pub fn audio_blocks(&self) -> Vec<usize> {
        self.lock().audio_blocks.clone()
    }

    /// Whether each opened encoder had an audio input.
    pub fn audio_inputs(&self) -> Vec<bool> {
        self.lock().has_audio_input.clone()
    }
}

/// Backend producing [`ContainerFormat::RawDump`] artifacts.
#[derive(Debug, Clone)]
pub struct MemoryEncoderBackend {
    available: bool,
    flush_delay: Duration,
    log: MemoryEncoderLog,
}

impl MemoryEncoderBackend {
    pub fn new() -> Self {
        Self {
            available: true,
            flush_delay: Duration::ZERO,
            log: MemoryEncoderLog::default(),
        }
    }

    /// A backend that refuses to open, like a host without an encoder.
    pub fn unsupported() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Delay the flush notification after end-of-stream.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Handle onto the shared input log.
    pub fn log(&self) -> MemoryEncoderLog {
        self.log.clone()
    }
}

impl Default for MemoryEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBackend for MemoryEncoderBackend {
    fn open(
        &self,
        spec: &CaptureSpec,
        events: EncoderEventSender,
    ) -> CliploomResult<Arc<dyn CaptureEncoder>> {
        if !self.available {
            return Err(CliploomError::unsupported(
                "capture unsupported: in-memory encoder disabled",
            ));
        }
        {
            let mut log = self.log.lock();
            log.opened += 1;
            log.has_audio_input.push(spec.audio.is_some());
        }
        Ok(Arc::new(MemoryEncoder {
            state: Mutex::new(EncoderState::Ready),
            events,
            flush_delay: self.flush_delay,
            log: self.log.clone(),
        }))
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn container(&self) -> ContainerFormat {
        ContainerFormat::RawDump
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Ready,
    Running,
    Draining,
    Closed,
}

struct MemoryEncoder {
    state: Mutex<EncoderState>,
    events: EncoderEventSender,
    flush_delay: Duration,
    log: MemoryEncoderLog,
}

impl MemoryEncoder {
    fn state(&self) -> MutexGuard<'_, EncoderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_running(&self) -> CliploomResult<()> {
        match *self.state() {
            EncoderState::Running => Ok(()),
            other => Err(CliploomError::capture(format!(
                "In-memory encoder is not accepting input ({other:?})"
            ))),
        }
    }

    fn emit(&self, chunk: Vec<u8>) {
        // The session may already have dropped its receiver on abort.
        let _ = self.events.send(EncoderEvent::Chunk(chunk));
    }
}

impl CaptureEncoder for MemoryEncoder {
    fn start(&self) -> CliploomResult<()> {
        let mut state = self.state();
        if *state != EncoderState::Ready {
            return Err(CliploomError::capture("In-memory encoder already started"));
        }
        *state = EncoderState::Running;
        drop(state);

        self.log.lock().started += 1;
        self.emit(DUMP_HEADER.to_vec());
        Ok(())
    }

    fn push_video(&self, frame: &VideoFrame) -> CliploomResult<()> {
        self.ensure_running()?;
        self.log.lock().video_dims.push((frame.width, frame.height));

        let mut record = Vec::with_capacity(13);
        record.push(b'V');
        record.extend_from_slice(&frame.width.to_le_bytes());
        record.extend_from_slice(&frame.height.to_le_bytes());
        record.extend_from_slice(&frame.pixel(0, 0).unwrap_or_default());
        self.emit(record);
        Ok(())
    }

    fn push_audio(&self, block: &AudioBlock) -> CliploomResult<()> {
        self.ensure_running()?;
        self.log.lock().audio_blocks.push(block.frames());

        let mut record = Vec::with_capacity(6);
        record.push(b'A');
        record.extend_from_slice(&(block.frames() as u32).to_le_bytes());
        record.push(block.format.channels as u8);
        self.emit(record);
        Ok(())
    }

    fn end_of_stream(&self) -> CliploomResult<()> {
        {
            let mut state = self.state();
            if *state != EncoderState::Running {
                return Err(CliploomError::capture("In-memory encoder is not running"));
            }
            *state = EncoderState::Draining;
        }
        self.log.lock().end_of_stream += 1;

        if self.flush_delay.is_zero() {
            let _ = self.events.send(EncoderEvent::Flushed);
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            CliploomError::capture(format!("Delayed flush requires a tokio runtime: {e}"))
        })?;
        let events = self.events.clone();
        let delay = self.flush_delay;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(EncoderEvent::Flushed);
        });
        Ok(())
    }

    fn close(&self) -> CliploomResult<()> {
        let mut state = self.state();
        if *state != EncoderState::Closed {
            *state = EncoderState::Closed;
            self.log.lock().closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AudioFormat;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<EncoderEvent>) -> Vec<EncoderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_records_are_emitted_in_order() {
        let backend = MemoryEncoderBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let encoder = backend
            .open(
                &CaptureSpec {
                    fps: 30,
                    audio: Some(AudioFormat::default()),
                },
                tx,
            )
            .unwrap();

        encoder.start().unwrap();
        encoder
            .push_video(&VideoFrame::solid(2, 2, [9, 8, 7, 6]))
            .unwrap();
        encoder
            .push_audio(&AudioBlock {
                format: AudioFormat::default(),
                samples: vec![0.0; 20],
            })
            .unwrap();
        encoder.end_of_stream().unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], EncoderEvent::Chunk(DUMP_HEADER.to_vec()));
        assert_eq!(
            events[1],
            EncoderEvent::Chunk(vec![b'V', 2, 0, 0, 0, 2, 0, 0, 0, 9, 8, 7, 6])
        );
        assert_eq!(events[2], EncoderEvent::Chunk(vec![b'A', 10, 0, 0, 0, 2]));
        assert_eq!(events[3], EncoderEvent::Flushed);
        assert_eq!(backend.log().video_dims(), vec![(2, 2)]);
        assert_eq!(backend.log().audio_blocks(), vec![10]);
    }

    #[test]
    fn test_input_rejected_before_start_and_after_eos() {
        let backend = MemoryEncoderBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let encoder = backend.open(&CaptureSpec { fps: 30, audio: None }, tx).unwrap();
        assert!(encoder.push_video(&VideoFrame::blank(1, 1)).is_err());
        encoder.start().unwrap();
        encoder.end_of_stream().unwrap();
        assert!(encoder.push_video(&VideoFrame::blank(1, 1)).is_err());
        encoder.close().unwrap();
        encoder.close().unwrap();
        assert_eq!(backend.log().closed(), 1);
    }

    #[test]
    fn test_unsupported_backend_refuses_to_open() {
        let backend = MemoryEncoderBackend::unsupported();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!backend.is_available());
        let err = backend
            .open(&CaptureSpec { fps: 30, audio: None }, tx)
            .err()
            .unwrap();
        assert!(matches!(err, CliploomError::Unsupported { .. }));
        assert_eq!(backend.log().opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_flush() {
        let backend = MemoryEncoderBackend::new().with_flush_delay(Duration::from_millis(250));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let encoder = backend.open(&CaptureSpec { fps: 30, audio: None }, tx).unwrap();
        encoder.start().unwrap();
        encoder.end_of_stream().unwrap();

        assert_eq!(drain(&mut rx), vec![EncoderEvent::Chunk(DUMP_HEADER.to_vec())]);
        let started = tokio::time::Instant::now();
        assert_eq!(rx.recv().await, Some(EncoderEvent::Flushed));
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}

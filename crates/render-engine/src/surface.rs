//! The shared output surface every segment paints onto.

use cliploom_capture_engine::frame::VideoFrame;
use cliploom_capture_engine::pipeline::CaptureHandle;
use cliploom_common::clock::{RateController, RenderClock};
use cliploom_common::error::CliploomResult;

/// A single RGBA surface whose contents form the visual stream.
///
/// Its size follows the natural dimensions of whichever asset is playing,
/// so the captured stream changes resolution between segments. While a
/// capture is attached, painted frames are forwarded to it at the capture
/// frame rate.
pub struct OutputSurface {
    frame: VideoFrame,
    capture: Option<CaptureHandle>,
    gate: RateController,
    clock: RenderClock,
    painted: u64,
}

impl OutputSurface {
    /// Create a blank surface forwarding at most `capture_fps` frames per
    /// second.
    pub fn new(width: u32, height: u32, capture_fps: u32) -> Self {
        Self {
            frame: VideoFrame::blank(width, height),
            capture: None,
            gate: RateController::new(capture_fps),
            clock: RenderClock::start(),
            painted: 0,
        }
    }

    /// Current size.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    /// Resize the surface, clearing its contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.dimensions() != (width, height) {
            tracing::debug!(width, height, "Output surface resized");
        }
        self.frame = VideoFrame::blank(width, height);
    }

    /// Draw a frame scaled to fill the surface and forward it to the
    /// attached capture when the capture rate allows.
    pub fn paint(&mut self, frame: &VideoFrame) -> CliploomResult<()> {
        let (width, height) = self.dimensions();
        self.frame = frame.scaled_to(width, height);
        self.painted += 1;

        if let Some(capture) = &self.capture {
            if self.gate.should_tick(self.clock.elapsed_ns()) {
                capture.push_video(&self.frame)?;
            }
        }
        Ok(())
    }

    /// Current contents.
    pub fn snapshot(&self) -> VideoFrame {
        self.frame.clone()
    }

    /// Frames painted since the surface was created.
    pub fn painted(&self) -> u64 {
        self.painted
    }

    /// Start forwarding painted frames to a capture.
    pub fn attach_capture(&mut self, capture: CaptureHandle) {
        self.gate.reset();
        self.capture = Some(capture);
    }

    /// Stop forwarding painted frames.
    pub fn detach_capture(&mut self) -> Option<CaptureHandle> {
        self.capture.take()
    }

    /// Whether a capture is attached.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cliploom_capture_engine::backend::memory::MemoryEncoderBackend;
    use cliploom_capture_engine::pipeline::CaptureSpec;
    use cliploom_capture_engine::session::CaptureSession;

    use super::*;

    #[test]
    fn test_resize_clears_and_paint_scales() {
        let mut surface = OutputSurface::new(4, 4, 30);
        surface.paint(&VideoFrame::solid(2, 2, [1, 2, 3, 255])).unwrap();
        assert_eq!(surface.snapshot().pixel(3, 3), Some([1, 2, 3, 255]));

        surface.resize(8, 2);
        assert_eq!(surface.dimensions(), (8, 2));
        assert_eq!(surface.snapshot().pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarding_is_gated_by_capture_rate() {
        let backend = MemoryEncoderBackend::new();
        let mut session = CaptureSession::new(CaptureSpec { fps: 10, audio: None });
        let handle = session.start(&backend).unwrap();

        let mut surface = OutputSurface::new(2, 2, 10);
        surface.attach_capture(handle);
        let frame = VideoFrame::blank(2, 2);
        // 60 paints over one second at a 10 fps capture rate.
        for _ in 0..60 {
            surface.paint(&frame).unwrap();
            tokio::time::advance(Duration::from_nanos(16_666_667)).await;
        }
        let forwarded = backend.log().video_dims().len();
        assert!((9..=11).contains(&forwarded), "forwarded {forwarded}");
        assert_eq!(surface.painted(), 60);

        assert!(surface.detach_capture().is_some());
        surface.paint(&frame).unwrap();
        assert_eq!(backend.log().video_dims().len(), forwarded);
        session.abort();
    }
}

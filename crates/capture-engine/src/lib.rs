//! Cliploom Capture Engine
//!
//! Turns the composite visual stream painted by the render engine and the
//! routed audio track into one encoded clip. A capture session opens an
//! encoder through a backend, hands out a cloneable input handle, and on
//! stop waits for the encoder to flush before concatenating its chunks into
//! an artifact.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CaptureSession                 │
//! │  ┌──────────────┐        ┌──────────────────┐ │
//! │  │ OutputSurface│        │   AudioTrack     │ │
//! │  │  (frames)    │        │  (PCM blocks)    │ │
//! │  └──────┬───────┘        └────────┬─────────┘ │
//! │         │     CaptureHandle       │           │
//! │         ▼                         ▼           │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ EncoderBackend: GStreamer WebM / memory │  │
//! │  └────────────────────┬────────────────────┘  │
//! │                       ▼ chunks                │
//! │                   Artifact                    │
//! └──────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod backend;
pub mod frame;
pub mod pipeline;
pub mod session;

pub use artifact::*;
pub use frame::*;
pub use pipeline::*;
pub use session::*;

//! Cliploom Render Engine
//!
//! Plays an ordered list of video clips, each stretched or compressed to
//! its target duration, onto a single output surface while a trimmed audio
//! track plays underneath, and captures both into one clip.
//!
//! # Pipeline Architecture
//!
//! ```text
//! timestamps ──► durations ──┐
//!                            ├── Timeline ──► Compositor ──► OutputSurface ──┐
//! videos ──► Order ──────────┘   (segment i at natural/target speed)         │
//!                                                                            ├──► CaptureSession
//! audio ──► AudioTrack (seek to start, play, wait for end marker) ───────────┘        │
//!                                                                                     ▼
//!                                                                                  Artifact
//! ```

pub mod audio;
pub mod compositor;
pub mod preview;
pub mod render;
pub mod source;
pub mod studio;
pub mod surface;

pub use audio::{AudioFinish, AudioTrack};
pub use compositor::{load_segment, Compositor, CompositorState, SegmentPlayer, SegmentReport};
pub use preview::PreviewFrame;
pub use render::*;
pub use source::{get_loader, AudioOutput, MediaLoader};
pub use studio::Studio;
pub use surface::OutputSurface;

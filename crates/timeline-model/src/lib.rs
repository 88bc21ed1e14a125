//! Cliploom Timeline Model
//!
//! Defines the core data contracts for a Cliploom render:
//! - **Assets:** Loaded video and audio sources with their natural geometry
//! - **Timestamps:** Free-text cut points and the segment durations derived from them
//! - **Order:** The permutation deciding which clip plays in which slot
//! - **Timeline:** The render-time pairing of order slots with durations
//! - **Audio window:** The trimmed region of the audio track to keep
//!
//! All times are expressed in seconds as `f64`.

pub mod asset;
pub mod audio_window;
pub mod order;
pub mod timeline;
pub mod timestamps;

pub use asset::*;
pub use audio_window::*;
pub use order::*;
pub use timeline::*;
pub use timestamps::*;

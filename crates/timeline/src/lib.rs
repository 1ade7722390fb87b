//! Loopforge Timeline Model
//!
//! Defines the data contracts the export engine reads:
//! - **Clips and transitions:** trimmed video segments joined by overlapping transitions
//! - **Overlays:** text, blur, sticker, and shape layers positioned in percentages
//! - **Settings:** output raster size, frame rate, platform preset
//! - **Sequencer:** pure frame arithmetic over clips and transitions
//!
//! Overlay geometry is stored as percentages of the output frame so a
//! composition survives a change of platform preset. Pixel coordinates are
//! derived only at export time.

pub mod clip;
pub mod overlay;
pub mod rect;
pub mod sequencer;
pub mod settings;
pub mod timeline;

pub use clip::*;
pub use overlay::*;
pub use rect::*;
pub use sequencer::*;
pub use settings::*;
pub use timeline::*;

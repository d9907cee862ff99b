//! Video delivery and rendering subsystem

pub mod pipeline;
pub mod raster;

pub use pipeline::{LiveFrameSource, VideoPipeline};
pub use raster::{RasterTarget, RenderedFrame};

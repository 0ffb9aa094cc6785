//! Onboard Processing Library
//!
//! Pure, I/O-free transformations applied to uploaded images before they are stored:
//!
//! - [`branding`]: recomposes a scan onto a fixed ID-card canvas with a provenance caption
//! - [`compression`]: downscales oversized images before branding
//!
//! Both stages degrade instead of failing: bytes they cannot handle are passed through unchanged.

pub mod branding;
pub mod compression;
mod glyphs;

pub use branding::{BrandingCodec, BrandingResult, CANVAS_HEIGHT, CANVAS_WIDTH};
pub use compression::ImageCompressor;

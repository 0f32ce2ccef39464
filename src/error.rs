//! Errors reported at the draw-submission boundary.
//!
//! Invalid geometry and malformed assets fail fast here; off-screen or
//! zero-alpha draws are not errors, they are no-ops.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum DrawError {
    /// A coordinate, size, angle, opacity, or z value was NaN or infinite.
    NonFinite { what: &'static str },
    /// A color component was NaN.
    BadColor { what: &'static str },
    /// Transform direction components must be exactly +1 or -1.
    BadDirection { x: f32, y: f32 },
    /// Sheet id not present in the asset store.
    UnknownSheet(usize),
    /// Font id not present in the asset store.
    UnknownFont(usize),
    /// Map id not present in the asset store.
    UnknownMap(usize),
    /// Sprite frame index out of range for its sheet.
    UnknownFrame { sheet: usize, frame: usize },
    /// Framebuffer or background sheet dimensions disagree with the screen.
    SizeMismatch { expected: (u32, u32), got: (u32, u32) },
    /// A pop token that does not correspond to a live push.
    StaleToken { token: usize, depth: usize },
    /// Pixel or mask data length does not match the declared dimensions.
    BadDataLength { expected: usize, got: usize },
    /// A sprite frame or glyph rectangle extends outside its sheet.
    FrameOutOfBounds { sheet: String, frame: usize },
    /// Malformed JSON asset manifest.
    Manifest(String),
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawError::NonFinite { what } => write!(f, "{} must be finite", what),
            DrawError::BadColor { what } => write!(f, "color component {} is NaN", what),
            DrawError::BadDirection { x, y } => {
                write!(f, "direction must be (+/-1, +/-1), got ({}, {})", x, y)
            }
            DrawError::UnknownSheet(id) => write!(f, "unknown sprite sheet id {}", id),
            DrawError::UnknownFont(id) => write!(f, "unknown font id {}", id),
            DrawError::UnknownMap(id) => write!(f, "unknown map id {}", id),
            DrawError::UnknownFrame { sheet, frame } => {
                write!(f, "sheet {} has no frame {}", sheet, frame)
            }
            DrawError::SizeMismatch { expected, got } => write!(
                f,
                "expected {}x{} pixels, got {}x{}",
                expected.0, expected.1, got.0, got.1
            ),
            DrawError::StaleToken { token, depth } => {
                write!(f, "stale state token {} (stack depth {})", token, depth)
            }
            DrawError::BadDataLength { expected, got } => {
                write!(f, "expected {} data elements, got {}", expected, got)
            }
            DrawError::FrameOutOfBounds { sheet, frame } => {
                write!(f, "frame {} extends outside sheet \"{}\"", frame, sheet)
            }
            DrawError::Manifest(msg) => write!(f, "bad asset manifest: {}", msg),
        }
    }
}

impl std::error::Error for DrawError {}

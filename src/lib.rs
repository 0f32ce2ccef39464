//! glowbox: a fantasy-console rendering core.
//!
//! Game code issues immediate-mode draw calls (points, lines, shapes,
//! sprites, tile maps, text) against a `RenderContext`; every call is
//! transformed, color-quantized, culled, and deferred into a command
//! buffer. `RenderContext::present` z-sorts the buffer once per frame
//! (painter's algorithm, submission order breaking ties) and rasterizes
//! into a fixed-size packed-pixel `Framebuffer`, deterministically and with
//! retro 16-level-per-channel color.
//!
//! The optional `display` feature adds an SDL2 presentation layer used by
//! the demo binary; the core itself is headless.

pub mod assets;
pub mod color;
pub mod command;
pub mod context;
#[cfg(feature = "display")]
pub mod display;
pub mod error;
pub mod raster;
pub mod transform;
pub mod util;

pub use assets::{
    AssetStore, Font, FontId, FontManifest, Glyph, MapId, SheetId, SheetManifest, Sprite,
    SpriteSheet, TileMap,
};
pub use color::Color;
pub use context::{
    CornerRectArgs, DiskArgs, LineArgs, MapArgs, PolyArgs, RectArgs, RenderContext, SpriteArgs,
    StateToken, TextArgs, XAlign, YAlign,
};
pub use error::DrawError;
pub use raster::{Framebuffer, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use transform::{Clip, ClipArgs, Transform, TransformArgs};

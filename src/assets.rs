//! Immutable sprite-sheet, font, and tile-map assets.
//!
//! Assets are registered once in an `AssetStore` and addressed by typed ids
//! afterwards; draw commands carry ids, never references, so records stay
//! `'static` and the store stays borrowable during dispatch. Frame tables
//! and glyph metrics can round-trip through JSON manifests; pixel and mask
//! data always arrives as raw packed buffers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DrawError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(pub usize);

/// A drawable handle: one frame of one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sprite {
    pub sheet: SheetId,
    pub frame: usize,
}

impl Sprite {
    pub fn new(sheet: SheetId, frame: usize) -> Self {
        Self { sheet, frame }
    }
}

// ============================================================================
// Sprite sheets
// ============================================================================

/// One source rectangle within a sheet. The intrinsic scale is mirroring
/// only (+/-1 per axis), applied on top of whatever the draw call asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteFrame {
    pub corner_x: u32,
    pub corner_y: u32,
    pub size_x: u32,
    pub size_y: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// True when any texel in the frame is less than fully opaque.
    pub has_alpha: bool,
}

/// A packed-pixel sprite sheet with a frame table.
///
/// A horizontally mirrored copy of the texels is precomputed so that the
/// x-flipped fast blit path can row-copy straight out of it.
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    name: String,
    width: u32,
    height: u32,
    data: Vec<u32>,
    data_flipped: Vec<u32>,
    frames: Vec<SpriteFrame>,
}

/// Frame description as it appears in a sheet manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameManifest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
}

/// JSON-serializable sheet description (everything except the texels).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetManifest {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frames: Vec<FrameManifest>,
}

impl SheetManifest {
    pub fn from_json(json: &str) -> Result<Self, DrawError> {
        serde_json::from_str(json).map_err(|e| DrawError::Manifest(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DrawError> {
        serde_json::to_string_pretty(self).map_err(|e| DrawError::Manifest(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DrawError> {
        let json = fs::read_to_string(path).map_err(|e| DrawError::Manifest(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DrawError> {
        fs::write(path, self.to_json()?).map_err(|e| DrawError::Manifest(e.to_string()))
    }
}

impl SpriteSheet {
    /// Build a sheet from packed texels and a frame table.
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        data: Vec<u32>,
        frames: Vec<FrameManifest>,
    ) -> Result<Self, DrawError> {
        let name = name.into();
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(DrawError::BadDataLength { expected, got: data.len() });
        }

        let mut table = Vec::with_capacity(frames.len());
        for (i, f) in frames.iter().enumerate() {
            if f.width == 0
                || f.height == 0
                || f.x + f.width > width
                || f.y + f.height > height
            {
                return Err(DrawError::FrameOutOfBounds { sheet: name, frame: i });
            }
            let mut has_alpha = false;
            'scan: for ty in f.y..f.y + f.height {
                for tx in f.x..f.x + f.width {
                    if data[(ty * width + tx) as usize] >> 28 != 0xF {
                        has_alpha = true;
                        break 'scan;
                    }
                }
            }
            table.push(SpriteFrame {
                corner_x: f.x,
                corner_y: f.y,
                size_x: f.width,
                size_y: f.height,
                scale_x: if f.flip_x { -1.0 } else { 1.0 },
                scale_y: if f.flip_y { -1.0 } else { 1.0 },
                has_alpha,
            });
        }

        // Mirror every row once, up front.
        let mut data_flipped = vec![0u32; data.len()];
        for y in 0..height as usize {
            let row = &data[y * width as usize..(y + 1) * width as usize];
            let out = &mut data_flipped[y * width as usize..(y + 1) * width as usize];
            for (x, texel) in row.iter().enumerate() {
                out[width as usize - 1 - x] = *texel;
            }
        }

        Ok(Self { name, width, height, data, data_flipped, frames: table })
    }

    pub fn from_manifest(manifest: &SheetManifest, data: Vec<u32>) -> Result<Self, DrawError> {
        Self::new(
            manifest.name.clone(),
            manifest.width,
            manifest.height,
            data,
            manifest.frames.clone(),
        )
    }

    /// A single-frame sheet covering all of `data`; handy for backgrounds.
    pub fn single(
        name: impl Into<String>,
        width: u32,
        height: u32,
        data: Vec<u32>,
    ) -> Result<Self, DrawError> {
        let frame = FrameManifest {
            x: 0,
            y: 0,
            width,
            height,
            flip_x: false,
            flip_y: false,
        };
        Self::new(name, width, height, data, vec![frame])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame(&self, index: usize) -> Option<&SpriteFrame> {
        self.frames.get(index)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub(crate) fn data(&self) -> &[u32] {
        &self.data
    }

    #[inline]
    pub(crate) fn data_flipped(&self) -> &[u32] {
        &self.data_flipped
    }

    /// Read one texel (bounds checked). Returns None if out of bounds.
    pub fn texel(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.data[(y * self.width + x) as usize])
        } else {
            None
        }
    }
}

// ============================================================================
// Fonts
// ============================================================================

/// Per-glyph sheet bounds and advance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glyph {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    #[serde(default)]
    pub pre: i32,
    #[serde(default)]
    pub post: i32,
    #[serde(default)]
    pub y_offset: i32,
}

impl Glyph {
    #[inline]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1 + 1
    }
}

/// JSON-serializable font metrics (everything except the mask sheet).
/// Glyphs are keyed by single-character strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontManifest {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub char_height: i32,
    pub baseline: i32,
    #[serde(default)]
    pub spacing_x: i32,
    #[serde(default)]
    pub spacing_y: i32,
    #[serde(default)]
    pub border: i32,
    pub glyphs: HashMap<String, Glyph>,
}

impl FontManifest {
    pub fn from_json(json: &str) -> Result<Self, DrawError> {
        serde_json::from_str(json).map_err(|e| DrawError::Manifest(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DrawError> {
        serde_json::to_string_pretty(self).map_err(|e| DrawError::Manifest(e.to_string()))
    }
}

/// A bitmap font whose sheet holds a 4-bit mask per pixel rather than a
/// color: bit 0 fill, bit 1 outline, bit 2 shadow, bit 3 shadow+outline.
#[derive(Debug, Clone)]
pub struct Font {
    name: String,
    width: u32,
    height: u32,
    data: Vec<u8>,
    pub char_height: i32,
    pub baseline: i32,
    pub spacing_x: i32,
    pub spacing_y: i32,
    pub border: i32,
    glyphs: HashMap<char, Glyph>,
}

impl Font {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        data: Vec<u8>,
        char_height: i32,
        baseline: i32,
        glyphs: HashMap<char, Glyph>,
    ) -> Result<Self, DrawError> {
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(DrawError::BadDataLength { expected, got: data.len() });
        }
        if char_height <= 0 {
            return Err(DrawError::Manifest("char_height must be positive".into()));
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            data,
            char_height,
            baseline,
            spacing_x: 1,
            spacing_y: 0,
            border: 0,
            glyphs,
        })
    }

    pub fn from_manifest(manifest: &FontManifest, data: Vec<u8>) -> Result<Self, DrawError> {
        let mut glyphs = HashMap::with_capacity(manifest.glyphs.len());
        for (key, glyph) in &manifest.glyphs {
            let mut chars = key.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(DrawError::Manifest(format!(
                    "glyph key {:?} is not a single character",
                    key
                )));
            };
            glyphs.insert(c, *glyph);
        }
        let mut font = Self::new(
            manifest.name.clone(),
            manifest.width,
            manifest.height,
            data,
            manifest.char_height,
            manifest.baseline,
            glyphs,
        )?;
        font.spacing_x = manifest.spacing_x;
        font.spacing_y = manifest.spacing_y;
        font.border = manifest.border;
        Ok(font)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn glyph(&self, c: char) -> Option<&Glyph> {
        self.glyphs.get(&c)
    }

    /// Mask nibble at a sheet position; 0 outside the sheet.
    #[inline]
    pub fn mask(&self, x: i32, y: i32) -> u8 {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            self.data[(y as u32 * self.width + x as u32) as usize]
        } else {
            0
        }
    }

    /// Horizontal advance contributed by one glyph.
    #[inline]
    pub(crate) fn advance(&self, g: &Glyph) -> i32 {
        g.pre + g.width() + self.spacing_x - 2 * self.border + g.post
    }

    /// Width in pixels of a rendered string; unmapped chars fall back to
    /// the space glyph, or contribute nothing if the font has no space.
    pub fn text_width(&self, text: &str) -> i32 {
        let mut w = 0;
        for c in text.chars() {
            if let Some(g) = self.glyph(c).or_else(|| self.glyph(' ')) {
                w += self.advance(g);
            }
        }
        w
    }
}

// ============================================================================
// Tile maps
// ============================================================================

/// A grid of optional sprite-frame indices per layer. Wrapped axes repeat
/// the map across the world.
#[derive(Debug, Clone)]
pub struct TileMap {
    pub sheet: SheetId,
    pub size_x: u32,
    pub size_y: u32,
    pub tile_w: u32,
    pub tile_h: u32,
    pub wrap_x: bool,
    pub wrap_y: bool,
    /// z spacing between successive layers.
    pub layer_z: f32,
    layers: Vec<Vec<Option<u32>>>,
}

impl TileMap {
    pub fn new(
        sheet: SheetId,
        size_x: u32,
        size_y: u32,
        tile_w: u32,
        tile_h: u32,
        layer_count: usize,
    ) -> Self {
        Self {
            sheet,
            size_x,
            size_y,
            tile_w,
            tile_h,
            wrap_x: false,
            wrap_y: false,
            layer_z: 1.0,
            layers: vec![vec![None; (size_x * size_y) as usize]; layer_count],
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Tile lookup with world wrapping applied per axis. Out-of-range
    /// indices on an unwrapped axis are empty.
    pub fn tile(&self, layer: usize, tx: i32, ty: i32) -> Option<u32> {
        let layer = self.layers.get(layer)?;
        let tx = if self.wrap_x {
            tx.rem_euclid(self.size_x as i32)
        } else if tx < 0 || tx >= self.size_x as i32 {
            return None;
        } else {
            tx
        };
        let ty = if self.wrap_y {
            ty.rem_euclid(self.size_y as i32)
        } else if ty < 0 || ty >= self.size_y as i32 {
            return None;
        } else {
            ty
        };
        layer[(ty as u32 * self.size_x + tx as u32) as usize]
    }

    /// Set a tile (in-range indices only; wrapping applies at draw time).
    pub fn set_tile(&mut self, layer: usize, tx: u32, ty: u32, frame: Option<u32>) {
        if let Some(l) = self.layers.get_mut(layer) {
            if tx < self.size_x && ty < self.size_y {
                l[(ty * self.size_x + tx) as usize] = frame;
            }
        }
    }
}

// ============================================================================
// Asset store
// ============================================================================

/// Arena of registered assets. Ids are indices; registration order is
/// stable for the lifetime of the store.
#[derive(Debug, Default)]
pub struct AssetStore {
    sheets: Vec<SpriteSheet>,
    fonts: Vec<Font>,
    maps: Vec<TileMap>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: SpriteSheet) -> SheetId {
        self.sheets.push(sheet);
        SheetId(self.sheets.len() - 1)
    }

    pub fn add_font(&mut self, font: Font) -> FontId {
        self.fonts.push(font);
        FontId(self.fonts.len() - 1)
    }

    /// Register a map, validating that its sheet exists and every tile
    /// index refers to a real frame.
    pub fn add_map(&mut self, map: TileMap) -> Result<MapId, DrawError> {
        let sheet = self
            .sheets
            .get(map.sheet.0)
            .ok_or(DrawError::UnknownSheet(map.sheet.0))?;
        for layer in &map.layers {
            for frame in layer.iter().flatten() {
                if *frame as usize >= sheet.frame_count() {
                    return Err(DrawError::UnknownFrame {
                        sheet: map.sheet.0,
                        frame: *frame as usize,
                    });
                }
            }
        }
        self.maps.push(map);
        Ok(MapId(self.maps.len() - 1))
    }

    pub fn sheet(&self, id: SheetId) -> Option<&SpriteSheet> {
        self.sheets.get(id.0)
    }

    pub fn font(&self, id: FontId) -> Option<&Font> {
        self.fonts.get(id.0)
    }

    pub fn map(&self, id: MapId) -> Option<&TileMap> {
        self.maps.get(id.0)
    }
}

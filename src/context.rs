//! The render context: transform/clip state, the submission API, and the
//! end-of-frame scheduler.
//!
//! Game code calls the `draw_*` operations in any order during a frame;
//! each one transforms its geometry to screen space, quantizes its colors,
//! culls against the clip snapshot, and appends an immutable record to the
//! command buffer. Nothing touches pixels until `present`, which z-sorts
//! the buffer and dispatches every record to its rasterizer.

use crate::assets::{AssetStore, FontId, MapId, SheetId, Sprite};
use crate::color::{alpha4, force_opaque, pack_opt, Color};
use crate::command::{CommandBuffer, CommandOp, PixPoint, SpriteBlit};
use crate::error::DrawError;
use crate::raster::{self, Framebuffer, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::transform::{snap_hi, snap_lo, Clip, ClipArgs, Transform, TransformArgs};
use crate::transform::{CLIP_Z1_DEFAULT, CLIP_Z2_DEFAULT};

/// Opaque handle returned by `push`; `pop` consumes it to restore the
/// matching snapshot.
#[derive(Debug, Clone, Copy)]
#[must_use = "pass this token back to pop() to restore the saved state"]
pub struct StateToken(usize);

#[derive(Debug, Clone, Copy)]
enum Background {
    Color(u32),
    Sheet(SheetId),
}

/// Horizontal text alignment relative to the anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical text alignment relative to the anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YAlign {
    #[default]
    Top,
    Center,
    Baseline,
    Bottom,
}

#[derive(Debug, Clone, Copy)]
pub struct LineArgs {
    pub z: f32,
    /// Exclude the pixel at the first endpoint (for chained segments).
    pub open_a: bool,
    /// Exclude the pixel at the second endpoint.
    pub open_b: bool,
}

impl Default for LineArgs {
    fn default() -> Self {
        Self { z: 0.0, open_a: false, open_b: false }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskArgs {
    pub fill: Option<Color>,
    pub outline: Option<Color>,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CornerRectArgs {
    pub fill: Option<Color>,
    pub outline: Option<Color>,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RectArgs {
    pub fill: Option<Color>,
    pub outline: Option<Color>,
    pub angle: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct PolyArgs {
    pub fill: Option<Color>,
    pub outline: Option<Color>,
    /// Local pose applied to the vertex list before the context transform.
    pub pos: (f32, f32),
    pub angle: f32,
    pub scale: (f32, f32),
    pub z: f32,
}

impl Default for PolyArgs {
    fn default() -> Self {
        Self {
            fill: None,
            outline: None,
            pos: (0.0, 0.0),
            angle: 0.0,
            scale: (1.0, 1.0),
            z: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpriteArgs {
    pub pos: (f32, f32),
    pub angle: f32,
    pub scale: (f32, f32),
    /// Global opacity multiplier in [0, 1], quantized to 16 levels.
    pub opacity: f32,
    /// Replaces the sampled RGB while keeping the alpha shape.
    pub override_color: Option<Color>,
    /// Multiply the sampled color by the override instead.
    pub multiply: bool,
    pub z: f32,
}

impl Default for SpriteArgs {
    fn default() -> Self {
        Self {
            pos: (0.0, 0.0),
            angle: 0.0,
            scale: (1.0, 1.0),
            opacity: 1.0,
            override_color: None,
            multiply: false,
            z: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapArgs {
    /// World position of the map's top-left corner.
    pub pos: (f32, f32),
    pub min_layer: usize,
    /// Inclusive; defaults to the last layer.
    pub max_layer: Option<usize>,
    pub z: f32,
}

impl Default for MapArgs {
    fn default() -> Self {
        Self { pos: (0.0, 0.0), min_layer: 0, max_layer: None, z: 0.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextArgs {
    pub pos: (f32, f32),
    pub color: Option<Color>,
    pub outline: Option<Color>,
    pub shadow: Option<Color>,
    pub x_align: XAlign,
    pub y_align: YAlign,
    pub z: f32,
}

impl Default for TextArgs {
    fn default() -> Self {
        Self {
            pos: (0.0, 0.0),
            color: Some(Color::gray(1.0)),
            outline: None,
            shadow: None,
            x_align: XAlign::Left,
            y_align: YAlign::Top,
            z: 0.0,
        }
    }
}

/// All per-frame rendering state for one virtual screen.
pub struct RenderContext {
    width: u32,
    height: u32,
    transform: Transform,
    clip: Clip,
    stack: Vec<(Transform, Clip)>,
    buffer: CommandBuffer,
    background: Background,
    frame: u64,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            transform: Transform::default(),
            clip: Clip::full_screen(width, height),
            stack: Vec::new(),
            buffer: CommandBuffer::new(),
            background: Background::Color(0xFF00_0000),
            frame: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    /// Number of records queued so far this frame.
    pub fn command_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    // ========================================================================
    // Transform and clip state
    // ========================================================================

    /// Replace transform fields outright; unset fields keep their current
    /// values.
    pub fn set_transform(&mut self, args: TransformArgs) -> Result<(), DrawError> {
        if let Some((x, y)) = args.pos {
            finite(x, "transform pos.x")?;
            finite(y, "transform pos.y")?;
            self.transform.offset_x = x;
            self.transform.offset_y = y;
        }
        if let Some((dx, dy)) = args.dir {
            check_dir(dx, dy)?;
            self.transform.scale_x = dx;
            self.transform.scale_y = dy;
        }
        if let Some(z) = args.z {
            finite(z, "transform z")?;
            self.transform.offset_z = z;
        }
        if let Some(zd) = args.z_dir {
            finite(zd, "transform z_dir")?;
            self.transform.scale_z = zd;
        }
        if let Some((sx, sy)) = args.skew {
            finite(sx, "transform skew.x")?;
            finite(sy, "transform skew.y")?;
            self.transform.skew_xz = sx;
            self.transform.skew_yz = sy;
        }
        Ok(())
    }

    /// Fold a new local transform into the current one; the new transform
    /// applies first, then the existing mapping.
    pub fn compose_transform(&mut self, args: TransformArgs) -> Result<(), DrawError> {
        let (px, py) = args.pos.unwrap_or((0.0, 0.0));
        let (dx, dy) = args.dir.unwrap_or((1.0, 1.0));
        let pz = args.z.unwrap_or(0.0);
        let dz = args.z_dir.unwrap_or(1.0);
        let (kx, ky) = args.skew.unwrap_or((0.0, 0.0));
        finite(px, "transform pos.x")?;
        finite(py, "transform pos.y")?;
        finite(pz, "transform z")?;
        finite(dz, "transform z_dir")?;
        finite(kx, "transform skew.x")?;
        finite(ky, "transform skew.y")?;
        check_dir(dx, dy)?;

        let t = &mut self.transform;
        t.offset_x += t.scale_x * (px + pz * t.skew_xz);
        t.offset_y += t.scale_y * (py + pz * t.skew_yz);
        t.offset_z += t.scale_z * pz;
        t.skew_xz = kx + dz * t.skew_xz * dx;
        t.skew_yz = ky + dz * t.skew_yz * dy;
        t.scale_x *= dx;
        t.scale_y *= dy;
        t.scale_z *= dz;
        Ok(())
    }

    pub fn reset_transform(&mut self) {
        self.transform = Transform::default();
    }

    /// Replace the clip region; unset fields resolve from the previous clip.
    pub fn set_clip(&mut self, args: ClipArgs) -> Result<(), DrawError> {
        self.apply_clip(args, false)
    }

    /// Narrow the clip region; the result never widens.
    pub fn intersect_clip(&mut self, args: ClipArgs) -> Result<(), DrawError> {
        self.apply_clip(args, true)
    }

    pub fn reset_clip(&mut self) {
        self.clip = Clip::full_screen(self.width, self.height);
    }

    fn apply_clip(&mut self, args: ClipArgs, intersect: bool) -> Result<(), DrawError> {
        let prev = self.clip;
        let mut x1 = prev.x1;
        let mut y1 = prev.y1;
        let mut x2 = prev.x2;
        let mut y2 = prev.y2;
        let mut z1 = prev.z1;
        let mut z2 = prev.z2;

        // Raw corner position before snapping; needed again for size.
        let (raw_x1, raw_y1) = match args.pos {
            Some((px, py)) => {
                finite(px, "clip pos.x")?;
                finite(py, "clip pos.y")?;
                x1 = snap_lo(px);
                y1 = snap_lo(py);
                (px, py)
            }
            None => (prev.x1 as f32, prev.y1 as f32),
        };
        if let Some((sx, sy)) = args.size {
            finite(sx, "clip size.x")?;
            finite(sy, "clip size.y")?;
            x2 = snap_hi(raw_x1 + sx);
            y2 = snap_hi(raw_y1 + sy);
        }
        if let Some(z) = args.z {
            finite(z, "clip z")?;
            z1 = z;
        }
        if let Some(zs) = args.z_size {
            finite(zs, "clip z_size")?;
            z2 = z1 + zs;
        }

        // The clip never leaves the screen or the default z range.
        x1 = x1.max(0);
        y1 = y1.max(0);
        x2 = x2.min(self.width as i32 - 1);
        y2 = y2.min(self.height as i32 - 1);
        z1 = z1.max(CLIP_Z1_DEFAULT);
        z2 = z2.min(CLIP_Z2_DEFAULT);

        if intersect {
            x1 = x1.max(prev.x1);
            y1 = y1.max(prev.y1);
            x2 = x2.min(prev.x2);
            y2 = y2.min(prev.y2);
            z1 = z1.max(prev.z1);
            z2 = z2.min(prev.z2);
        }

        self.clip = Clip { x1, y1, x2, y2, z1, z2 };
        Ok(())
    }

    /// Save the full transform + clip state; scoped drawing restores it
    /// with `pop`.
    pub fn push(&mut self) -> StateToken {
        self.stack.push((self.transform, self.clip));
        StateToken(self.stack.len() - 1)
    }

    /// Restore the snapshot saved by the matching `push`, unwinding any
    /// deeper saves along the way.
    pub fn pop(&mut self, token: StateToken) -> Result<(), DrawError> {
        if token.0 >= self.stack.len() {
            return Err(DrawError::StaleToken { token: token.0, depth: self.stack.len() });
        }
        let (t, c) = self.stack[token.0];
        self.stack.truncate(token.0);
        self.transform = t;
        self.clip = c;
        Ok(())
    }

    // ========================================================================
    // Background
    // ========================================================================

    pub fn set_background(&mut self, color: Color) -> Result<(), DrawError> {
        let packed = color.check("background")?.pack();
        self.background = Background::Color(force_opaque(packed));
        Ok(())
    }

    /// Use a full-screen sheet as the frame clear source.
    pub fn set_background_sheet(
        &mut self,
        assets: &AssetStore,
        sheet: SheetId,
    ) -> Result<(), DrawError> {
        let s = assets.sheet(sheet).ok_or(DrawError::UnknownSheet(sheet.0))?;
        if s.width() != self.width || s.height() != self.height {
            return Err(DrawError::SizeMismatch {
                expected: (self.width, self.height),
                got: (s.width(), s.height()),
            });
        }
        self.background = Background::Sheet(sheet);
        Ok(())
    }

    // ========================================================================
    // Submission API
    // ========================================================================

    fn push_command(&mut self, z: f32, op: CommandOp) {
        self.buffer.push(z, self.transform.z_sign(), self.clip, op);
    }

    /// Conservative screen-space bounds test against the clip snapshot.
    fn culled(&self, x1: f32, y1: f32, x2: f32, y2: f32, z: f32) -> bool {
        let c = &self.clip;
        z < c.z1
            || z > c.z2
            || x2 < c.x1 as f32
            || x1 > c.x2 as f32
            || y2 < c.y1 as f32
            || y1 > c.y2 as f32
    }

    pub fn draw_point(&mut self, pos: (f32, f32), color: Color, z: f32) -> Result<(), DrawError> {
        finite(pos.0, "pos.x")?;
        finite(pos.1, "pos.y")?;
        finite(z, "z")?;
        let packed = color.check("color")?.pack();
        if alpha4(packed) == 0 {
            return Ok(());
        }
        let (sx, sy, sz) = self.transform.apply(pos.0, pos.1, z);
        if self.culled(sx - 1.0, sy - 1.0, sx + 1.0, sy + 1.0, sz) {
            return Ok(());
        }

        let point = PixPoint { x: snap_lo(sx), y: snap_lo(sy), color: packed };
        // Consecutive points at one depth coalesce into one record.
        if let Some(cmd) = self.buffer.last_mut() {
            if cmd.base_z == sz && cmd.clip == self.clip {
                if let CommandOp::Pix { points } = &mut cmd.op {
                    points.push(point);
                    return Ok(());
                }
            }
        }
        self.push_command(sz, CommandOp::Pix { points: vec![point] });
        Ok(())
    }

    pub fn draw_line(
        &mut self,
        a: (f32, f32),
        b: (f32, f32),
        color: Color,
        args: LineArgs,
    ) -> Result<(), DrawError> {
        finite(a.0, "a.x")?;
        finite(a.1, "a.y")?;
        finite(b.0, "b.x")?;
        finite(b.1, "b.y")?;
        finite(args.z, "z")?;
        let packed = color.check("color")?.pack();
        if alpha4(packed) == 0 {
            return Ok(());
        }
        let (x1, y1, sz) = self.transform.apply(a.0, a.1, args.z);
        let (x2, y2, _) = self.transform.apply(b.0, b.1, args.z);
        if self.culled(
            x1.min(x2) - 1.0,
            y1.min(y2) - 1.0,
            x1.max(x2) + 1.0,
            y1.max(y2) + 1.0,
            sz,
        ) {
            return Ok(());
        }
        self.push_command(
            sz,
            CommandOp::Lin { x1, y1, x2, y2, color: packed, open1: args.open_a, open2: args.open_b },
        );
        Ok(())
    }

    pub fn draw_disk(
        &mut self,
        center: (f32, f32),
        radius: f32,
        args: DiskArgs,
    ) -> Result<(), DrawError> {
        finite(center.0, "center.x")?;
        finite(center.1, "center.y")?;
        finite(radius, "radius")?;
        finite(args.z, "z")?;
        let fill = pack_opt(args.fill, "fill")?;
        let outline = pack_opt(args.outline, "outline")?;
        if radius < 0.5 || (alpha4(fill) == 0 && alpha4(outline) == 0) {
            return Ok(());
        }
        let (sx, sy, sz) = self.transform.apply(center.0, center.1, args.z);
        let r = radius + 1.0;
        if self.culled(sx - r, sy - r, sx + r, sy + r, sz) {
            return Ok(());
        }
        self.push_command(sz, CommandOp::Cir { x: sx, y: sy, radius, fill, outline });
        Ok(())
    }

    pub fn draw_corner_rect(
        &mut self,
        corner: (f32, f32),
        size: (f32, f32),
        args: CornerRectArgs,
    ) -> Result<(), DrawError> {
        finite(corner.0, "corner.x")?;
        finite(corner.1, "corner.y")?;
        finite(size.0, "size.x")?;
        finite(size.1, "size.y")?;
        finite(args.z, "z")?;
        let fill = pack_opt(args.fill, "fill")?;
        let outline = pack_opt(args.outline, "outline")?;
        if size.0 <= 0.0 || size.1 <= 0.0 || (alpha4(fill) == 0 && alpha4(outline) == 0) {
            return Ok(());
        }

        // Mirroring can swap the transformed corners; sort before snapping.
        let (ax, ay, sz) = self.transform.apply(corner.0, corner.1, args.z);
        let (bx, by, _) = self.transform.apply(corner.0 + size.0, corner.1 + size.1, args.z);
        let (rx1, rx2) = if ax <= bx { (ax, bx) } else { (bx, ax) };
        let (ry1, ry2) = if ay <= by { (ay, by) } else { (by, ay) };
        let x1 = snap_lo(rx1);
        let x2 = snap_hi(rx2);
        let y1 = snap_lo(ry1);
        let y2 = snap_hi(ry2);
        if x1 > x2 || y1 > y2 {
            return Ok(());
        }
        if self.culled(x1 as f32, y1 as f32, x2 as f32, y2 as f32, sz) {
            return Ok(());
        }
        self.push_command(
            sz,
            CommandOp::Rec {
                x1: x1 as f32,
                y1: y1 as f32,
                x2: x2 as f32,
                y2: y2 as f32,
                fill,
                outline,
            },
        );
        Ok(())
    }

    /// Center-anchored, optionally rotated rectangle. Angles within 1e-10
    /// of a quarter turn dispatch to the axis-aligned span path, which
    /// produces the same pixels as the polygon path at those angles.
    pub fn draw_rect(
        &mut self,
        center: (f32, f32),
        size: (f32, f32),
        args: RectArgs,
    ) -> Result<(), DrawError> {
        finite(center.0, "center.x")?;
        finite(center.1, "center.y")?;
        finite(size.0, "size.x")?;
        finite(size.1, "size.y")?;
        finite(args.angle, "angle")?;
        finite(args.z, "z")?;
        if size.0 <= 0.0 || size.1 <= 0.0 {
            return Ok(());
        }

        let rx = size.0 * 0.5;
        let ry = size.1 * 0.5;
        let quarter = std::f32::consts::FRAC_PI_2;
        let k = (args.angle / quarter).round();
        if (args.angle - k * quarter).abs() < 1e-10 {
            let odd = (k as i64).rem_euclid(2) == 1;
            let (hx, hy) = if odd { (ry, rx) } else { (rx, ry) };
            return self.draw_corner_rect(
                (center.0 - hx, center.1 - hy),
                (hx * 2.0, hy * 2.0),
                CornerRectArgs { fill: args.fill, outline: args.outline, z: args.z },
            );
        }

        let corners = [(-rx, -ry), (rx, -ry), (rx, ry), (-rx, ry)];
        self.draw_poly(
            &corners,
            PolyArgs {
                fill: args.fill,
                outline: args.outline,
                pos: center,
                angle: args.angle,
                scale: (1.0, 1.0),
                z: args.z,
            },
        )
    }

    /// Convex polygon. Degenerate vertex counts fall back to a point or a
    /// line.
    pub fn draw_poly(&mut self, points: &[(f32, f32)], args: PolyArgs) -> Result<(), DrawError> {
        for p in points {
            if !p.0.is_finite() || !p.1.is_finite() {
                return Err(DrawError::NonFinite { what: "polygon vertex" });
            }
        }
        finite(args.pos.0, "pos.x")?;
        finite(args.pos.1, "pos.y")?;
        finite(args.angle, "angle")?;
        finite(args.scale.0, "scale.x")?;
        finite(args.scale.1, "scale.y")?;
        finite(args.z, "z")?;
        let fill = pack_opt(args.fill, "fill")?;
        let outline = pack_opt(args.outline, "outline")?;
        if alpha4(fill) == 0 && alpha4(outline) == 0 {
            return Ok(());
        }

        // Local pose: scale, then rotate, then translate.
        let (sin, cos) = args.angle.sin_cos();
        let place = |p: &(f32, f32)| -> (f32, f32) {
            let lx = p.0 * args.scale.0;
            let ly = p.1 * args.scale.1;
            (args.pos.0 + lx * cos - ly * sin, args.pos.1 + lx * sin + ly * cos)
        };

        match points.len() {
            0 => Ok(()),
            1 => {
                let color = if alpha4(fill) != 0 { args.fill } else { args.outline };
                let Some(color) = color else { return Ok(()) };
                self.draw_point(place(&points[0]), color, args.z)
            }
            2 => {
                let color = if alpha4(outline) != 0 { args.outline } else { args.fill };
                let Some(color) = color else { return Ok(()) };
                self.draw_line(
                    place(&points[0]),
                    place(&points[1]),
                    color,
                    LineArgs { z: args.z, ..Default::default() },
                )
            }
            _ => {
                let mut screen = Vec::with_capacity(points.len());
                let mut min_x = f32::INFINITY;
                let mut min_y = f32::INFINITY;
                let mut max_x = f32::NEG_INFINITY;
                let mut max_y = f32::NEG_INFINITY;
                let sz = self.transform.apply_z(args.z);
                for p in points {
                    let (wx, wy) = place(p);
                    let (sx, sy, _) = self.transform.apply(wx, wy, args.z);
                    min_x = min_x.min(sx);
                    min_y = min_y.min(sy);
                    max_x = max_x.max(sx);
                    max_y = max_y.max(sy);
                    screen.push((sx, sy));
                }
                if self.culled(min_x - 1.0, min_y - 1.0, max_x + 1.0, max_y + 1.0, sz) {
                    return Ok(());
                }
                self.push_command(sz, CommandOp::Ply { points: screen, fill, outline });
                Ok(())
            }
        }
    }

    pub fn draw_sprite(
        &mut self,
        assets: &AssetStore,
        sprite: Sprite,
        args: SpriteArgs,
    ) -> Result<(), DrawError> {
        let sheet = assets
            .sheet(sprite.sheet)
            .ok_or(DrawError::UnknownSheet(sprite.sheet.0))?;
        let frame = sheet
            .frame(sprite.frame)
            .ok_or(DrawError::UnknownFrame { sheet: sprite.sheet.0, frame: sprite.frame })?;
        finite(args.pos.0, "pos.x")?;
        finite(args.pos.1, "pos.y")?;
        finite(args.angle, "angle")?;
        finite(args.scale.0, "scale.x")?;
        finite(args.scale.1, "scale.y")?;
        finite(args.opacity, "opacity")?;
        finite(args.z, "z")?;
        let override_color = pack_opt(args.override_color, "override_color")?;

        let opacity = args.opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return Ok(());
        }

        let t = self.transform;
        let scale_x = args.scale.0 * frame.scale_x * t.scale_x;
        let scale_y = args.scale.1 * frame.scale_y * t.scale_y;
        // A zero scale is a zero-area sprite; bail before the matrix math
        // divides by it.
        if scale_x.abs() < 1e-10 || scale_y.abs() < 1e-10 {
            return Ok(());
        }
        // A mirrored coordinate system rotates the other way.
        let angle = args.angle * t.scale_x * t.scale_y;

        let (sx, sy, sz) = t.apply(args.pos.0, args.pos.1, args.z);
        let scaled_w = frame.size_x as f32 * scale_x;
        let scaled_h = frame.size_y as f32 * scale_y;
        let r = 0.5 * scaled_w.hypot(scaled_h) + 1.0;
        if self.culled(sx - r, sy - r, sx + r, sy + r, sz) {
            return Ok(());
        }

        let blit = SpriteBlit {
            sheet: sprite.sheet.0,
            corner_x: frame.corner_x as i32,
            corner_y: frame.corner_y as i32,
            size_x: frame.size_x as i32,
            size_y: frame.size_y as i32,
            has_alpha: frame.has_alpha,
            x: sx,
            y: sy,
            angle,
            scale_x,
            scale_y,
            opacity,
            override_color,
            multiply: args.multiply,
        };

        // Consecutive sprites at one depth batch into a single record.
        if let Some(cmd) = self.buffer.last_mut() {
            if cmd.base_z == sz && cmd.clip == self.clip {
                if let CommandOp::Blt { sprites } = &mut cmd.op {
                    sprites.push(blit);
                    return Ok(());
                }
            }
        }
        self.push_command(sz, CommandOp::Blt { sprites: vec![blit] });
        Ok(())
    }

    /// Enqueue one batched record per visible map layer. Tiles outside the
    /// clip are skipped; wrapped axes repeat the map across the world.
    pub fn draw_map(
        &mut self,
        assets: &AssetStore,
        map: MapId,
        args: MapArgs,
    ) -> Result<(), DrawError> {
        let m = assets.map(map).ok_or(DrawError::UnknownMap(map.0))?;
        let sheet = assets.sheet(m.sheet).ok_or(DrawError::UnknownSheet(m.sheet.0))?;
        finite(args.pos.0, "pos.x")?;
        finite(args.pos.1, "pos.y")?;
        finite(args.z, "z")?;
        if m.layer_count() == 0 {
            return Ok(());
        }
        let max_layer = args.max_layer.unwrap_or(m.layer_count() - 1).min(m.layer_count() - 1);

        let t = self.transform;
        let clip = self.clip;
        let tw = m.tile_w as f32;
        let th = m.tile_h as f32;

        for layer in args.min_layer..=max_layer {
            let lz = args.z + layer as f32 * m.layer_z;
            let sz = t.apply_z(lz);
            if sz < clip.z1 || sz > clip.z2 {
                continue;
            }

            // Invert the affine x/y mapping over the clip rectangle to find
            // the visible tile range (scale is +/-1, so its inverse is
            // itself).
            let inv_x = |s: f32| (s - t.offset_x) * t.scale_x - lz * t.skew_xz;
            let inv_y = |s: f32| (s - t.offset_y) * t.scale_y - lz * t.skew_yz;
            let la = inv_x(clip.x1 as f32 - tw);
            let lb = inv_x(clip.x2 as f32 + tw);
            let (lx1, lx2) = if la <= lb { (la, lb) } else { (lb, la) };
            let la = inv_y(clip.y1 as f32 - th);
            let lb = inv_y(clip.y2 as f32 + th);
            let (ly1, ly2) = if la <= lb { (la, lb) } else { (lb, la) };

            let mut i0 = ((lx1 - args.pos.0) / tw).floor() as i32 - 1;
            let mut i1 = ((lx2 - args.pos.0) / tw).ceil() as i32 + 1;
            let mut j0 = ((ly1 - args.pos.1) / th).floor() as i32 - 1;
            let mut j1 = ((ly2 - args.pos.1) / th).ceil() as i32 + 1;

            // A wrapped axis repeats at most one replica to either side; an
            // unwrapped axis stops at the map edge.
            if m.wrap_x {
                i0 = i0.max(-(m.size_x as i32));
                i1 = i1.min(2 * m.size_x as i32 - 1);
            } else {
                i0 = i0.max(0);
                i1 = i1.min(m.size_x as i32 - 1);
            }
            if m.wrap_y {
                j0 = j0.max(-(m.size_y as i32));
                j1 = j1.min(2 * m.size_y as i32 - 1);
            } else {
                j0 = j0.max(0);
                j1 = j1.min(m.size_y as i32 - 1);
            }

            let half_x = tw * 0.5 + 1.0;
            let half_y = th * 0.5 + 1.0;
            let mut sprites = Vec::new();
            for j in j0..=j1 {
                for i in i0..=i1 {
                    let Some(frame_idx) = m.tile(layer, i, j) else {
                        continue;
                    };
                    let Some(frame) = sheet.frame(frame_idx as usize) else {
                        continue;
                    };
                    let wx = args.pos.0 + (i as f32 + 0.5) * tw;
                    let wy = args.pos.1 + (j as f32 + 0.5) * th;
                    let (sx, sy, _) = t.apply(wx, wy, lz);
                    if sx + half_x < clip.x1 as f32
                        || sx - half_x > clip.x2 as f32
                        || sy + half_y < clip.y1 as f32
                        || sy - half_y > clip.y2 as f32
                    {
                        continue;
                    }
                    sprites.push(SpriteBlit {
                        sheet: m.sheet.0,
                        corner_x: frame.corner_x as i32,
                        corner_y: frame.corner_y as i32,
                        size_x: frame.size_x as i32,
                        size_y: frame.size_y as i32,
                        has_alpha: frame.has_alpha,
                        x: sx,
                        y: sy,
                        angle: 0.0,
                        scale_x: frame.scale_x * t.scale_x,
                        scale_y: frame.scale_y * t.scale_y,
                        opacity: 1.0,
                        override_color: 0,
                        multiply: false,
                    });
                }
            }
            if !sprites.is_empty() {
                self.push_command(sz, CommandOp::Map { sprites });
            }
        }
        Ok(())
    }

    pub fn draw_text(
        &mut self,
        assets: &AssetStore,
        font: FontId,
        text: &str,
        args: TextArgs,
    ) -> Result<(), DrawError> {
        let f = assets.font(font).ok_or(DrawError::UnknownFont(font.0))?;
        finite(args.pos.0, "pos.x")?;
        finite(args.pos.1, "pos.y")?;
        finite(args.z, "z")?;
        let color = pack_opt(args.color, "color")?;
        let outline = pack_opt(args.outline, "outline")?;
        let shadow = pack_opt(args.shadow, "shadow")?;
        if text.is_empty() || alpha4(color | outline | shadow) == 0 {
            return Ok(());
        }

        let (sx, sy, sz) = self.transform.apply(args.pos.0, args.pos.1, args.z);
        let width = f.text_width(text);
        let mut x = snap_lo(sx);
        let mut y = snap_lo(sy);
        match args.x_align {
            XAlign::Left => {}
            XAlign::Center => x -= width / 2,
            XAlign::Right => x -= width,
        }
        match args.y_align {
            YAlign::Top => {}
            YAlign::Center => y -= f.char_height / 2,
            YAlign::Baseline => y -= f.baseline,
            YAlign::Bottom => y -= f.char_height,
        }

        // Conservative bounds with room for outline and shadow overhang.
        if self.culled(
            (x - 2) as f32,
            (y - 2) as f32,
            (x + width + 2) as f32,
            (y + f.char_height + 2) as f32,
            sz,
        ) {
            return Ok(());
        }
        self.push_command(
            sz,
            CommandOp::Txt { font: font.0, text: text.to_string(), x, y, color, outline, shadow },
        );
        Ok(())
    }

    /// Re-enqueue the previous frame's command list verbatim.
    pub fn replay_previous_frame(&mut self) {
        self.buffer.replay_previous();
    }

    // ========================================================================
    // Frame scheduling
    // ========================================================================

    /// End-of-frame: clear to the background, z-sort the command list, and
    /// dispatch every record to its rasterizer. The dispatched list is kept
    /// read-only for replay; the buffer starts the next frame empty.
    pub fn present(
        &mut self,
        assets: &AssetStore,
        fb: &mut Framebuffer,
    ) -> Result<(), DrawError> {
        if fb.width() != self.width || fb.height() != self.height {
            return Err(DrawError::SizeMismatch {
                expected: (self.width, self.height),
                got: (fb.width(), fb.height()),
            });
        }
        debug_assert!(
            self.stack.is_empty(),
            "transform stack not unwound at frame end (depth {})",
            self.stack.len()
        );

        match self.background {
            Background::Color(c) => fb.fill(c),
            Background::Sheet(id) => {
                let sheet = assets.sheet(id).ok_or(DrawError::UnknownSheet(id.0))?;
                if sheet.width() != self.width || sheet.height() != self.height {
                    return Err(DrawError::SizeMismatch {
                        expected: (self.width, self.height),
                        got: (sheet.width(), sheet.height()),
                    });
                }
                fb.pixels_mut().copy_from_slice(sheet.data());
            }
        }

        self.buffer.sort();
        log::trace!("frame {}: dispatching {} draw commands", self.frame, self.buffer.len());

        for cmd in self.buffer.commands() {
            let clip = &cmd.clip;
            match &cmd.op {
                CommandOp::Pix { points } => raster::execute_pix(fb, points, clip),
                CommandOp::Lin { x1, y1, x2, y2, color, open1, open2 } => {
                    raster::execute_lin(fb, *x1, *y1, *x2, *y2, *color, *open1, *open2, clip);
                }
                CommandOp::Cir { x, y, radius, fill, outline } => {
                    raster::execute_cir(fb, *x, *y, *radius, *fill, *outline, clip);
                }
                CommandOp::Rec { x1, y1, x2, y2, fill, outline } => {
                    raster::execute_rec(fb, *x1, *y1, *x2, *y2, *fill, *outline, clip);
                }
                CommandOp::Ply { points, fill, outline } => {
                    raster::execute_ply(fb, points, *fill, *outline, clip);
                }
                CommandOp::Blt { sprites } | CommandOp::Map { sprites } => {
                    raster::execute_blt(fb, sprites, assets, clip);
                }
                CommandOp::Txt { font, text, x, y, color, outline, shadow } => {
                    if let Some(f) = assets.font(FontId(*font)) {
                        raster::execute_txt(fb, f, text, *x, *y, *color, *outline, *shadow, clip);
                    } else {
                        debug_assert!(false, "text command references missing font {}", font);
                    }
                }
            }
        }

        self.buffer.retire();
        self.frame += 1;
        Ok(())
    }
}

#[inline]
fn finite(v: f32, what: &'static str) -> Result<f32, DrawError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(DrawError::NonFinite { what })
    }
}

#[inline]
fn check_dir(dx: f32, dy: f32) -> Result<(), DrawError> {
    if (dx == 1.0 || dx == -1.0) && (dy == 1.0 || dy == -1.0) {
        Ok(())
    } else {
        Err(DrawError::BadDirection { x: dx, y: dy })
    }
}

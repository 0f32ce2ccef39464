//! Caller-space to screen-space transform and the clip cuboid.
//!
//! The transform is deliberately minimal: offsets, mirror-only x/y scale,
//! an arbitrary z scale, and two skew terms that shear x/y by a command's
//! own z (cheap parallax). General scaling of drawn content lives in the
//! geometry itself, never here.

/// Per-state transform fields. `scale_x`/`scale_y` are always exactly +/-1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_z: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub scale_z: f32,
    pub skew_xz: f32,
    pub skew_yz: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            offset_z: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            scale_z: 1.0,
            skew_xz: 0.0,
            skew_yz: 0.0,
        }
    }
}

impl Transform {
    /// Map a caller-space point (with its own z) to screen space.
    #[inline]
    pub fn apply(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        (
            (x + z * self.skew_xz) * self.scale_x + self.offset_x,
            (y + z * self.skew_yz) * self.scale_y + self.offset_y,
            z * self.scale_z + self.offset_z,
        )
    }

    /// Map a caller-space z to the screen-space sort depth.
    #[inline]
    pub fn apply_z(&self, z: f32) -> f32 {
        z * self.scale_z + self.offset_z
    }

    /// Sign of the z scale; zero stays zero (no tie-break nudge direction).
    #[inline]
    pub(crate) fn z_sign(&self) -> f32 {
        if self.scale_z > 0.0 {
            1.0
        } else if self.scale_z < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}

/// Default clip z range, generous enough for any sane layer stack.
pub const CLIP_Z1_DEFAULT: f32 = -2047.0;
pub const CLIP_Z2_DEFAULT: f32 = 2048.0;

/// The active clip cuboid: inclusive integer x/y bounds plus a z range.
/// A command whose bounds never meet this region is dropped at submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub z1: f32,
    pub z2: f32,
}

impl Clip {
    pub fn full_screen(width: u32, height: u32) -> Self {
        Self {
            x1: 0,
            y1: 0,
            x2: width as i32 - 1,
            y2: height as i32 - 1,
            z1: CLIP_Z1_DEFAULT,
            z2: CLIP_Z2_DEFAULT,
        }
    }
}

/// Arguments for `set_transform`/`compose_transform`; unset fields keep
/// (for set) or do not contribute (for compose) the current values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformArgs {
    pub pos: Option<(f32, f32)>,
    pub dir: Option<(f32, f32)>,
    pub z: Option<f32>,
    pub z_dir: Option<f32>,
    pub skew: Option<(f32, f32)>,
}

/// Arguments for `set_clip`/`intersect_clip`; unset fields resolve from the
/// previous clip.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipArgs {
    pub pos: Option<(f32, f32)>,
    pub size: Option<(f32, f32)>,
    pub z: Option<f32>,
    pub z_size: Option<f32>,
}

/// Round half-up: the low/left edge rule. Pixels have integer centers, so
/// -0.7 must land at -1 (off screen), not truncate to 0.
#[inline]
pub(crate) fn snap_lo(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

/// `floor(v - 0.5)`: the inclusive high/right edge rule. Together with
/// `snap_lo` this makes abutting draw calls cover adjacent pixels exactly
/// once.
#[inline]
pub(crate) fn snap_hi(v: f32) -> i32 {
    (v - 0.5).floor() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_maps_through() {
        let t = Transform::default();
        assert_eq!(t.apply(3.0, 4.0, 5.0), (3.0, 4.0, 5.0));
    }

    #[test]
    fn skew_shears_by_command_z() {
        let t = Transform { skew_xz: 0.5, ..Default::default() };
        let (x, y, _) = t.apply(10.0, 2.0, 4.0);
        assert_eq!(x, 12.0);
        assert_eq!(y, 2.0);
    }

    #[test]
    fn mirror_flips_about_offset() {
        let t = Transform { scale_x: -1.0, offset_x: 100.0, ..Default::default() };
        assert_eq!(t.apply(10.0, 0.0, 0.0).0, 90.0);
    }

    #[test]
    fn snap_rules() {
        assert_eq!(snap_lo(0.0), 0);
        assert_eq!(snap_lo(0.49), 0);
        assert_eq!(snap_lo(0.5), 1);
        assert_eq!(snap_lo(-0.7), -1);
        assert_eq!(snap_hi(10.0), 9);
        assert_eq!(snap_hi(10.6), 10);
        // Adjacent regions [0,10) and [10,20) share no pixel.
        assert_eq!(snap_hi(10.0) + 1, snap_lo(10.0));
    }

    #[test]
    fn z_sign_matches_scale() {
        let mut t = Transform::default();
        assert_eq!(t.z_sign(), 1.0);
        t.scale_z = -3.0;
        assert_eq!(t.z_sign(), -1.0);
        t.scale_z = 0.0;
        assert_eq!(t.z_sign(), 0.0);
    }
}

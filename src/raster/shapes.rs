//! Point, line, circle, rectangle, and convex-polygon rasterizers.

use crate::command::PixPoint;
use crate::transform::Clip;

use super::Framebuffer;

/// Batched points: each one is a clipped `pset`.
pub(crate) fn execute_pix(fb: &mut Framebuffer, points: &[PixPoint], clip: &Clip) {
    for p in points {
        fb.pset(p.x as f32, p.y as f32, p.color, clip);
    }
}

pub(crate) fn execute_lin(
    fb: &mut Framebuffer,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    color: u32,
    open1: bool,
    open2: bool,
    clip: &Clip,
) {
    line(fb, x1, y1, x2, y2, color, clip, open1, open2);
}

/// Sign with a true zero case (`f32::signum` maps 0 to 1).
#[inline]
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Line segment with optionally open endpoints. An open endpoint excludes
/// one pixel at that end so that chained segments never double-blend the
/// shared pixel. Horizontal and vertical lines take the span fast path;
/// the general case steps a DDA along the dominant axis in increasing
/// order, cropping to the clip before the loop.
pub(crate) fn line(
    fb: &mut Framebuffer,
    mut x1: f32,
    mut y1: f32,
    mut x2: f32,
    mut y2: f32,
    color: u32,
    clip: &Clip,
    mut open1: bool,
    mut open2: bool,
) {
    if y1 == y2 {
        // Horizontal fast path; also avoids a divide by zero below.
        let dx = sign(x2 - x1);
        if open1 {
            x1 += dx;
        }
        if open2 {
            x2 -= dx;
        }
        fb.hline(x1.min(x2), y1, x1.max(x2), color, clip);
    } else if x1 == x2 {
        // Vertical fast path.
        let dy = sign(y2 - y1);
        if open1 {
            y1 += dy;
        }
        if open2 {
            y2 -= dy;
        }
        fb.vline(x1, y1.min(y2), y1.max(y2), color, clip);
    } else {
        // General case via DDA. The slope survives an endpoint swap since
        // both deltas negate together.
        let dx = x2 - x1;
        let dy = y2 - y1;
        let more_horizontal = dx.abs() > dy.abs();

        if (more_horizontal && x2 < x1) || (!more_horizontal && y2 < y1) {
            // Iterate in increasing order on the dominant axis; the open
            // flags travel with their endpoints.
            std::mem::swap(&mut x1, &mut x2);
            std::mem::swap(&mut y1, &mut y2);
            std::mem::swap(&mut open1, &mut open2);
        }

        if more_horizontal {
            let m = dy / dx;

            if open1 {
                x1 += 1.0;
                y1 += m;
            }
            if open2 {
                x2 -= 1.0;
            }

            // Crop horizontally to the clip before stepping.
            let step = (clip.x1 as f32).max(x1) - x1;
            x1 += step;
            y1 += m * step;
            x2 = x2.min(clip.x2 as f32);

            let xa = x1 as i32;
            let xb = x2 as i32;
            let mut y = y1;
            for x in xa..=xb {
                fb.pset(x as f32, y, color, clip);
                y += m;
            }
        } else {
            let m = dx / dy;

            if open1 {
                y1 += 1.0;
                x1 += m;
            }
            if open2 {
                y2 -= 1.0;
            }

            // Crop vertically.
            let step = (clip.y1 as f32).max(y1) - y1;
            x1 += step * m;
            y1 += step;
            y2 = y2.min(clip.y2 as f32);

            let ya = y1 as i32;
            let yb = y2 as i32;
            let mut x = x1;
            for y in ya..=yb {
                fb.pset(x, y as f32, color, clip);
                x += m;
            }
        }
    }
}

/// Midpoint circle: filled spans for the interior, 8-way reflected points
/// for the outline. Fill and outline are independent passes; the outline is
/// skipped when it would just re-blend the fill color.
pub(crate) fn execute_cir(
    fb: &mut Framebuffer,
    x: f32,
    y: f32,
    radius: f32,
    fill: u32,
    outline: u32,
    clip: &Clip,
) {
    if fill >> 28 != 0 {
        let mut ox = radius - 1.0;
        let mut oy = 0.0;
        let mut dx = 1.0;
        let mut dy = 1.0;
        let mut err = dx - radius * 2.0;

        // Iterate over 1/8 of the circle and reflect.
        while ox >= oy {
            if ox != oy {
                fb.hline(x - ox, y + oy, x + ox, fill, clip);
                if oy > 0.0 {
                    fb.hline(x - ox, y - oy, x + ox, fill, clip);
                }
            }

            let old = oy;
            // -4 gives better shape for small circles
            if err <= -4.0 {
                oy += 1.0;
                err += dy;
                dy += 2.0;
            }

            // ...intentionally no "else", so x and y can step together...

            if err > -4.0 {
                // Caps
                fb.hline(x - old, y + ox, x + old, fill, clip);
                fb.hline(x - old, y - ox, x + old, fill, clip);
                ox -= 1.0;
                dx += 2.0;
                err += dx - radius * 2.0;
            }
        }
    }

    if outline >> 28 != 0 && outline != fill {
        let mut ox = radius - 1.0;
        let mut oy = 0.0;
        let mut dx = 1.0;
        let mut dy = 1.0;
        let mut err = dx - radius * 2.0;

        while ox >= oy {
            if ox != oy {
                fb.pset(x - ox, y + oy, outline, clip);
                fb.pset(x + ox, y + oy, outline, clip);
                if oy > 0.0 {
                    fb.pset(x - ox, y - oy, outline, clip);
                    fb.pset(x + ox, y - oy, outline, clip);
                }
            }

            fb.pset(x - oy, y + ox, outline, clip);
            fb.pset(x - oy, y - ox, outline, clip);
            if oy > 0.0 {
                fb.pset(x + oy, y + ox, outline, clip);
                fb.pset(x + oy, y - ox, outline, clip);
            }

            if err <= -4.0 {
                oy += 1.0;
                err += dy;
                dy += 2.0;
            }

            if err > -4.0 {
                ox -= 1.0;
                dx += 2.0;
                err -= radius * 2.0 - dx;
            }
        }
    }
}

/// Axis-aligned rectangle. The outline is four spans; if it was drawn, the
/// fill shrinks one pixel per side so the two never overlap-blend.
pub(crate) fn execute_rec(
    fb: &mut Framebuffer,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    fill: u32,
    outline: u32,
    clip: &Clip,
) {
    let (mut x1, mut y1, mut x2, mut y2) = (x1, y1, x2, y2);

    if outline != fill && outline >> 28 != 0 {
        fb.hline(x1, y1, x2, outline, clip);
        fb.hline(x1, y2, x2, outline, clip);
        fb.vline(x1, y1 + 1.0, y2 - 1.0, outline, clip);
        fb.vline(x2, y1 + 1.0, y2 - 1.0, outline, clip);
        x1 += 1.0;
        y1 += 1.0;
        x2 -= 1.0;
        y2 -= 1.0;
    }

    if fill >> 28 != 0 {
        let (cx1, cy1, cx2, cy2) = fb.clip_bounds(clip);
        let xa = ((x1 + 0.5).floor() as i32).max(cx1);
        let xb = ((x2 + 0.5).floor() as i32).min(cx2);
        let ya = ((y1 + 0.5).floor() as i32).max(cy1);
        let yb = ((y2 + 0.5).floor() as i32).min(cy2);
        for y in ya..=yb {
            fb.hline(xa as f32, y as f32, xb as f32, fill, clip);
        }
    }
}

/// Convex polygon scanline fill plus an outline drawn as a closed loop of
/// open-ended segments (so shared vertices blend once).
///
/// Each non-horizontal edge goes into a directed edge table, low y first.
/// Scanlines sample pixel centers (y + 0.5); because the polygon is convex,
/// the span is simply the min/max of every edge intersection. Span edges
/// follow the same rule as rectangles: round the low edge, `floor(x - 0.5)`
/// the high edge, which makes an unrotated rectangle drawn through this
/// path land on exactly the same pixels as the axis-aligned fast path.
pub(crate) fn execute_ply(
    fb: &mut Framebuffer,
    points: &[(f32, f32)],
    fill: u32,
    outline: u32,
    clip: &Clip,
) {
    let n = points.len();

    if fill >> 28 != 0 && n >= 3 {
        let inset = if outline >> 28 != 0 && outline != fill { 1 } else { 0 };

        // [start x, start y, dx/dy, vertical extent]
        let mut edges: Vec<[f32; 4]> = Vec::with_capacity(n);
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for i in 0..n {
            let (sx, sy) = points[i];
            let (ex, ey) = points[(i + 1) % n];
            let (sx, sy, ex, ey) = if sy <= ey { (sx, sy, ex, ey) } else { (ex, ey, sx, sy) };
            if sy < ey {
                min_y = min_y.min(sy);
                max_y = max_y.max(ey);
                edges.push([sx, sy, (ex - sx) / (ey - sy), ey - sy]);
            }
        }

        let (_, cy1, _, cy2) = fb.clip_bounds(clip);
        let ya = ((min_y + 0.5).floor() as i32).max(cy1);
        let yb = ((max_y - 0.5).floor() as i32).min(cy2);
        for y in ya..=yb {
            let yc = y as f32 + 0.5;

            // Intersect every edge; min/max is valid only because the
            // polygon is convex.
            let mut x0 = f32::INFINITY;
            let mut x1 = f32::NEG_INFINITY;
            for e in &edges {
                let t = yc - e[1];
                if t >= 0.0 && t <= e[3] {
                    let x = e[0] + t * e[2];
                    x0 = x0.min(x);
                    x1 = x1.max(x);
                }
            }

            if x0 <= x1 {
                let xa = ((x0 + 0.5).floor() as i32) + inset;
                let xb = ((x1 - 0.5).floor() as i32) - inset;
                if xa <= xb {
                    fb.hline(xa as f32, y as f32, xb as f32, fill, clip);
                }
            }
        }
    }

    if outline >> 28 != 0 && outline != fill && n >= 2 {
        for i in 0..n {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            line(fb, x1, y1, x2, y2, outline, clip, false, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn fb() -> Framebuffer {
        Framebuffer::with_size(32, 32)
    }

    fn clip() -> Clip {
        Clip::full_screen(32, 32)
    }

    fn count_colored(f: &Framebuffer) -> usize {
        (0..32)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .filter(|&(x, y)| f.pixel(x, y) != Some(0))
            .count()
    }

    const WHITE: u32 = 0xFFFFFFFF;

    #[test]
    fn diagonal_line_hits_both_endpoints() {
        let mut f = fb();
        line(&mut f, 2.0, 3.0, 10.0, 7.0, WHITE, &clip(), false, false);
        assert_eq!(f.pixel(2, 3), Some(WHITE));
        assert_eq!(f.pixel(10, 7), Some(WHITE));
        // One pixel per dominant-axis step.
        assert_eq!(count_colored(&f), 9);
    }

    #[test]
    fn open_endpoints_trim_one_pixel() {
        let mut f = fb();
        line(&mut f, 2.0, 5.0, 8.0, 5.0, WHITE, &clip(), true, true);
        assert_eq!(f.pixel(2, 5), Some(0));
        assert_eq!(f.pixel(3, 5), Some(WHITE));
        assert_eq!(f.pixel(7, 5), Some(WHITE));
        assert_eq!(f.pixel(8, 5), Some(0));
    }

    #[test]
    fn steep_line_swaps_open_flags_with_endpoints() {
        let mut f = fb();
        // Drawn bottom-to-top, so endpoints swap internally; the open flag
        // must stay with the (4,12) end.
        line(&mut f, 4.0, 12.0, 5.0, 2.0, WHITE, &clip(), true, false);
        assert_eq!(f.pixel(4, 12), Some(0));
        assert_eq!(f.pixel(4, 11), Some(WHITE));
        assert_eq!(f.pixel(5, 2), Some(WHITE));
    }

    #[test]
    fn vertical_line_open_flag_trims_its_own_end() {
        let mut f = fb();
        line(&mut f, 4.0, 12.0, 4.0, 2.0, WHITE, &clip(), true, false);
        assert_eq!(f.pixel(4, 12), Some(0));
        assert_eq!(f.pixel(4, 11), Some(WHITE));
        assert_eq!(f.pixel(4, 2), Some(WHITE));
    }

    #[test]
    fn circle_fill_is_symmetric() {
        let mut f = fb();
        execute_cir(&mut f, 16.0, 16.0, 6.0, WHITE, 0, &clip());
        for (dx, dy) in [(3, 2), (-3, 2), (3, -2), (-3, -2), (2, 3), (-2, -3)] {
            assert_eq!(f.pixel(16 + dx, 16 + dy), Some(WHITE));
        }
        assert_eq!(f.pixel(16, 16 + 9), Some(0));
        assert_eq!(f.pixel(16 + 9, 16), Some(0));
    }

    #[test]
    fn circle_outline_skipped_when_same_as_fill() {
        let mut a = fb();
        let mut b = fb();
        execute_cir(&mut a, 10.0, 10.0, 5.0, WHITE, WHITE, &clip());
        execute_cir(&mut b, 10.0, 10.0, 5.0, WHITE, 0, &clip());
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn rect_outline_and_fill_do_not_overlap() {
        let mut f = fb();
        let outline = WHITE;
        let fill = Color::rgba(1.0, 0.0, 0.0, 0.5).pack();
        execute_rec(&mut f, 4.0, 4.0, 10.0, 9.0, fill, outline, &clip());
        // Border pixels carry the pure outline color, not a blend.
        assert_eq!(f.pixel(4, 4), Some(outline));
        assert_eq!(f.pixel(10, 9), Some(outline));
        assert_eq!(f.pixel(7, 4), Some(outline));
        // Interior is the fill blended over black exactly once.
        assert_eq!(f.pixel(5, 5), Some(0xFF000088));
    }

    #[test]
    fn polygon_square_matches_rect_fill() {
        let mut a = fb();
        let mut b = fb();
        execute_ply(
            &mut a,
            &[(4.0, 4.0), (12.0, 4.0), (12.0, 12.0), (4.0, 12.0)],
            WHITE,
            0,
            &clip(),
        );
        execute_rec(&mut b, 4.0, 4.0, 11.0, 11.0, WHITE, 0, &clip());
        assert_eq!(a.pixels(), b.pixels());
        assert_eq!(count_colored(&a), 64);
    }

    #[test]
    fn triangle_fill_stays_inside_its_bounds() {
        let mut f = fb();
        execute_ply(&mut f, &[(16.0, 2.0), (28.0, 26.0), (4.0, 26.0)], WHITE, 0, &clip());
        assert_eq!(f.pixel(16, 14), Some(WHITE));
        assert_eq!(f.pixel(2, 3), Some(0));
        assert_eq!(f.pixel(30, 3), Some(0));
        assert!(count_colored(&f) > 100);
    }

    #[test]
    fn polygon_outline_blends_shared_vertices_once() {
        let mut f = fb();
        let translucent = Color::rgba(1.0, 1.0, 1.0, 0.5).pack();
        execute_ply(
            &mut f,
            &[(4.0, 4.0), (20.0, 4.0), (20.0, 20.0), (4.0, 20.0)],
            0,
            translucent,
            &clip(),
        );
        // Every outline pixel, corners included, is a single blend over black.
        for p in [(4, 4), (20, 4), (20, 20), (4, 20), (12, 4), (4, 12)] {
            assert_eq!(f.pixel(p.0, p.1), Some(0xFF888888), "pixel {:?}", p);
        }
    }
}

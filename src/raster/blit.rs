//! Affine sprite and tile blitting.
//!
//! Two implementations of the same operation: a row-copy fast path that is
//! valid only for unrotated, unit-scale, fully-opaque blits (the common
//! case for map tiles), and a general path that inverse-maps every
//! destination pixel center back into the source, samples nearest-neighbor,
//! and blends. Both derive their bounds by projecting the four source
//! corners to the screen and rounding with the shared edge rule.

use crate::assets::{AssetStore, SheetId};
use crate::color::with_alpha4;
use crate::command::SpriteBlit;
use crate::transform::Clip;

use super::{blend, Framebuffer};

const EPS: f32 = 1e-10;

pub(crate) fn execute_blt(
    fb: &mut Framebuffer,
    sprites: &[SpriteBlit],
    assets: &AssetStore,
    clip: &Clip,
) {
    let (cx1, cy1, cx2, cy2) = fb.clip_bounds(clip);

    for cmd in sprites {
        let Some(sheet) = assets.sheet(SheetId(cmd.sheet)) else {
            debug_assert!(false, "blit references sheet {} not in the store", cmd.sheet);
            continue;
        };

        // Source bounds, inclusive.
        let src_x1 = cmd.corner_x;
        let src_x2 = cmd.corner_x + cmd.size_x - 1;
        let src_y1 = cmd.corner_y;
        let src_y2 = cmd.corner_y + cmd.size_y - 1;

        // Destination and source centers.
        let dcx = cmd.x;
        let dcy = cmd.y;
        let scx = src_x1 as f32 + cmd.size_x as f32 * 0.5;
        let scy = src_y1 as f32 + cmd.size_y as f32 * 0.5;

        // Forward matrix maps destination to source; the inverse maps
        // source to destination for bounding-box purposes.
        let (sin, cos) = cmd.angle.sin_cos();
        let fx = cmd.scale_x;
        let fy = cmd.scale_y;
        let a = cos / fx;
        let b = -sin / fx;
        let c = sin / fy;
        let d = cos / fy;
        let e = cos * fx;
        let f = sin * fx;
        let g = -sin * fy;
        let h = cos * fy;

        // Project the four source corners to find the destination bounds.
        let mut bx1 = f32::INFINITY;
        let mut bx2 = f32::NEG_INFINITY;
        let mut by1 = f32::INFINITY;
        let mut by2 = f32::NEG_INFINITY;
        for i in 0..=1 {
            for j in 0..=1 {
                let sx = src_x1 as f32 + i as f32 * cmd.size_x as f32;
                let sy = src_y1 as f32 + j as f32 * cmd.size_y as f32;
                let tx = e * (sx - scx) + g * (sy - scy) + dcx;
                let ty = f * (sx - scx) + h * (sy - scy) + dcy;
                bx1 = bx1.min(tx);
                bx2 = bx2.max(tx);
                by1 = by1.min(ty);
                by2 = by2.max(ty);
            }
        }

        // Inclusive integer bounds with open top/left edges at pixel
        // centers, then restricted to the clip region.
        let dst_x1 = ((bx1 + 0.5).floor() as i32).max(cx1);
        let dst_y1 = ((by1 + 0.5).floor() as i32).max(cy1);
        let dst_x2 = ((bx2 - 0.5).floor() as i32).min(cx2);
        let dst_y2 = ((by2 - 0.5).floor() as i32).min(cy2);
        if dst_x1 > dst_x2 || dst_y1 > dst_y2 {
            continue;
        }

        let sheet_w = sheet.width() as i32;
        let fb_w = fb.width() as i32;
        let opacity = cmd.opacity;
        let no_override = cmd.override_color == 0 && !cmd.multiply;

        if (a.abs() - 1.0).abs() < EPS
            && b.abs() < EPS
            && c.abs() < EPS
            && (d.abs() - 1.0).abs() < EPS
            && no_override
        {
            // Axis-aligned unit scale: walk whole rows. The axes may still
            // be inverted; x inversion reads from the pre-flipped buffer.
            let width = dst_x2 - dst_x1 + 1;
            let src_y = ((dst_y1 as f32 + 0.4999 - dcy) * d + scy) as i32;
            let mut src_offset = ((dst_x1 as f32 + 0.4999 - dcx) + scx) as i32 + src_y * sheet_w;
            let mut dst_offset = dst_x1 + dst_y1 * fb_w;
            let src_step = (sheet_w as f32 * d) as i32;

            let data: &[u32] = if a < 0.0 {
                src_offset += sheet_w - (2.0 * scx) as i32;
                sheet.data_flipped()
            } else {
                sheet.data()
            };

            if !cmd.has_alpha && (opacity - 1.0).abs() < EPS {
                // Pure row copy.
                for _ in dst_y1..=dst_y2 {
                    let so = src_offset as usize;
                    let do_ = dst_offset as usize;
                    debug_assert!(so + width as usize <= data.len());
                    fb.pixels_mut()[do_..do_ + width as usize]
                        .copy_from_slice(&data[so..so + width as usize]);
                    dst_offset += fb_w;
                    src_offset += src_step;
                }
            } else {
                // Per-texel alpha test / blend, still axis-aligned.
                for _ in dst_y1..=dst_y2 {
                    for i in 0..width {
                        let color = data[(src_offset + i) as usize];
                        let mut a4 = color >> 28;
                        if a4 != 0 {
                            if opacity < 1.0 {
                                a4 = (a4 as f32 * opacity + 0.5) as u32;
                            }
                            let offset = (dst_offset + i) as usize;
                            if a4 == 0xF {
                                fb.pixels_mut()[offset] = color;
                            } else if a4 != 0 {
                                let back = fb.pixels()[offset];
                                fb.pixels_mut()[offset] = blend(back, with_alpha4(color, a4));
                            }
                        }
                    }
                    dst_offset += fb_w;
                    src_offset += src_step;
                }
            }
        } else if no_override && !cmd.has_alpha && (opacity - 1.0).abs() < EPS {
            // Rotation and scale but no blending: sample and overwrite.
            for dst_y in dst_y1..=dst_y2 {
                // The 0.4999 bias samples pixel centers while rounding the
                // right way on exact boundaries.
                let xterms = (dst_y as f32 + 0.4999 - dcy) * b + scx + (0.4999 - dcx) * a;
                let yterms = (dst_y as f32 + 0.4999 - dcy) * d + scy + (0.4999 - dcx) * c;
                let mut dst_offset = dst_x1 + dst_y * fb_w;
                for dst_x in dst_x1..=dst_x2 {
                    let src_x = (dst_x as f32 * a + xterms) as i32;
                    let src_y = (dst_x as f32 * c + yterms) as i32;
                    if src_x >= src_x1 && src_x <= src_x2 && src_y >= src_y1 && src_y <= src_y2 {
                        fb.pixels_mut()[dst_offset as usize] =
                            sheet.data()[(src_x + src_y * sheet_w) as usize];
                    }
                    dst_offset += 1;
                }
            }
        } else {
            // General case: opacity, override color, and blending.
            let ovr = cmd.override_color;
            let ovr_alpha = 1.0 - (ovr >> 28) as f32 * (1.0 / 15.0);
            let mode = if cmd.multiply {
                3
            } else if ovr_alpha == 1.0 {
                0
            } else if ovr_alpha == 0.0 {
                2
            } else {
                1
            };
            // Pre-scaled blend terms for the partial-override mode.
            let ovr_r = ((ovr >> 4) & 0xF) as f32 * (1.0 - ovr_alpha) + 0.5;
            let ovr_g = ((ovr >> 12) & 0xF) as f32 * (1.0 - ovr_alpha) + 0.5;
            let ovr_b = ((ovr >> 20) & 0xF) as f32 * (1.0 - ovr_alpha) + 0.5;
            // Normalized multiply factors (palette level / 15).
            let mul_r = ((ovr >> 4) & 0xF) as f32 * (1.0 / 15.0);
            let mul_g = ((ovr >> 12) & 0xF) as f32 * (1.0 / 15.0);
            let mul_b = ((ovr >> 20) & 0xF) as f32 * (1.0 / 15.0);

            for dst_y in dst_y1..=dst_y2 {
                let xterms = (dst_y as f32 + 0.4999 - dcy) * b + scx + (0.4999 - dcx) * a;
                let yterms = (dst_y as f32 + 0.4999 - dcy) * d + scy + (0.4999 - dcx) * c;
                let mut dst_offset = dst_x1 + dst_y * fb_w;
                for dst_x in dst_x1..=dst_x2 {
                    let src_x = (dst_x as f32 * a + xterms) as i32;
                    let src_y = (dst_x as f32 * c + yterms) as i32;
                    if src_x < src_x1 || src_x > src_x2 || src_y < src_y1 || src_y > src_y2 {
                        dst_offset += 1;
                        continue;
                    }

                    let mut color = sheet.data()[(src_x + src_y * sheet_w) as usize];
                    if opacity < 1.0 {
                        let a4 = ((color >> 28) as f32 * opacity + 0.5) as u32;
                        color = with_alpha4(color, a4);
                    }

                    let a4 = color >> 28;
                    if a4 != 0 {
                        match mode {
                            0 => {}
                            1 => {
                                // Blend the sampled RGB toward the override.
                                let sr = ((color >> 4) & 0xF) as f32;
                                let sg = ((color >> 12) & 0xF) as f32;
                                let sb = ((color >> 20) & 0xF) as f32;
                                let r = (ovr_r + sr * ovr_alpha) as u32;
                                let g2 = (ovr_g + sg * ovr_alpha) as u32;
                                let b2 = (ovr_b + sb * ovr_alpha) as u32;
                                color = (color & 0xFF00_0000)
                                    | (super::dup(b2) << 16)
                                    | (super::dup(g2) << 8)
                                    | super::dup(r);
                            }
                            2 => {
                                // Replace RGB, keep the sampled alpha shape.
                                color = (color & 0xFF00_0000) | (ovr & 0x00FF_FFFF);
                            }
                            _ => {
                                // Multiply in palette space.
                                let sr = ((color >> 4) & 0xF) as f32;
                                let sg = ((color >> 12) & 0xF) as f32;
                                let sb = ((color >> 20) & 0xF) as f32;
                                let r = (sr * mul_r + 0.5) as u32;
                                let g2 = (sg * mul_g + 0.5) as u32;
                                let b2 = (sb * mul_b + 0.5) as u32;
                                color = (color & 0xFF00_0000)
                                    | (super::dup(b2) << 16)
                                    | (super::dup(g2) << 8)
                                    | super::dup(r);
                            }
                        }

                        let offset = dst_offset as usize;
                        if a4 == 0xF {
                            fb.pixels_mut()[offset] = color;
                        } else {
                            let back = fb.pixels()[offset];
                            fb.pixels_mut()[offset] = blend(back, color);
                        }
                    }
                    dst_offset += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetStore, FrameManifest, SpriteSheet};
    use crate::transform::Clip;

    const R: u32 = 0xFF0000FF;
    const G: u32 = 0xFF00FF00;
    const B: u32 = 0xFFFF0000;
    const W: u32 = 0xFFFFFFFF;

    fn store_with_sheet(w: u32, h: u32, data: Vec<u32>) -> AssetStore {
        let mut store = AssetStore::new();
        let frames = vec![FrameManifest {
            x: 0,
            y: 0,
            width: w,
            height: h,
            flip_x: false,
            flip_y: false,
        }];
        store.add_sheet(SpriteSheet::new("test", w, h, data, frames).unwrap());
        store
    }

    fn blit_at(x: f32, y: f32, w: i32, h: i32) -> SpriteBlit {
        SpriteBlit {
            sheet: 0,
            corner_x: 0,
            corner_y: 0,
            size_x: w,
            size_y: h,
            has_alpha: false,
            x,
            y,
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            opacity: 1.0,
            override_color: 0,
            multiply: false,
        }
    }

    #[test]
    fn unit_blit_lands_at_integer_bounds() {
        let mut fb = Framebuffer::with_size(16, 16);
        let clip = Clip::full_screen(16, 16);
        let store = store_with_sheet(4, 4, vec![R; 16]);
        // Center (6, 6): covers pixels 4..=7 on both axes.
        execute_blt(&mut fb, &[blit_at(6.0, 6.0, 4, 4)], &store, &clip);
        for y in 4..=7 {
            for x in 4..=7 {
                assert_eq!(fb.pixel(x, y), Some(R));
            }
        }
        assert_eq!(fb.pixel(3, 4), Some(0));
        assert_eq!(fb.pixel(8, 4), Some(0));
    }

    #[test]
    fn x_mirror_uses_flipped_rows() {
        let mut fb = Framebuffer::with_size(16, 16);
        let clip = Clip::full_screen(16, 16);
        // 4x1 sprite: R G B W left-to-right.
        let store = store_with_sheet(4, 1, vec![R, G, B, W]);
        let mut cmd = blit_at(8.0, 4.5, 4, 1);
        cmd.scale_x = -1.0;
        execute_blt(&mut fb, &[cmd], &store, &clip);
        assert_eq!(fb.pixel(6, 4), Some(W));
        assert_eq!(fb.pixel(7, 4), Some(B));
        assert_eq!(fb.pixel(8, 4), Some(G));
        assert_eq!(fb.pixel(9, 4), Some(R));
    }

    #[test]
    fn fast_and_general_paths_agree_byte_for_byte() {
        let clip = Clip::full_screen(32, 32);
        // Varied opaque texels.
        let data: Vec<u32> = (0..64)
            .map(|i| 0xFF00_0000 | ((i * 4) & 0xFF) | (((i * 7) & 0xFF) << 8))
            .map(|c| {
                // Quantize to the palette so sampled colors are valid.
                let r = (c & 0xFF) >> 4;
                let g = ((c >> 8) & 0xFF) >> 4;
                0xFF00_0000 | (g << 12) | (g << 8) | (r << 4) | r
            })
            .collect();
        let store = store_with_sheet(8, 8, data);

        let mut fast = Framebuffer::with_size(32, 32);
        execute_blt(&mut fast, &[blit_at(16.0, 16.0, 8, 8)], &store, &clip);

        // Multiplying by opaque white is the identity, but forces the
        // general path.
        let mut general = Framebuffer::with_size(32, 32);
        let mut cmd = blit_at(16.0, 16.0, 8, 8);
        cmd.override_color = 0xFFFFFFFF;
        cmd.multiply = true;
        execute_blt(&mut general, &[cmd], &store, &clip);

        assert_eq!(fast.pixels(), general.pixels());
    }

    #[test]
    fn opacity_quantizes_to_sixteen_levels() {
        let clip = Clip::full_screen(8, 8);
        let store = store_with_sheet(2, 2, vec![W; 4]);
        let mut fb = Framebuffer::with_size(8, 8);
        fb.fill(0xFF000000);
        let mut cmd = blit_at(4.0, 4.0, 2, 2);
        cmd.has_alpha = true; // force the blending path
        cmd.opacity = 0.5;
        execute_blt(&mut fb, &[cmd], &store, &clip);
        // alpha level 15 * 0.5 rounds to 8.
        assert_eq!(fb.pixel(3, 3), Some(0xFF888888));
    }

    #[test]
    fn override_replaces_rgb_but_keeps_alpha_shape() {
        let clip = Clip::full_screen(8, 8);
        // One transparent texel in an opaque red sprite.
        let store = store_with_sheet(2, 2, vec![R, 0, R, R]);
        let mut fb = Framebuffer::with_size(8, 8);
        let mut cmd = blit_at(4.0, 4.0, 2, 2);
        cmd.has_alpha = true;
        cmd.override_color = G; // opaque green: full replace mode
        execute_blt(&mut fb, &[cmd], &store, &clip);
        assert_eq!(fb.pixel(3, 3), Some(G));
        assert_eq!(fb.pixel(4, 3), Some(0)); // transparent texel stays out
        assert_eq!(fb.pixel(3, 4), Some(G));
    }

    #[test]
    fn out_of_source_texels_are_rejected_when_rotated() {
        let clip = Clip::full_screen(32, 32);
        let store = store_with_sheet(4, 4, vec![W; 16]);
        let mut fb = Framebuffer::with_size(32, 32);
        let mut cmd = blit_at(16.0, 16.0, 4, 4);
        cmd.angle = std::f32::consts::FRAC_PI_4;
        execute_blt(&mut fb, &[cmd], &store, &clip);
        // The bounding box corners lie outside the rotated sprite.
        assert_eq!(fb.pixel(13, 13), Some(0));
        assert_eq!(fb.pixel(16, 16), Some(W));
    }
}

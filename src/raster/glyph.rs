//! Bitmap glyph blitting.
//!
//! Font sheets store a 4-bit mask per pixel instead of a color: bit 0 is
//! the glyph fill, bit 1 the outline ring, bit 2 the drop shadow, and bit 3
//! shadow-under-outline. Each pixel picks at most one of the supplied
//! colors; a zero mask never touches the framebuffer.

use crate::assets::Font;
use crate::transform::Clip;

use super::Framebuffer;

pub(crate) fn execute_txt(
    fb: &mut Framebuffer,
    font: &Font,
    text: &str,
    x: i32,
    y: i32,
    color: u32,
    outline: u32,
    shadow: u32,
    clip: &Clip,
) {
    if font.spacing_x == 0 && outline >> 28 != 0 && color >> 28 != 0 {
        // Script font with both fill and outline: draw outline and shadow
        // for the whole string first, then the fill, so glyph connectors
        // are not broken by a neighbor's outline.
        draw_pass(fb, font, text, x, y, 0, outline, shadow, clip);
        draw_pass(fb, font, text, x, y, color, 0, 0, clip);
    } else {
        draw_pass(fb, font, text, x, y, color, outline, shadow, clip);
    }
}

fn draw_pass(
    fb: &mut Framebuffer,
    font: &Font,
    text: &str,
    x: i32,
    y: i32,
    color: u32,
    outline: u32,
    shadow: u32,
    clip: &Clip,
) {
    let (_, cy1, _, cy2) = fb.clip_bounds(clip);
    let outline_on = outline >> 28 != 0;
    let mut x = x;

    for ch in text.chars() {
        // Unmapped characters fall back to the space glyph.
        let (glyph, blank) = match font.glyph(ch) {
            Some(g) => (g, ch == ' '),
            None => match font.glyph(' ') {
                Some(g) => (g, true),
                None => continue,
            },
        };

        x += glyph.pre;
        if !blank {
            // Glyph rows sit inside a character tile; shift the destination
            // down by the glyph's offset within its tile.
            let tile_y = (glyph.y1 / font.char_height) * font.char_height;
            let w = glyph.width();
            let h = glyph.height();
            let mut dst_y = y + glyph.y1 - tile_y + glyph.y_offset;
            for j in 0..h {
                if dst_y >= cy1 && dst_y <= cy2 {
                    for i in 0..w {
                        let bits = font.mask(glyph.x1 + i, glyph.y1 + j);
                        // Most font pixels are empty; test the whole nibble
                        // before decoding it.
                        if bits != 0 {
                            let v = if bits & 0x1 != 0 {
                                color
                            } else if outline_on {
                                if bits & 0x8 != 0 {
                                    shadow
                                } else if bits & 0x2 != 0 {
                                    outline
                                } else {
                                    0
                                }
                            } else if bits & 0x4 != 0 {
                                shadow
                            } else {
                                0
                            };
                            if v != 0 {
                                fb.pset((x + i) as f32, dst_y as f32, v, clip);
                            }
                        }
                    }
                }
                dst_y += 1;
            }
        }

        x += glyph.width() + font.spacing_x - font.border * 2 + glyph.post;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Glyph;
    use std::collections::HashMap;

    const FILL: u32 = 0xFF0000FF;
    const OUTLINE: u32 = 0xFF00FF00;
    const SHADOW: u32 = 0xFFFF0000;

    /// One glyph, 4 pixels wide, exercising each mask bit.
    fn mask_font() -> Font {
        let mut glyphs = HashMap::new();
        glyphs.insert('a', Glyph { x1: 0, y1: 0, x2: 3, y2: 0, pre: 0, post: 0, y_offset: 0 });
        glyphs.insert(' ', Glyph { x1: 0, y1: 0, x2: -1, y2: -1, pre: 0, post: 0, y_offset: 0 });
        let mut font = Font::new("mask", 4, 1, vec![0x1, 0x2, 0x4, 0x8], 1, 0, glyphs).unwrap();
        font.spacing_x = 1;
        font
    }

    #[test]
    fn mask_bits_select_colors_with_outline_on() {
        let mut fb = Framebuffer::with_size(8, 4);
        let clip = Clip::full_screen(8, 4);
        execute_txt(&mut fb, &mask_font(), "a", 0, 1, FILL, OUTLINE, SHADOW, &clip);
        assert_eq!(fb.pixel(0, 1), Some(FILL)); // bit 0
        assert_eq!(fb.pixel(1, 1), Some(OUTLINE)); // bit 1
        assert_eq!(fb.pixel(2, 1), Some(0)); // shadow-sans-outline suppressed
        assert_eq!(fb.pixel(3, 1), Some(SHADOW)); // bit 3: shadow under outline
    }

    #[test]
    fn mask_bits_select_colors_with_outline_off() {
        let mut fb = Framebuffer::with_size(8, 4);
        let clip = Clip::full_screen(8, 4);
        execute_txt(&mut fb, &mask_font(), "a", 0, 1, FILL, 0, SHADOW, &clip);
        assert_eq!(fb.pixel(0, 1), Some(FILL));
        assert_eq!(fb.pixel(1, 1), Some(0)); // outline pixel, no outline color
        assert_eq!(fb.pixel(2, 1), Some(SHADOW)); // plain shadow
        assert_eq!(fb.pixel(3, 1), Some(0)); // shadow+outline needs outline
    }

    #[test]
    fn unmapped_chars_advance_like_spaces() {
        let mut fb = Framebuffer::with_size(16, 4);
        let clip = Clip::full_screen(16, 4);
        // '?' is unmapped: it renders nothing but still advances.
        execute_txt(&mut fb, &mask_font(), "?a", 0, 1, FILL, 0, 0, &clip);
        assert_eq!(fb.pixel(0, 1), Some(0));
        // space glyph advance: width 0 + spacing 1.
        assert_eq!(fb.pixel(1, 1), Some(FILL));
    }
}

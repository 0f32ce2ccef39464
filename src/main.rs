//! Demo binary: drives the rendering core with a small animated scene and
//! presents frames in an SDL2 window.

use std::collections::HashMap;
use std::sync::Once;

use sdl2::keyboard::Keycode;

use glowbox::display::{Display, InputEvent, RenderTarget};
use glowbox::util::{FpsCounter, Rng};
use glowbox::{
    AssetStore, Color, CornerRectArgs, DiskArgs, Font, FontManifest, Framebuffer, Glyph, LineArgs,
    MapArgs, PolyArgs, RectArgs, RenderContext, Sprite, SpriteArgs, SpriteSheet, TextArgs,
    TileMap, TransformArgs, XAlign, YAlign, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;
static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Info);
    });
}

/// Parse command line arguments and return (window_scale, vsync)
fn parse_args() -> (u32, bool) {
    let args: Vec<String> = std::env::args().collect();
    let mut scale = 3;
    let mut vsync = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--no-vsync" => vsync = false,
            "--scale" | "-s" => {
                if i + 1 < args.len() {
                    if let Ok(s) = args[i + 1].parse::<u32>() {
                        scale = s.clamp(1, 8);
                    }
                    i += 1;
                }
            }
            "--help" => {
                println!("Usage: glowbox [OPTIONS]");
                println!();
                println!("Options:");
                println!("  --scale N, -s N   Window scale factor 1-8 (default: 3)");
                println!("  --no-vsync        Disable VSync for uncapped framerate");
                println!("  --help            Show this help message");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    (scale, vsync)
}

/// 3x5 bitmap glyphs for the FPS readout; bit 2 is the left column.
const TINY_GLYPHS: &[(char, [u8; 5])] = &[
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b111, 0b001, 0b111, 0b100, 0b111]),
    ('3', [0b111, 0b001, 0b111, 0b001, 0b111]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b111, 0b001, 0b111]),
    ('6', [0b111, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b010, 0b100, 0b100]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b111]),
    ('F', [0b111, 0b100, 0b110, 0b100, 0b100]),
    ('P', [0b110, 0b101, 0b110, 0b100, 0b100]),
    ('S', [0b011, 0b100, 0b010, 0b001, 0b110]),
    ('.', [0b000, 0b000, 0b000, 0b000, 0b010]),
];

/// Build a fill-only mask font from the bitmap table above.
fn build_tiny_font() -> Font {
    let count = TINY_GLYPHS.len() as u32;
    let width = count * 4;
    let height = 5;
    let mut data = vec![0u8; (width * height) as usize];
    let mut glyphs = HashMap::new();

    for (index, (ch, rows)) in TINY_GLYPHS.iter().enumerate() {
        let x0 = index as u32 * 4;
        for (y, row) in rows.iter().enumerate() {
            for x in 0..3u32 {
                if row & (0b100 >> x) != 0 {
                    data[(y as u32 * width + x0 + x) as usize] = 0x1;
                }
            }
        }
        glyphs.insert(
            ch.to_string(),
            Glyph {
                x1: x0 as i32,
                y1: 0,
                x2: x0 as i32 + 2,
                y2: 4,
                pre: 0,
                post: 0,
                y_offset: 0,
            },
        );
    }
    glyphs.insert(' '.to_string(), Glyph { x1: 0, y1: 0, x2: 1, y2: -1, pre: 0, post: 0, y_offset: 0 });

    let manifest = FontManifest {
        name: "tiny".into(),
        width,
        height,
        char_height: 5,
        baseline: 4,
        spacing_x: 1,
        spacing_y: 1,
        border: 0,
        glyphs,
    };
    Font::from_manifest(&manifest, data).expect("tiny font data is well formed")
}

/// Procedural sprite sheet: an orb with transparent corners and two
/// checker floor tiles.
fn build_sheet() -> SpriteSheet {
    use glowbox::assets::FrameManifest;

    const W: u32 = 32;
    const H: u32 = 16;
    let mut data = vec![0u32; (W * H) as usize];

    // Frame 0: 16x16 orb with a highlight, alpha falling off at the rim.
    for y in 0..16u32 {
        for x in 0..16u32 {
            let dx = x as f32 - 7.5;
            let dy = y as f32 - 7.5;
            let d = (dx * dx + dy * dy).sqrt();
            let color = if d < 7.5 {
                let shade = (1.0 - d / 9.0).clamp(0.0, 1.0);
                let a = ((7.5 - d) / 1.5).clamp(0.0, 1.0);
                Color::rgba(shade, shade * 0.6, 1.0 - shade * 0.5, a).pack()
            } else {
                0
            };
            data[(y * W + x) as usize] = color;
        }
    }

    // Frames 1-2: 8x8 checker floor tiles.
    for (shade, x0) in [(0.22f32, 16u32), (0.34f32, 24u32)] {
        for y in 0..8u32 {
            for x in 0..8u32 {
                let edge = x == 0 || y == 0;
                let v = if edge { shade + 0.1 } else { shade };
                data[(y * W + x0 + x) as usize] = Color::gray(v).pack();
            }
        }
    }

    let frames = vec![
        FrameManifest { x: 0, y: 0, width: 16, height: 16, flip_x: false, flip_y: false },
        FrameManifest { x: 16, y: 0, width: 8, height: 8, flip_x: false, flip_y: false },
        FrameManifest { x: 24, y: 0, width: 8, height: 8, flip_x: false, flip_y: false },
    ];
    SpriteSheet::new("demo", W, H, data, frames).expect("demo sheet data is well formed")
}

struct Orb {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    z: f32,
}

fn main() -> Result<(), String> {
    init_logger();
    let (scale, vsync) = parse_args();

    let (mut display, texture_creator) =
        Display::new("glowbox", DEFAULT_WIDTH, DEFAULT_HEIGHT, scale, vsync)?;
    let mut target = RenderTarget::new(&texture_creator, DEFAULT_WIDTH, DEFAULT_HEIGHT)?;
    let mut frame = Framebuffer::new();
    let mut ctx = RenderContext::new();

    let mut assets = AssetStore::new();
    let sheet = assets.add_sheet(build_sheet());
    let font = assets.add_font(build_tiny_font());

    // Screen-wide checker floor, wrapping in x so it can scroll forever.
    let floor_tiles = DEFAULT_WIDTH / 8;
    let mut floor = TileMap::new(sheet, floor_tiles, 4, 8, 8, 1);
    floor.wrap_x = true;
    for ty in 0..4 {
        for tx in 0..floor_tiles {
            floor.set_tile(0, tx, ty, Some(1 + ((tx + ty) % 2)));
        }
    }
    let floor_id = assets.add_map(floor).map_err(|e| e.to_string())?;
    let floor_span = (floor_tiles * 8) as f32;

    ctx.set_background(Color::rgb(0.06, 0.05, 0.12)).map_err(|e| e.to_string())?;

    let mut rng = Rng::new(0xB0B);
    let mut orbs: Vec<Orb> = (0..6)
        .map(|i| Orb {
            x: rng.range_f32(20.0, DEFAULT_WIDTH as f32 - 20.0),
            y: rng.range_f32(20.0, 120.0),
            vx: rng.range_f32(-60.0, 60.0),
            vy: rng.range_f32(-40.0, 40.0),
            z: i as f32,
        })
        .collect();

    let mut fps_counter = FpsCounter::new(60);
    let mut show_fps = true;
    let mut t = 0.0f32;
    let mut scroll = 0.0f32;

    log::info!("glowbox demo: Escape quits, F toggles the FPS readout");

    'main: loop {
        let (dt, avg_fps) = fps_counter.tick();
        let dt = dt.min(0.1);
        t += dt;
        scroll += dt * 24.0;

        for event in display.poll_events() {
            match event {
                InputEvent::Quit => break 'main,
                InputEvent::KeyDown(Keycode::Escape) => break 'main,
                InputEvent::KeyDown(Keycode::F) => show_fps = !show_fps,
                _ => {}
            }
        }

        let w = DEFAULT_WIDTH as f32;
        let h = DEFAULT_HEIGHT as f32;

        // Scrolling floor, drawn behind everything.
        let run = |ctx: &mut RenderContext| -> Result<(), glowbox::DrawError> {
            ctx.draw_map(
                &assets,
                floor_id,
                MapArgs { pos: (-(scroll % floor_span), h - 32.0), z: -10.0, ..Default::default() },
            )?;

            // Slowly turning rectangle behind the orbs.
            ctx.draw_rect(
                (w * 0.5, h * 0.45),
                (70.0, 46.0),
                RectArgs {
                    fill: Some(Color::hsva(t * 0.05, 0.5, 0.35, 0.8)),
                    outline: Some(Color::gray(0.9)),
                    angle: t * 0.7,
                    z: -5.0,
                },
            )?;

            // A pulsing disk and its ground shadow.
            let pulse = 14.0 + (t * 2.0).sin() * 4.0;
            ctx.draw_disk(
                (60.0, 70.0),
                pulse,
                DiskArgs {
                    fill: Some(Color::hsv(0.09, 0.85, 0.95)),
                    outline: Some(Color::gray(1.0)),
                    z: 2.0,
                },
            )?;
            ctx.draw_disk(
                (60.0, h - 28.0),
                pulse * 0.7,
                DiskArgs { fill: Some(Color::rgba(0.0, 0.0, 0.0, 0.4)), z: -8.0, ..Default::default() },
            )?;

            // A spinning pentagon drawn through the polygon path.
            let star: Vec<(f32, f32)> = (0..5)
                .map(|i| {
                    let a = i as f32 / 5.0 * std::f32::consts::TAU;
                    (a.cos() * 18.0, a.sin() * 18.0)
                })
                .collect();
            ctx.draw_poly(
                &star,
                PolyArgs {
                    fill: Some(Color::hsva(0.6, 0.7, 0.9, 0.75)),
                    outline: Some(Color::gray(1.0)),
                    pos: (w - 70.0, 60.0),
                    angle: -t,
                    ..Default::default()
                },
            )?;

            // Bouncing orbs; velocity direction picks the mirrored blit.
            for orb in &orbs {
                ctx.draw_sprite(
                    &assets,
                    Sprite::new(sheet, 0),
                    SpriteArgs {
                        pos: (orb.x, orb.y),
                        scale: (if orb.vx < 0.0 { -1.0 } else { 1.0 }, 1.0),
                        z: orb.z,
                        ..Default::default()
                    },
                )?;
            }

            // Scanline sweep drawn as open-ended segments.
            let sweep = (t * 0.8).sin() * 0.5 + 0.5;
            let y = sweep * (h - 40.0) + 8.0;
            ctx.draw_line(
                (8.0, y),
                (w * 0.5, y),
                Color::rgba(0.4, 1.0, 0.7, 0.5),
                LineArgs { z: 6.0, open_b: true, ..Default::default() },
            )?;
            ctx.draw_line(
                (w * 0.5, y),
                (w - 8.0, y),
                Color::rgba(0.4, 1.0, 0.7, 0.5),
                LineArgs { z: 6.0, ..Default::default() },
            )?;

            // Frame around the whole screen, clipped like any other draw.
            ctx.draw_corner_rect(
                (2.0, 2.0),
                (w - 4.0, h - 4.0),
                CornerRectArgs { outline: Some(Color::gray(0.35)), z: 8.0, ..Default::default() },
            )?;

            if show_fps {
                let text = format!("FPS {:.0}", avg_fps);
                // Scoped state: bob the readout a pixel without touching
                // the rest of the frame.
                let token = ctx.push();
                ctx.set_transform(TransformArgs {
                    pos: Some((0.0, (t * 4.0).sin().round())),
                    ..Default::default()
                })?;
                ctx.draw_text(
                    &assets,
                    font,
                    &text,
                    TextArgs {
                        pos: (5.0, 6.0),
                        color: Some(Color::hsv(0.16, 0.9, 1.0)),
                        shadow: Some(Color::rgba(0.0, 0.0, 0.0, 0.8)),
                        x_align: XAlign::Left,
                        y_align: YAlign::Top,
                        z: 10.0,
                        ..Default::default()
                    },
                )?;
                ctx.pop(token)?;
            }
            Ok(())
        };
        run(&mut ctx).map_err(|e| e.to_string())?;

        // Physics for the orbs, outside the draw pass.
        for orb in &mut orbs {
            orb.x += orb.vx * dt;
            orb.y += orb.vy * dt;
            if orb.x < 10.0 || orb.x > w - 10.0 {
                orb.vx = -orb.vx;
                orb.x = orb.x.clamp(10.0, w - 10.0);
            }
            if orb.y < 10.0 || orb.y > h - 30.0 {
                orb.vy = -orb.vy;
                orb.y = orb.y.clamp(10.0, h - 30.0);
            }
        }

        ctx.present(&assets, &mut frame).map_err(|e| e.to_string())?;
        display.present(&mut target, &frame)?;
    }

    log::info!(
        "exiting after {} frames, {:.1} ms average",
        ctx.frame_count(),
        fps_counter.avg_frame_time_ms()
    );
    Ok(())
}

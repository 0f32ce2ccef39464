//! SDL2 window presentation for the demo binary.
//!
//! This layer only ever receives a finished framebuffer: the core hands it
//! a completed frame, it uploads the pixels to a streaming texture and
//! presents. It never sees the command buffer.

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use crate::raster::Framebuffer;

pub struct Display {
    canvas: Canvas<Window>,
    event_pump: EventPump,
}

pub struct RenderTarget<'a> {
    texture: Texture<'a>,
}

#[derive(Debug, Clone)]
pub enum InputEvent {
    Quit,
    KeyDown(Keycode),
    KeyUp(Keycode),
}

impl Display {
    /// Create a window scaled up from the virtual screen resolution.
    /// vsync=true: locked to monitor refresh
    /// vsync=false: uncapped framerate for performance testing
    pub fn new(
        title: &str,
        screen_w: u32,
        screen_h: u32,
        window_scale: u32,
        vsync: bool,
    ) -> Result<(Self, TextureCreator<WindowContext>), String> {
        let sdl_context = sdl2::init()?;
        let video_subsystem = sdl_context.video()?;

        let window = video_subsystem
            .window(title, screen_w * window_scale, screen_h * window_scale)
            .position_centered()
            .build()
            .map_err(|e| e.to_string())?;

        let mut canvas_builder = window.into_canvas().accelerated();
        if vsync {
            canvas_builder = canvas_builder.present_vsync();
        }
        let canvas = canvas_builder.build().map_err(|e| e.to_string())?;

        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump()?;

        Ok((Self { canvas, event_pump }, texture_creator))
    }

    /// Upload a finished frame and present it, scaled to the window.
    pub fn present(
        &mut self,
        target: &mut RenderTarget,
        frame: &Framebuffer,
    ) -> Result<(), String> {
        target
            .texture
            .update(None, frame.as_bytes(), (frame.width() * 4) as usize)
            .map_err(|e| e.to_string())?;

        self.canvas.copy(&target.texture, None, None)?;
        self.canvas.present();
        Ok(())
    }

    pub fn poll_events(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => events.push(InputEvent::Quit),
                Event::KeyDown { keycode: Some(k), .. } => events.push(InputEvent::KeyDown(k)),
                Event::KeyUp { keycode: Some(k), .. } => events.push(InputEvent::KeyUp(k)),
                _ => {}
            }
        }
        events
    }
}

impl<'a> RenderTarget<'a> {
    /// Create a streaming texture matching the virtual screen resolution.
    /// Packed pixels are ABGR as a u32, which is R,G,B,A in memory on
    /// little-endian machines.
    pub fn new(
        texture_creator: &'a TextureCreator<WindowContext>,
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        let texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::ABGR8888, width, height)
            .map_err(|e| e.to_string())?;
        Ok(Self { texture })
    }
}

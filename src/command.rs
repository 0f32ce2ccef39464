//! Per-frame draw-command records.
//!
//! Draw calls never touch pixels directly; they append immutable records
//! here, and the whole list is z-sorted and dispatched once at frame end.
//! The buffer is an arena: cleared every frame, with the just-dispatched
//! list kept read-only for replay.

use crate::transform::Clip;

/// Tie-break nudge applied per record at enqueue time. Strictly increasing
/// in submission order, so a stable z sort needs no secondary key.
pub const Z_EPSILON: f32 = 0.000_976_562_5; // 2^-10

/// The closed set of rasterizer opcodes. Dispatch is an exhaustive match,
/// so an unknown opcode is unrepresentable rather than a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Pix,
    Lin,
    Cir,
    Rec,
    Ply,
    Blt,
    Txt,
    Map,
}

/// One pre-transformed point in a batched `Pix` record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixPoint {
    pub x: i32,
    pub y: i32,
    pub color: u32,
}

/// One sprite (or map tile) blit inside a batched `Blt`/`Map` record.
/// All geometry is screen space; colors are packed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteBlit {
    pub sheet: usize,
    pub corner_x: i32,
    pub corner_y: i32,
    pub size_x: i32,
    pub size_y: i32,
    pub has_alpha: bool,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub opacity: f32,
    /// Packed override color; 0 means none.
    pub override_color: u32,
    /// Multiply the sampled color by the override instead of blending it.
    pub multiply: bool,
}

/// Opcode-specific screen-space geometry and resolved colors.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOp {
    Pix {
        points: Vec<PixPoint>,
    },
    Lin {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: u32,
        open1: bool,
        open2: bool,
    },
    Cir {
        x: f32,
        y: f32,
        radius: f32,
        fill: u32,
        outline: u32,
    },
    Rec {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        fill: u32,
        outline: u32,
    },
    Ply {
        points: Vec<(f32, f32)>,
        fill: u32,
        outline: u32,
    },
    Blt {
        sprites: Vec<SpriteBlit>,
    },
    Txt {
        font: usize,
        text: String,
        x: i32,
        y: i32,
        color: u32,
        outline: u32,
        shadow: u32,
    },
    Map {
        sprites: Vec<SpriteBlit>,
    },
}

impl CommandOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            CommandOp::Pix { .. } => Opcode::Pix,
            CommandOp::Lin { .. } => Opcode::Lin,
            CommandOp::Cir { .. } => Opcode::Cir,
            CommandOp::Rec { .. } => Opcode::Rec,
            CommandOp::Ply { .. } => Opcode::Ply,
            CommandOp::Blt { .. } => Opcode::Blt,
            CommandOp::Txt { .. } => Opcode::Txt,
            CommandOp::Map { .. } => Opcode::Map,
        }
    }
}

/// An immutable draw record: sort key, pre-nudge depth (for batching),
/// the clip snapshot taken at submission, and the geometry.
#[derive(Debug, Clone)]
pub struct Command {
    pub z: f32,
    pub base_z: f32,
    pub clip: Clip,
    pub op: CommandOp,
}

/// Append-only list of records for the current frame, plus the previous
/// frame's list kept read-only for replay.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    previous: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a record, nudging its z by the submission index so that a
    /// stable sort preserves submission order among equal depths.
    pub fn push(&mut self, base_z: f32, z_sign: f32, clip: Clip, op: CommandOp) {
        let z = base_z + self.commands.len() as f32 * z_sign * Z_EPSILON;
        self.commands.push(Command { z, base_z, clip, op });
    }

    /// The most recent record, for point/sprite batching.
    pub(crate) fn last_mut(&mut self) -> Option<&mut Command> {
        self.commands.last_mut()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Painter's-algorithm order: ascending z, stable.
    pub fn sort(&mut self) {
        self.commands.sort_by(|a, b| a.z.total_cmp(&b.z));
    }

    /// Move the dispatched list into the previous-frame slot and start the
    /// next frame empty.
    pub fn retire(&mut self) {
        self.previous = std::mem::take(&mut self.commands);
    }

    pub fn previous(&self) -> &[Command] {
        &self.previous
    }

    /// Re-enqueue the previous frame's records verbatim.
    pub fn replay_previous(&mut self) {
        let replay = self.previous.clone();
        self.commands.extend(replay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Clip;

    fn clip() -> Clip {
        Clip::full_screen(64, 64)
    }

    fn point_op(color: u32) -> CommandOp {
        CommandOp::Pix { points: vec![PixPoint { x: 0, y: 0, color }] }
    }

    #[test]
    fn nudge_is_strictly_increasing() {
        let mut buf = CommandBuffer::new();
        for _ in 0..10 {
            buf.push(1.0, 1.0, clip(), point_op(1));
        }
        for pair in buf.commands().windows(2) {
            assert!(pair[0].z < pair[1].z);
        }
    }

    #[test]
    fn negative_z_scale_reverses_the_nudge() {
        let mut buf = CommandBuffer::new();
        buf.push(1.0, -1.0, clip(), point_op(1));
        buf.push(1.0, -1.0, clip(), point_op(2));
        assert!(buf.commands()[1].z < buf.commands()[0].z);
    }

    #[test]
    fn sort_keeps_submission_order_for_equal_depths() {
        let mut buf = CommandBuffer::new();
        for i in 0..5 {
            buf.push(2.0, 1.0, clip(), point_op(i));
        }
        buf.push(1.0, 1.0, clip(), point_op(99));
        buf.sort();
        // The z=1 record sorts first; the z=2 records keep submission order.
        assert!(matches!(&buf.commands()[0].op, CommandOp::Pix { points } if points[0].color == 99));
        for (i, cmd) in buf.commands()[1..].iter().enumerate() {
            assert!(matches!(&cmd.op, CommandOp::Pix { points } if points[0].color == i as u32));
        }
    }

    #[test]
    fn retire_and_replay() {
        let mut buf = CommandBuffer::new();
        buf.push(0.0, 1.0, clip(), point_op(7));
        buf.retire();
        assert!(buf.is_empty());
        assert_eq!(buf.previous().len(), 1);
        buf.replay_previous();
        assert_eq!(buf.len(), 1);
        assert!(matches!(&buf.commands()[0].op, CommandOp::Pix { points } if points[0].color == 7));
    }
}

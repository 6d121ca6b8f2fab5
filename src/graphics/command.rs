use crate::{
    foundation::core::{BlendMode, Filter, PixelRect, Rgba8, Rgba8Premul},
    foundation::error::{RestoreError, RestoreResult},
    graphics::device::{DrawCall, GraphicsDevice, RenderTarget, TextureId},
    graphics::vertices::{FLOATS_PER_VERTEX, QUAD_FLOATS, QUAD_INDICES},
    transform::color::ColorMatrix,
};

/// Everything about a draw that is not geometry. Two draws merge only when their materials are
/// equal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrawMaterial {
    pub color: ColorMatrix,
    pub tint: Option<Rgba8>,
    pub blend: BlendMode,
    pub filter: Filter,
}

/// A queued draw. Vertex and index data live in the queue's backing arrays; the command only
/// records how much of them it covers.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCommand {
    pub dst: RenderTarget,
    pub src: TextureId,
    /// Vertex floats covered.
    pub num_vertices: usize,
    pub num_indices: usize,
    pub material: DrawMaterial,
}

impl DrawCommand {
    fn can_merge(&self, dst: RenderTarget, src: TextureId, material: &DrawMaterial) -> bool {
        self.dst == dst && self.src == src && self.material == *material
    }
}

/// Closed set of queued GPU operations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Draw(DrawCommand),
    /// Pixels are an owned copy; the caller may reuse its buffer right away.
    Replace {
        target: TextureId,
        region: PixelRect,
        pixels: Vec<u8>,
    },
    /// Defines a freshly allocated surface as transparent black.
    Create {
        target: RenderTarget,
        width: u32,
        height: u32,
    },
    /// Sets the whole surface to one premultiplied color.
    Fill {
        target: RenderTarget,
        color: Rgba8Premul,
    },
    Dispose {
        target: RenderTarget,
    },
}

impl Command {
    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Draw(d) => d.num_vertices,
            _ => 0,
        }
    }

    pub fn num_indices(&self) -> usize {
        match self {
            Self::Draw(d) => d.num_indices,
            _ => 0,
        }
    }

    fn exec<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        index_offset_bytes: usize,
    ) -> RestoreResult<()> {
        match self {
            Self::Draw(d) => {
                if d.num_indices == 0 {
                    return Ok(());
                }
                device.draw_indexed(&DrawCall {
                    target: d.dst,
                    source: d.src,
                    index_offset_bytes,
                    index_count: d.num_indices,
                    color: &d.material.color,
                    blend: d.material.blend,
                    filter: d.material.filter,
                })
            }
            Self::Replace {
                target,
                region,
                pixels,
            } => {
                // Some mobile drivers drop sub-image uploads that race pending draws.
                device.flush();
                device.upload_sub_image(*target, *region, pixels)
            }
            Self::Create {
                target,
                width,
                height,
            } => match target {
                RenderTarget::Texture(t) => {
                    let region = PixelRect::full(*width, *height);
                    device.upload_sub_image(*t, region, &vec![0; region.byte_len()])
                }
                RenderTarget::Screen(_) => Ok(()),
            },
            Self::Fill { target, color } => device.clear_target(*target, *color),
            Self::Dispose { target } => {
                match target {
                    RenderTarget::Texture(t) => device.delete_texture(*t),
                    RenderTarget::Screen(f) => device.delete_framebuffer(*f),
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Accumulating,
    Flushing,
}

/// Counters for the most recent flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlushReport {
    pub commands: usize,
    pub chunks: usize,
    pub draw_calls: usize,
    pub indices: usize,
    pub largest_chunk_indices: usize,
}

/// Accumulates commands and flushes them in hardware-buffer-sized chunks.
#[derive(Debug)]
pub struct CommandQueue {
    commands: Vec<Command>,
    vertices: Vec<f32>,
    indices: Vec<u16>,
    /// Indices accumulated since the last buffer boundary.
    chunk_indices: usize,
    /// First vertex number for the next quad, relative to the last buffer boundary.
    next_index: usize,
    capacity: usize,
    state: QueueState,
    splits: u64,
}

impl CommandQueue {
    /// `capacity` is the hardware index buffer size, in indices.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity >= QUAD_INDICES.len(),
            "index buffer must hold at least one quad"
        );
        Self {
            commands: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            chunk_indices: 0,
            next_index: 0,
            capacity,
            state: QueueState::Idle,
            splits: 0,
        }
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffer boundaries forced since the queue was created.
    pub fn splits(&self) -> u64 {
        self.splits
    }

    pub fn enqueue(&mut self, command: Command) {
        debug_assert_ne!(self.state, QueueState::Flushing);
        if let Command::Draw(d) = &command {
            debug_assert_eq!(d.num_indices, 0, "use enqueue_draw for geometry");
        }
        self.commands.push(command);
        self.state = QueueState::Accumulating;
    }

    /// Enqueue one or more quads (a multiple of [`QUAD_FLOATS`] floats) drawn from `src` onto
    /// `dst`.
    pub fn enqueue_draw(
        &mut self,
        dst: RenderTarget,
        src: TextureId,
        vertices: &[f32],
        material: &DrawMaterial,
    ) -> RestoreResult<()> {
        if !vertices.len().is_multiple_of(QUAD_FLOATS) {
            return Err(RestoreError::invariant(format!(
                "draw vertex data must be whole quads, got {} floats",
                vertices.len()
            )));
        }
        for quad in vertices.chunks_exact(QUAD_FLOATS) {
            self.enqueue_quad(dst, src, quad, material);
        }
        Ok(())
    }

    fn enqueue_quad(
        &mut self,
        dst: RenderTarget,
        src: TextureId,
        quad: &[f32],
        material: &DrawMaterial,
    ) {
        debug_assert_ne!(self.state, QueueState::Flushing);
        let num_indices = QUAD_INDICES.len();

        let split = self.chunk_indices + num_indices > self.capacity;
        if split {
            self.chunk_indices = 0;
            self.next_index = 0;
            self.splits += 1;
        }

        self.vertices.extend_from_slice(quad);
        // Bounded by the capacity: at most 4 vertices per 6 indices.
        let base = self.next_index as u16;
        self.indices.extend(QUAD_INDICES.iter().map(|i| i + base));
        self.next_index += quad.len() / FLOATS_PER_VERTEX;
        self.chunk_indices += num_indices;

        self.state = QueueState::Accumulating;
        if !split
            && let Some(Command::Draw(last)) = self.commands.last_mut()
            && last.can_merge(dst, src, material)
        {
            last.num_vertices += quad.len();
            last.num_indices += num_indices;
            return;
        }
        self.commands.push(Command::Draw(DrawCommand {
            dst,
            src,
            num_vertices: quad.len(),
            num_indices,
            material: *material,
        }));
    }

    /// Execute every queued command in order, one hardware buffer at a time.
    ///
    /// The queue is empty afterwards even when a command fails.
    #[tracing::instrument(level = "trace", skip_all, fields(commands = self.commands.len()))]
    pub fn flush<D: GraphicsDevice + ?Sized>(&mut self, device: &mut D) -> RestoreResult<FlushReport> {
        if self.commands.is_empty() {
            self.reset();
            return Ok(FlushReport::default());
        }
        self.state = QueueState::Flushing;
        let result = self.flush_chunks(device);
        self.reset();
        result
    }

    fn flush_chunks<D: GraphicsDevice + ?Sized>(&self, device: &mut D) -> RestoreResult<FlushReport> {
        let mut report = FlushReport {
            commands: self.commands.len(),
            ..FlushReport::default()
        };
        let mut next = 0;
        let mut vertex_offset = 0;
        let mut index_offset = 0;

        while next < self.commands.len() {
            let mut nv = 0;
            let mut ne = 0;
            let mut nc = 0;
            for c in &self.commands[next..] {
                let n = c.num_indices();
                if n > self.capacity {
                    return Err(RestoreError::invariant(format!(
                        "command with {n} indices exceeds index buffer capacity {}",
                        self.capacity
                    )));
                }
                if ne + n > self.capacity {
                    break;
                }
                nv += c.num_vertices();
                ne += n;
                nc += 1;
            }

            if ne > 0 {
                device.upload_buffers(
                    &self.vertices[vertex_offset..vertex_offset + nv],
                    &self.indices[index_offset..index_offset + ne],
                )?;
            }
            vertex_offset += nv;
            index_offset += ne;

            let mut index_offset_bytes = 0;
            for c in &self.commands[next..next + nc] {
                c.exec(device, index_offset_bytes)?;
                if c.num_indices() > 0 {
                    report.draw_calls += 1;
                }
                index_offset_bytes += c.num_indices() * std::mem::size_of::<u16>();
            }
            if nc > 0 {
                // Without this some mobile drivers visibly flicker.
                device.flush();
            }

            report.chunks += 1;
            report.indices += ne;
            report.largest_chunk_indices = report.largest_chunk_indices.max(ne);
            next += nc;
        }

        if report.chunks > 2 {
            tracing::warn!(chunks = report.chunks, "flush spanned many index buffers");
        }
        Ok(report)
    }

    /// Drop every pending command without executing it.
    ///
    /// Used after a context loss, when queued handles point at resources that no longer exist.
    pub fn discard(&mut self) -> usize {
        let dropped = self.commands.len();
        self.reset();
        dropped
    }

    fn reset(&mut self) {
        self.commands.clear();
        self.vertices.clear();
        self.indices.clear();
        self.chunk_indices = 0;
        self.next_index = 0;
        self.state = QueueState::Idle;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graphics/command.rs"]
mod tests;

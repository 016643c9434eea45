//! In-memory GPU backend.
//!
//! Keeps buffer contents in host memory, counts every allocation and
//! deletion, and resolves each draw into the per-vertex attribute stream the
//! vertex stage would see. Generation failures and a memory budget can be
//! injected to exercise error paths.

use std::collections::{BTreeMap, HashMap};

use cubefield_mesh::CubeVertex;

use crate::gpu::{
    BufferHandle, BufferTarget, DrawCall, FrameUniforms, GpuBufferApi, GpuError, Primitive,
    Program, ProgramAttributes, VertexSource,
};

/// One draw after attribute fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedDraw {
    pub primitive: Primitive,
    /// Vertices fetched, after index expansion.
    pub vertex_count: usize,
    /// Flattened floats per attribute location.
    pub attributes: BTreeMap<u32, Vec<f32>>,
    pub indexed: bool,
}

impl ResolvedDraw {
    /// Decode the stream as cube vertices using `program`'s locations.
    /// Missing attributes decode as zero.
    pub fn cube_vertices(&self, program: &ProgramAttributes) -> Vec<CubeVertex> {
        let fetch = |location: Option<u32>, i: usize, n: usize| -> Vec<f32> {
            location
                .and_then(|l| self.attributes.get(&l))
                .and_then(|data| data.get(i * n..i * n + n))
                .map(<[f32]>::to_vec)
                .unwrap_or_else(|| vec![0.0; n])
        };
        (0..self.vertex_count)
            .map(|i| {
                let p = fetch(Some(program.position), i, 3);
                let n = fetch(program.normal, i, 3);
                let t = fetch(program.texture_coordinate, i, 2);
                CubeVertex {
                    position: [p[0], p[1], p[2]],
                    normal: [n[0], n[1], n[2]],
                    uv: [t[0], t[1]],
                }
            })
            .collect()
    }
}

#[derive(Debug)]
struct StoredBuffer {
    target: Option<BufferTarget>,
    data: Vec<u8>,
}

/// Test double implementing [`GpuBufferApi`] without a device.
#[derive(Debug)]
pub struct HeadlessGpu {
    buffers: HashMap<BufferHandle, StoredBuffer>,
    next_handle: u32,
    gen_count: usize,
    failed_gen_count: usize,
    delete_count: usize,
    invalid_delete_count: usize,
    /// Successful generations left before the next injected failure.
    fail_gen_in: Option<usize>,
    memory_budget: Option<usize>,
    program: Option<Program>,
    program_attributes: HashMap<Program, ProgramAttributes>,
    uniforms: Option<FrameUniforms>,
    frame_draws: Vec<ResolvedDraw>,
    frames: u64,
    total_draws: u64,
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessGpu {
    pub fn new() -> Self {
        let program_attributes = [Program::Cubes, Program::HeightMap]
            .into_iter()
            .map(|p| (p, ProgramAttributes::for_program(p)))
            .collect();
        Self {
            buffers: HashMap::new(),
            next_handle: 1,
            gen_count: 0,
            failed_gen_count: 0,
            delete_count: 0,
            invalid_delete_count: 0,
            fail_gen_in: None,
            memory_budget: None,
            program: None,
            program_attributes,
            uniforms: None,
            frame_draws: Vec::new(),
            frames: 0,
            total_draws: 0,
        }
    }

    /// Make one buffer generation fail after `successes` more succeed.
    pub fn fail_gen_after(&mut self, successes: usize) {
        self.fail_gen_in = Some(successes);
    }

    /// Cap total live buffer bytes. Uploads past the cap fail with
    /// [`GpuError::OutOfMemory`].
    pub fn set_memory_budget(&mut self, bytes: Option<usize>) {
        self.memory_budget = bytes;
    }

    /// Override the attribute locations reported for `program`.
    pub fn set_program_attributes(&mut self, program: Program, attributes: ProgramAttributes) {
        self.program_attributes.insert(program, attributes);
    }

    pub fn program(&self) -> Option<Program> {
        self.program
    }

    /// Successful buffer generations.
    pub fn gen_count(&self) -> usize {
        self.gen_count
    }

    pub fn failed_gen_count(&self) -> usize {
        self.failed_gen_count
    }

    /// Buffers actually deleted.
    pub fn delete_count(&self) -> usize {
        self.delete_count
    }

    /// Deletions of handles that were not live.
    pub fn invalid_delete_count(&self) -> usize {
        self.invalid_delete_count
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.buffers.values().map(|b| b.data.len()).sum()
    }

    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.buffers.contains_key(&handle)
    }

    pub fn buffer_target(&self, handle: BufferHandle) -> Option<BufferTarget> {
        self.buffers.get(&handle).and_then(|b| b.target)
    }

    pub fn uniforms(&self) -> Option<&FrameUniforms> {
        self.uniforms.as_ref()
    }

    /// Draws since the last [`GpuBufferApi::begin_frame`].
    pub fn frame_draws(&self) -> &[ResolvedDraw] {
        &self.frame_draws
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total_draws(&self) -> u64 {
        self.total_draws
    }

    fn source_bytes<'a>(&'a self, source: &VertexSource<'a>) -> Result<&'a [u8], GpuError> {
        match source {
            VertexSource::Host(floats) => Ok(bytemuck::cast_slice(floats)),
            VertexSource::Buffer(handle) => self
                .buffers
                .get(handle)
                .map(|b| b.data.as_slice())
                .ok_or(GpuError::UnknownBuffer(*handle)),
        }
    }

    fn vertex_indices(&self, call: &DrawCall<'_>) -> Result<Vec<usize>, GpuError> {
        let Some(handle) = call.indices else {
            return Ok((0..call.count as usize).collect());
        };
        let buffer = self
            .buffers
            .get(&handle)
            .ok_or(GpuError::UnknownBuffer(handle))?;
        let needed = call.count as usize * std::mem::size_of::<u16>();
        let bytes = buffer
            .data
            .get(..needed)
            .ok_or(GpuError::EmptyBuffer(handle))?;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| usize::from(u16::from_ne_bytes([pair[0], pair[1]])))
            .collect())
    }
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    bytes
        .get(at..at + 4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0.0)
}

impl GpuBufferApi for HeadlessGpu {
    fn gen_buffer(&mut self) -> Option<BufferHandle> {
        if let Some(remaining) = self.fail_gen_in {
            if remaining == 0 {
                self.fail_gen_in = None;
                self.failed_gen_count += 1;
                log::debug!("Injected buffer generation failure");
                return None;
            }
            self.fail_gen_in = Some(remaining - 1);
        }

        let handle = BufferHandle::new(self.next_handle)?;
        self.next_handle = self.next_handle.checked_add(1)?;
        self.buffers.insert(
            handle,
            StoredBuffer {
                target: None,
                data: Vec::new(),
            },
        );
        self.gen_count += 1;
        Some(handle)
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        handle: BufferHandle,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let live = self.live_bytes();
        let buffer = self
            .buffers
            .get_mut(&handle)
            .ok_or(GpuError::UnknownBuffer(handle))?;

        if let Some(budget) = self.memory_budget {
            let after = live - buffer.data.len() + data.len();
            if after > budget {
                return Err(GpuError::OutOfMemory {
                    requested: data.len() as u64,
                    available: budget.saturating_sub(live - buffer.data.len()) as u64,
                });
            }
        }

        buffer.target = Some(target);
        buffer.data.clear();
        buffer.data.extend_from_slice(data);
        Ok(())
    }

    fn delete_buffers(&mut self, handles: &[BufferHandle]) {
        for handle in handles {
            if self.buffers.remove(handle).is_some() {
                self.delete_count += 1;
            } else {
                self.invalid_delete_count += 1;
                log::warn!("Deleting buffer {handle} that is not live");
            }
        }
    }

    fn use_program(&mut self, program: Option<Program>) {
        self.program = program;
    }

    fn attribute_locations(&self) -> Option<ProgramAttributes> {
        self.program
            .and_then(|p| self.program_attributes.get(&p))
            .copied()
    }

    fn set_frame_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.uniforms = Some(*uniforms);
    }

    fn begin_frame(&mut self) {
        self.frame_draws.clear();
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), GpuError> {
        if self.program.is_none() {
            return Err(GpuError::NoProgram);
        }
        let indices = self.vertex_indices(call)?;

        let mut attributes = BTreeMap::new();
        for binding in call.attributes {
            let bytes = self.source_bytes(&binding.source)?;
            let stride = binding.effective_stride() as usize;
            let components = binding.components as usize;
            let mut stream = Vec::with_capacity(indices.len() * components);
            for &vertex in &indices {
                let base = binding.offset as usize + vertex * stride;
                for c in 0..components {
                    stream.push(read_f32(bytes, base + c * 4));
                }
            }
            attributes.insert(binding.location, stream);
        }

        self.frame_draws.push(ResolvedDraw {
            primitive: call.primitive,
            vertex_count: indices.len(),
            attributes,
            indexed: call.indices.is_some(),
        });
        self.total_draws += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::AttributeBinding;

    #[test]
    fn test_handles_are_unique_and_counted() {
        let mut gpu = HeadlessGpu::new();
        let a = gpu.gen_buffer().unwrap();
        let b = gpu.gen_buffer().unwrap();
        assert_ne!(a, b);
        assert_eq!(gpu.gen_count(), 2);
        gpu.delete_buffers(&[a, b]);
        assert_eq!(gpu.delete_count(), 2);
        assert_eq!(gpu.live_buffer_count(), 0);
    }

    #[test]
    fn test_double_delete_is_detected() {
        let mut gpu = HeadlessGpu::new();
        let a = gpu.gen_buffer().unwrap();
        gpu.delete_buffers(&[a]);
        gpu.delete_buffers(&[a]);
        assert_eq!(gpu.delete_count(), 1);
        assert_eq!(gpu.invalid_delete_count(), 1);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut gpu = HeadlessGpu::new();
        gpu.fail_gen_after(1);
        assert!(gpu.gen_buffer().is_some());
        assert!(gpu.gen_buffer().is_none());
        assert!(gpu.gen_buffer().is_some());
        assert_eq!(gpu.failed_gen_count(), 1);
    }

    #[test]
    fn test_memory_budget_replaces_existing_contents() {
        let mut gpu = HeadlessGpu::new();
        gpu.set_memory_budget(Some(16));
        let a = gpu.gen_buffer().unwrap();
        gpu.buffer_data(BufferTarget::Array, a, &[0; 16]).unwrap();
        // Replacing the same buffer stays within budget.
        gpu.buffer_data(BufferTarget::Array, a, &[1; 12]).unwrap();
        let b = gpu.gen_buffer().unwrap();
        let err = gpu.buffer_data(BufferTarget::Array, b, &[0; 8]).unwrap_err();
        assert!(matches!(
            err,
            GpuError::OutOfMemory {
                requested: 8,
                available: 4
            }
        ));
    }

    #[test]
    fn test_indexed_strided_fetch() {
        let mut gpu = HeadlessGpu::new();
        gpu.use_program(Some(Program::HeightMap));
        // Two interleaved records of [x, y].
        let vertices: [f32; 4] = [1.0, 2.0, 3.0, 4.0];
        let vbo = gpu.gen_buffer().unwrap();
        gpu.buffer_data(BufferTarget::Array, vbo, bytemuck::cast_slice(&vertices))
            .unwrap();
        let ibo = gpu.gen_buffer().unwrap();
        let indices: [u16; 3] = [1, 0, 1];
        gpu.buffer_data(
            BufferTarget::ElementArray,
            ibo,
            bytemuck::cast_slice(&indices),
        )
        .unwrap();

        let bindings = [AttributeBinding {
            location: 0,
            components: 1,
            stride: 8,
            offset: 4,
            source: VertexSource::Buffer(vbo),
        }];
        gpu.draw(&DrawCall {
            primitive: Primitive::TriangleStrip,
            attributes: &bindings,
            count: 3,
            indices: Some(ibo),
        })
        .unwrap();

        let draw = &gpu.frame_draws()[0];
        assert!(draw.indexed);
        assert_eq!(draw.attributes[&0], vec![4.0, 2.0, 4.0]);
    }

    #[test]
    fn test_draw_requires_program() {
        let mut gpu = HeadlessGpu::new();
        let result = gpu.draw(&DrawCall {
            primitive: Primitive::Triangles,
            attributes: &[],
            count: 0,
            indices: None,
        });
        assert!(matches!(result, Err(GpuError::NoProgram)));
    }

    #[test]
    fn test_unknown_buffer_in_draw() {
        let mut gpu = HeadlessGpu::new();
        gpu.use_program(Some(Program::Cubes));
        let handle = gpu.gen_buffer().unwrap();
        gpu.delete_buffers(&[handle]);
        let bindings = [AttributeBinding {
            location: 0,
            components: 3,
            stride: 0,
            offset: 0,
            source: VertexSource::Buffer(handle),
        }];
        let result = gpu.draw(&DrawCall {
            primitive: Primitive::Triangles,
            attributes: &bindings,
            count: 3,
            indices: None,
        });
        assert!(matches!(result, Err(GpuError::UnknownBuffer(h)) if h == handle));
    }
}

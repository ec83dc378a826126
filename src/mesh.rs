// mesh.rs — sphere and cube geometry, generated once and uploaded once

use crate::face::CubeFace;
use std::f32::consts::{FRAC_PI_2, PI};
use wgpu::util::DeviceExt;

/// Reference density: 32 stacks by 64 sectors.
pub const SPHERE_STACKS: usize = 32;
pub const SPHERE_SECTORS: usize = 64;

const SNAP_EPSILON: f32 = 1e-5;

/// Unindexed triangle list covering the unit sphere.
#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
}

impl SphereMesh {
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }
}

fn snap(p: [f32; 3]) -> [f32; 3] {
    p.map(|c| if c.abs() <= SNAP_EPSILON { 0.0 } else { c })
}

fn on_sphere(azimuth: f32, elevation: f32) -> [f32; 3] {
    snap([
        azimuth.cos() * elevation.cos(),
        elevation.sin(),
        -azimuth.sin() * elevation.cos(),
    ])
}

/// Samples the sphere cell by cell. Image u follows azimuth (mirrored, since
/// the sphere is seen from inside), image v runs from the north pole down.
pub fn build_sphere(stacks: usize, sectors: usize) -> SphereMesh {
    let cells = stacks * sectors;
    let mut positions = Vec::with_capacity(cells * 6);
    let mut uvs = Vec::with_capacity(cells * 6);

    let di = 1.0 / sectors as f32;
    let dj = 1.0 / stacks as f32;
    let du = di * 2.0 * PI;
    let dv = dj * PI;

    for sector in 0..sectors {
        let i = sector as f32 * di;
        // rotated a quarter turn so azimuth 0 points north
        let u = i * 2.0 * PI + FRAC_PI_2;

        for stack in 0..stacks {
            let j = stack as f32 * dj;
            let v = FRAC_PI_2 - j * PI;

            let bl = on_sphere(u, v - dv);
            let br = on_sphere(u + du, v - dv);
            let tr = on_sphere(u + du, v);
            let tl = on_sphere(u, v);

            let tex_bl = [1.0 - i, j + dj];
            let tex_br = [1.0 - i - di, j + dj];
            let tex_tr = [1.0 - i - di, j];
            let tex_tl = [1.0 - i, j];

            positions.extend_from_slice(&[bl, tl, tr, bl, tr, br]);
            uvs.extend_from_slice(&[tex_bl, tex_tl, tex_tr, tex_bl, tex_tr, tex_br]);
        }
    }

    SphereMesh { positions, uvs }
}

const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-1.0, 1.0, 1.0], // front
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, -1.0], // back
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
];

/// Corner indices of each face, in `CubeFace` order.
const CUBE_FACE_CORNERS: [[usize; 4]; CubeFace::COUNT] = [
    [3, 2, 6, 7], // +X
    [4, 0, 3, 7], // +Y
    [0, 1, 2, 3], // +Z
    [4, 5, 1, 0], // -X
    [1, 5, 6, 2], // -Y
    [7, 6, 5, 4], // -Z
];

// x inverted, faces are seen from inside
const CUBE_FACE_UVS: [[f32; 2]; 4] = [[1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];

/// Fan of two triangles over a face's four vertices.
pub const FAN_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// 24 vertices: four per face, faces stored contiguously in `CubeFace` order.
#[derive(Debug, Clone)]
pub struct CubeMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
}

impl CubeMesh {
    pub const VERTICES_PER_FACE: usize = 4;

    pub fn face_base_vertex(face: CubeFace) -> i32 {
        (face.index() * Self::VERTICES_PER_FACE) as i32
    }

    pub fn face_positions(&self, face: CubeFace) -> &[[f32; 3]] {
        let start = face.index() * Self::VERTICES_PER_FACE;
        &self.positions[start..start + Self::VERTICES_PER_FACE]
    }
}

pub fn build_cube(scale: f32) -> CubeMesh {
    let mut positions = Vec::with_capacity(CubeFace::COUNT * 4);
    let mut uvs = Vec::with_capacity(CubeFace::COUNT * 4);
    for corners in CUBE_FACE_CORNERS {
        for (k, corner) in corners.into_iter().enumerate() {
            positions.push(CUBE_CORNERS[corner].map(|c| c * scale));
            uvs.push(CUBE_FACE_UVS[k]);
        }
    }
    CubeMesh { positions, uvs }
}

/// Vertex layout shared by both primitives: positions in slot 0, uvs in
/// slot 1, each in its own tightly packed buffer.
pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    const UV: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];
    [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION,
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &UV,
        },
    ]
}

struct MeshBuffers {
    positions: wgpu::Buffer,
    uvs: wgpu::Buffer,
}

impl MeshBuffers {
    fn new(device: &wgpu::Device, label: &str, positions: &[[f32; 3]], uvs: &[[f32; 2]]) -> Self {
        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} positions")),
            contents: bytemuck::cast_slice(positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uvs = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} uvs")),
            contents: bytemuck::cast_slice(uvs),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self { positions, uvs }
    }

    fn bind<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_vertex_buffer(0, self.positions.slice(..));
        pass.set_vertex_buffer(1, self.uvs.slice(..));
    }
}

/// Sphere mesh plus its GPU buffers, created on the first `init`.
pub struct SphereGeometry {
    mesh: SphereMesh,
    buffers: Option<MeshBuffers>,
}

impl SphereGeometry {
    pub fn new() -> Self {
        Self {
            mesh: build_sphere(SPHERE_STACKS, SPHERE_SECTORS),
            buffers: None,
        }
    }

    /// Creates the GPU buffers on the first call. Returns whether this call
    /// created them.
    pub fn init(&mut self, device: &wgpu::Device) -> bool {
        if self.buffers.is_some() {
            return false;
        }
        self.buffers = Some(MeshBuffers::new(
            device,
            "sphere",
            &self.mesh.positions,
            &self.mesh.uvs,
        ));
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.buffers.is_some()
    }

    /// Assumes pipeline and bind groups are already set.
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        let Some(buffers) = &self.buffers else {
            return;
        };
        buffers.bind(pass);
        pass.draw(0..self.mesh.vertex_count(), 0..1);
    }
}

impl Default for SphereGeometry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cube mesh plus its GPU buffers. Faces are drawn one at a time so each can
/// carry its own texture.
pub struct CubeGeometry {
    mesh: CubeMesh,
    buffers: Option<(MeshBuffers, wgpu::Buffer)>,
}

impl CubeGeometry {
    pub fn new() -> Self {
        Self {
            mesh: build_cube(1.0),
            buffers: None,
        }
    }

    /// Same contract as `SphereGeometry::init`.
    pub fn init(&mut self, device: &wgpu::Device) -> bool {
        if self.buffers.is_some() {
            return false;
        }
        let vertices = MeshBuffers::new(device, "cube", &self.mesh.positions, &self.mesh.uvs);
        let fan = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cube face fan"),
            contents: bytemuck::cast_slice(&FAN_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.buffers = Some((vertices, fan));
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.buffers.is_some()
    }

    /// Binds the shared vertex and index buffers; call once per pass.
    pub fn bind<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        if let Some((vertices, fan)) = &self.buffers {
            vertices.bind(pass);
            pass.set_index_buffer(fan.slice(..), wgpu::IndexFormat::Uint16);
        }
    }

    /// Assumes `bind` was called and the face's texture is bound.
    pub fn draw_face(&self, pass: &mut wgpu::RenderPass<'_>, face: CubeFace) {
        if self.buffers.is_none() {
            return;
        }
        pass.draw_indexed(
            0..FAN_INDICES.len() as u32,
            CubeMesh::face_base_vertex(face),
            0..1,
        );
    }
}

impl Default for CubeGeometry {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;

        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    pub fn new_with_tex(coord: &[f32; 2], tex_coord: &[f32; 2]) -> Self {
        Self {
            position: *coord,
            tex_coord: *tex_coord,
        }
    }

    pub fn x(&self) -> f32 {
        self.position[0]
    }

    pub fn y(&self) -> f32 {
        self.position[1]
    }

    /*
     * Unit quad as a 4 vertex triangle strip, shared by the background and
     * every overlay draw. Texture u runs right to left so the camera image
     * reads like a mirror; v runs top to bottom since images are stored
     * top row first.
     */
    pub fn quad() -> [Self; 4] {
        [
            Self::new_with_tex(&[-1., -1.], &[1., 1.]),
            Self::new_with_tex(&[1., -1.], &[0., 1.]),
            Self::new_with_tex(&[-1., 1.], &[1., 0.]),
            Self::new_with_tex(&[1., 1.], &[0., 0.]),
        ]
    }
}

pub mod gpu;
pub mod matrix;
pub mod recorder;
pub mod renderer;
pub mod screen;
pub mod surface;
pub mod texture;
pub mod util;
pub mod vertex;

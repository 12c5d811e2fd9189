pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod imggpu;
pub mod pipeline;
pub mod shapes;
pub mod transform;

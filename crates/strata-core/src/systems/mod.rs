pub mod assets;
pub mod layers;
pub mod renderer;

pub use layers::{DrawingCtx, RenderStats};
pub use renderer::draw_node;

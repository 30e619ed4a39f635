pub mod canvas;
pub mod markers;
pub mod window;

pub use canvas::OverlayCanvas;
pub use markers::{draw_markers, ViewRect};
pub use window::CoachWindow;

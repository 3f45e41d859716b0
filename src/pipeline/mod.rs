//! Pipeline stages and the kanban board controller.

pub mod board;
pub mod stage;

pub use board::{DragState, DropOutcome, PipelineBoard, StageColumn};
pub use stage::Stage;

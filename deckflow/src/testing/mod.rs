//! Scripted fakes for exercising the orchestration core without any
//! external generative service.

mod mocks;

pub use mocks::{FailingStage, ScriptedService, ScriptedStage, StaticStage};

pub mod dispatch;
pub mod evaluator;
pub mod loop_impl;
pub mod prompt;

pub use dispatch::{
    RECORD_UNKNOWN_QUESTION, RECORD_USER_DETAILS, Tool, ToolError, ToolRegistry,
};
pub use evaluator::Evaluation;
pub use loop_impl::{ChatConfig, ChatError, ChatEvent, Chatbot, Stage};
pub use prompt::{PromptMode, build_system_prompt};

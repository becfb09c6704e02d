pub mod batch;
pub mod llm;
pub mod paragraph;
pub mod pdf;
pub mod profile;
pub mod workflow;

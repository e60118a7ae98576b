pub mod archive;
pub mod catalog;
pub mod compress;
pub mod constants;
pub mod dataset;
pub mod display;
pub mod env_state;
pub mod interpreter;
pub mod manifest;
pub mod pipeline;
pub mod queue;
pub mod settings;
pub mod time;
pub mod tools;
pub mod xtipipe;
pub mod xtipipe_errors;

//! Built-in tools for Johnathan.
//!
//! Each tool implements `johnathan_core::Tool` and is registered by name in
//! a [`ToolRegistry`]. [`default_registry`] wires up everything this crate
//! ships.

pub mod file_read;
pub mod get_time;

pub use file_read::ReadFileTool;
pub use get_time::GetTimeTool;

use johnathan_core::ToolRegistry;

/// Create a registry containing the built-in tools, in a stable order.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(GetTimeTool::new());
    registry.register(ReadFileTool::new());
    registry
}

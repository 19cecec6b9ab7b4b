//! OpenCL offload backend.
//!
//! Provides:
//! - Runtime-loaded OpenCL entry points (no build-time OpenCL dependency)
//! - The `ClDriver` seam and its system implementation
//! - Accelerator lifecycle (`AcceleratorRuntime`)
//! - Scoped device buffers and completion events
//! - GEMM dispatch with host fallback

pub mod ffi;
pub mod driver;
pub mod runtime;
pub mod memory;
pub mod dispatch;

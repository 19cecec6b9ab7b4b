//! # clgemm
//!
//! Offload of single-precision GEMM (`C := alpha·A·B + C`, no-transpose,
//! row-major) to an OpenCL accelerator running a precompiled kernel image,
//! with a transparent host fallback when the accelerator is not initialised.
//!
//! Provides:
//! - `AcceleratorRuntime`: explicit, idempotent init/deinit of device, context,
//!   program, command queue and kernel
//! - `dispatch` / `gemm_nn`: per-call buffer, launch and read-back choreography
//! - `host::gemm_nn`: the host path
//! - `global`: a process-wide default runtime that aborts on error

pub mod error;
pub mod matrix;
pub mod host;
pub mod config;
pub mod opencl;
pub mod global;

pub use config::{DeviceType, RuntimeConfig};
pub use error::{ClResult, ClStatus, GemmError, OrAbort};
pub use matrix::{GemmDims, MatrixView, MatrixViewMut};
pub use opencl::dispatch::{dispatch, gemm_nn, DispatchPath};
pub use opencl::driver::{is_opencl_available, ClDriver, KernelArg, MemAccess, OpenCl};
pub use opencl::runtime::{AcceleratorContext, AcceleratorRuntime, RuntimeState};

pub type Result<T> = std::result::Result<T, GemmError>;

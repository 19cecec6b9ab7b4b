//! OpenCL status reporting and the crate error type.
//!
//! Every accelerator call returns a raw `cl_int` status. Non-success codes are
//! wrapped in [`ClStatus`], which knows the symbolic name of the code, and are
//! lifted into [`GemmError`] together with the step that failed. Library APIs
//! return these errors; the outermost call sites (the `global` module and the
//! CLI) terminate the process through [`abort_on_error`].

use std::fmt;
use std::path::PathBuf;

/// A non-success status code returned by an OpenCL entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClStatus(pub i32);

/// Result of a raw accelerator call.
pub type ClResult<T> = Result<T, ClStatus>;

impl ClStatus {
    pub const SUCCESS: i32 = 0;
    pub const DEVICE_NOT_FOUND: ClStatus = ClStatus(-1);
    pub const BUILD_PROGRAM_FAILURE: ClStatus = ClStatus(-11);
    pub const INVALID_VALUE: ClStatus = ClStatus(-30);
    pub const INVALID_KERNEL_NAME: ClStatus = ClStatus(-46);
    pub const INVALID_ARG_INDEX: ClStatus = ClStatus(-49);
    pub const OUT_OF_RESOURCES: ClStatus = ClStatus(-5);
    pub const PLATFORM_NOT_FOUND: ClStatus = ClStatus(-1001);

    /// Convert a raw status into `Ok(())` or the corresponding error.
    pub fn check(code: i32) -> ClResult<()> {
        if code == Self::SUCCESS {
            Ok(())
        } else {
            Err(ClStatus(code))
        }
    }

    /// Raw status code.
    pub fn code(&self) -> i32 {
        self.0
    }

    /// Symbolic OpenCL name of the status code.
    pub fn name(&self) -> &'static str {
        status_name(self.0)
    }
}

impl fmt::Display for ClStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Map an OpenCL status code to its symbolic name.
pub fn status_name(code: i32) -> &'static str {
    match code {
        0 => "CL_SUCCESS",
        -1 => "CL_DEVICE_NOT_FOUND",
        -2 => "CL_DEVICE_NOT_AVAILABLE",
        -3 => "CL_COMPILER_NOT_AVAILABLE",
        -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
        -5 => "CL_OUT_OF_RESOURCES",
        -6 => "CL_OUT_OF_HOST_MEMORY",
        -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
        -8 => "CL_MEM_COPY_OVERLAP",
        -9 => "CL_IMAGE_FORMAT_MISMATCH",
        -10 => "CL_IMAGE_FORMAT_NOT_SUPPORTED",
        -11 => "CL_BUILD_PROGRAM_FAILURE",
        -12 => "CL_MAP_FAILURE",
        -13 => "CL_MISALIGNED_SUB_BUFFER_OFFSET",
        -14 => "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
        -15 => "CL_COMPILE_PROGRAM_FAILURE",
        -16 => "CL_LINKER_NOT_AVAILABLE",
        -17 => "CL_LINK_PROGRAM_FAILURE",
        -18 => "CL_DEVICE_PARTITION_FAILED",
        -19 => "CL_KERNEL_ARG_INFO_NOT_AVAILABLE",
        -30 => "CL_INVALID_VALUE",
        -31 => "CL_INVALID_DEVICE_TYPE",
        -32 => "CL_INVALID_PLATFORM",
        -33 => "CL_INVALID_DEVICE",
        -34 => "CL_INVALID_CONTEXT",
        -35 => "CL_INVALID_QUEUE_PROPERTIES",
        -36 => "CL_INVALID_COMMAND_QUEUE",
        -37 => "CL_INVALID_HOST_PTR",
        -38 => "CL_INVALID_MEM_OBJECT",
        -39 => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
        -40 => "CL_INVALID_IMAGE_SIZE",
        -41 => "CL_INVALID_SAMPLER",
        -42 => "CL_INVALID_BINARY",
        -43 => "CL_INVALID_BUILD_OPTIONS",
        -44 => "CL_INVALID_PROGRAM",
        -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
        -46 => "CL_INVALID_KERNEL_NAME",
        -47 => "CL_INVALID_KERNEL_DEFINITION",
        -48 => "CL_INVALID_KERNEL",
        -49 => "CL_INVALID_ARG_INDEX",
        -50 => "CL_INVALID_ARG_VALUE",
        -51 => "CL_INVALID_ARG_SIZE",
        -52 => "CL_INVALID_KERNEL_ARGS",
        -53 => "CL_INVALID_WORK_DIMENSION",
        -54 => "CL_INVALID_WORK_GROUP_SIZE",
        -55 => "CL_INVALID_WORK_ITEM_SIZE",
        -56 => "CL_INVALID_GLOBAL_OFFSET",
        -57 => "CL_INVALID_EVENT_WAIT_LIST",
        -58 => "CL_INVALID_EVENT",
        -59 => "CL_INVALID_OPERATION",
        -60 => "CL_INVALID_GL_OBJECT",
        -61 => "CL_INVALID_BUFFER_SIZE",
        -62 => "CL_INVALID_MIP_LEVEL",
        -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
        -64 => "CL_INVALID_PROPERTY",
        -65 => "CL_INVALID_IMAGE_DESCRIPTOR",
        -66 => "CL_INVALID_COMPILER_OPTIONS",
        -67 => "CL_INVALID_LINKER_OPTIONS",
        -68 => "CL_INVALID_DEVICE_PARTITION_COUNT",
        -1001 => "CL_PLATFORM_NOT_FOUND_KHR",
        _ => "UNKNOWN_STATUS",
    }
}

/// Errors produced by the offload runtime and dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum GemmError {
    #[error("{context} {status}")]
    Runtime { context: String, status: ClStatus },

    #[error("Failed to build program {status}\n{log}")]
    Build { status: ClStatus, log: String },

    #[error("Failed to open kernel artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Kernel artifact {} is empty", path.display())]
    EmptyArtifact { path: PathBuf },

    #[error("Invalid GEMM argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GemmError {
    /// The OpenCL status behind this error, if it came from the runtime.
    pub fn status(&self) -> Option<ClStatus> {
        match self {
            GemmError::Runtime { status, .. } | GemmError::Build { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Attach the failing step to a raw accelerator status.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, GemmError>;
}

impl<T> ResultExt<T> for ClResult<T> {
    fn context(self, context: impl Into<String>) -> Result<T, GemmError> {
        self.map_err(|status| GemmError::Runtime { context: context.into(), status })
    }
}

/// Print the diagnostic for `err` and terminate the process.
pub fn abort_on_error(err: &GemmError) -> ! {
    tracing::error!("{}", err);
    eprintln!("Error: {}", err);
    std::process::exit(1)
}

/// Abort-by-default for callers that have no recovery path.
pub trait OrAbort<T> {
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, GemmError> {
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => abort_on_error(&err),
        }
    }
}

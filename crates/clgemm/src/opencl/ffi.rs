//! Runtime-loaded OpenCL entry points via dlopen.
//!
//! Binding the ICD loader at run time keeps the crate buildable and usable
//! (through the host path) on machines without any OpenCL installation.

use std::ffi::{c_char, c_void};
use std::sync::OnceLock;

use libloading::Library;

// ---------------------------------------------------------------------------
// Scalar types and constants
// ---------------------------------------------------------------------------

pub type ClInt = i32;
pub type ClUint = u32;
pub type ClBool = u32;
pub type ClBitfield = u64;

pub const CL_SUCCESS: ClInt = 0;
pub const CL_FALSE: ClBool = 0;

// cl_device_type
pub const CL_DEVICE_TYPE_DEFAULT: ClBitfield = 1 << 0;
pub const CL_DEVICE_TYPE_CPU: ClBitfield = 1 << 1;
pub const CL_DEVICE_TYPE_GPU: ClBitfield = 1 << 2;
pub const CL_DEVICE_TYPE_ACCELERATOR: ClBitfield = 1 << 3;
pub const CL_DEVICE_TYPE_ALL: ClBitfield = 0xFFFF_FFFF;

// cl_mem_flags
pub const CL_MEM_READ_WRITE: ClBitfield = 1 << 0;
pub const CL_MEM_READ_ONLY: ClBitfield = 1 << 2;
pub const CL_MEM_COPY_HOST_PTR: ClBitfield = 1 << 5;

// info queries
pub const CL_DEVICE_NAME: ClUint = 0x102B;
pub const CL_PROGRAM_BUILD_LOG: ClUint = 0x1183;

// ---------------------------------------------------------------------------
// Opaque handles
// ---------------------------------------------------------------------------

macro_rules! cl_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            #[repr(transparent)]
            pub struct $name(pub *mut c_void);

            // OpenCL objects are reference counted by the ICD and may be used
            // from any thread; the runtime never shares one between threads.
            unsafe impl Send for $name {}
            unsafe impl Sync for $name {}

            impl $name {
                pub fn null() -> Self {
                    Self(std::ptr::null_mut())
                }

                pub fn is_null(&self) -> bool {
                    self.0.is_null()
                }
            }
        )*
    };
}

cl_handle!(
    /// `cl_platform_id`
    PlatformId,
    /// `cl_device_id`
    DeviceId,
    /// `cl_context`
    Context,
    /// `cl_program`
    Program,
    /// `cl_command_queue`
    CommandQueue,
    /// `cl_kernel`
    Kernel,
    /// `cl_mem`
    Mem,
    /// `cl_event`
    Event,
);

// ---------------------------------------------------------------------------
// Function signatures
// ---------------------------------------------------------------------------

type FnGetPlatformIds = unsafe extern "C" fn(ClUint, *mut PlatformId, *mut ClUint) -> ClInt;
type FnGetDeviceIds = unsafe extern "C" fn(
    PlatformId, ClBitfield, ClUint, *mut DeviceId, *mut ClUint,
) -> ClInt;
type FnGetDeviceInfo = unsafe extern "C" fn(
    DeviceId, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnCreateContext = unsafe extern "C" fn(
    *const isize,          // properties
    ClUint,                // num_devices
    *const DeviceId,       // devices
    *const c_void,         // pfn_notify (unused)
    *mut c_void,           // user_data
    *mut ClInt,            // errcode_ret
) -> Context;
type FnCreateProgramWithBinary = unsafe extern "C" fn(
    Context,
    ClUint,                // num_devices
    *const DeviceId,
    *const usize,          // lengths
    *const *const u8,      // binaries
    *mut ClInt,            // binary_status
    *mut ClInt,            // errcode_ret
) -> Program;
type FnBuildProgram = unsafe extern "C" fn(
    Program, ClUint, *const DeviceId, *const c_char, *const c_void, *mut c_void,
) -> ClInt;
type FnGetProgramBuildInfo = unsafe extern "C" fn(
    Program, DeviceId, ClUint, usize, *mut c_void, *mut usize,
) -> ClInt;
type FnCreateCommandQueue = unsafe extern "C" fn(
    Context, DeviceId, ClBitfield, *mut ClInt,
) -> CommandQueue;
type FnCreateKernel = unsafe extern "C" fn(Program, *const c_char, *mut ClInt) -> Kernel;
type FnCreateBuffer = unsafe extern "C" fn(
    Context, ClBitfield, usize, *mut c_void, *mut ClInt,
) -> Mem;
type FnSetKernelArg = unsafe extern "C" fn(Kernel, ClUint, usize, *const c_void) -> ClInt;
type FnEnqueueNdRangeKernel = unsafe extern "C" fn(
    CommandQueue,
    Kernel,
    ClUint,                // work_dim
    *const usize,          // global_work_offset
    *const usize,          // global_work_size
    *const usize,          // local_work_size
    ClUint,                // num_events_in_wait_list
    *const Event,
    *mut Event,
) -> ClInt;
type FnEnqueueReadBuffer = unsafe extern "C" fn(
    CommandQueue,
    Mem,
    ClBool,                // blocking_read
    usize,                 // offset
    usize,                 // size
    *mut c_void,
    ClUint,
    *const Event,
    *mut Event,
) -> ClInt;
type FnWaitForEvents = unsafe extern "C" fn(ClUint, *const Event) -> ClInt;
type FnFinish = unsafe extern "C" fn(CommandQueue) -> ClInt;
type FnReleaseEvent = unsafe extern "C" fn(Event) -> ClInt;
type FnReleaseMemObject = unsafe extern "C" fn(Mem) -> ClInt;
type FnReleaseKernel = unsafe extern "C" fn(Kernel) -> ClInt;
type FnReleaseCommandQueue = unsafe extern "C" fn(CommandQueue) -> ClInt;
type FnReleaseProgram = unsafe extern "C" fn(Program) -> ClInt;
type FnReleaseContext = unsafe extern "C" fn(Context) -> ClInt;

// ---------------------------------------------------------------------------
// Loaded API
// ---------------------------------------------------------------------------

pub struct ClApi {
    _lib: Library,
    pub get_platform_ids: FnGetPlatformIds,
    pub get_device_ids: FnGetDeviceIds,
    pub get_device_info: FnGetDeviceInfo,
    pub create_context: FnCreateContext,
    pub create_program_with_binary: FnCreateProgramWithBinary,
    pub build_program: FnBuildProgram,
    pub get_program_build_info: FnGetProgramBuildInfo,
    pub create_command_queue: FnCreateCommandQueue,
    pub create_kernel: FnCreateKernel,
    pub create_buffer: FnCreateBuffer,
    pub set_kernel_arg: FnSetKernelArg,
    pub enqueue_nd_range_kernel: FnEnqueueNdRangeKernel,
    pub enqueue_read_buffer: FnEnqueueReadBuffer,
    pub wait_for_events: FnWaitForEvents,
    pub finish: FnFinish,
    pub release_event: FnReleaseEvent,
    pub release_mem_object: FnReleaseMemObject,
    pub release_kernel: FnReleaseKernel,
    pub release_command_queue: FnReleaseCommandQueue,
    pub release_program: FnReleaseProgram,
    pub release_context: FnReleaseContext,
}

// Safety: OpenCL 1.2 entry points other than clSetKernelArg are thread-safe.
unsafe impl Send for ClApi {}
unsafe impl Sync for ClApi {}

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

static CL_API: OnceLock<Option<ClApi>> = OnceLock::new();

impl ClApi {
    fn try_load() -> Option<Self> {
        let lib = LIBRARY_NAMES
            .iter()
            .find_map(|name| unsafe { Library::new(name) }.ok())?;
        unsafe {
            let api = ClApi {
                get_platform_ids: *lib.get::<FnGetPlatformIds>(b"clGetPlatformIDs\0").ok()?,
                get_device_ids: *lib.get::<FnGetDeviceIds>(b"clGetDeviceIDs\0").ok()?,
                get_device_info: *lib.get::<FnGetDeviceInfo>(b"clGetDeviceInfo\0").ok()?,
                create_context: *lib.get::<FnCreateContext>(b"clCreateContext\0").ok()?,
                create_program_with_binary: *lib.get::<FnCreateProgramWithBinary>(b"clCreateProgramWithBinary\0").ok()?,
                build_program: *lib.get::<FnBuildProgram>(b"clBuildProgram\0").ok()?,
                get_program_build_info: *lib.get::<FnGetProgramBuildInfo>(b"clGetProgramBuildInfo\0").ok()?,
                create_command_queue: *lib.get::<FnCreateCommandQueue>(b"clCreateCommandQueue\0").ok()?,
                create_kernel: *lib.get::<FnCreateKernel>(b"clCreateKernel\0").ok()?,
                create_buffer: *lib.get::<FnCreateBuffer>(b"clCreateBuffer\0").ok()?,
                set_kernel_arg: *lib.get::<FnSetKernelArg>(b"clSetKernelArg\0").ok()?,
                enqueue_nd_range_kernel: *lib.get::<FnEnqueueNdRangeKernel>(b"clEnqueueNDRangeKernel\0").ok()?,
                enqueue_read_buffer: *lib.get::<FnEnqueueReadBuffer>(b"clEnqueueReadBuffer\0").ok()?,
                wait_for_events: *lib.get::<FnWaitForEvents>(b"clWaitForEvents\0").ok()?,
                finish: *lib.get::<FnFinish>(b"clFinish\0").ok()?,
                release_event: *lib.get::<FnReleaseEvent>(b"clReleaseEvent\0").ok()?,
                release_mem_object: *lib.get::<FnReleaseMemObject>(b"clReleaseMemObject\0").ok()?,
                release_kernel: *lib.get::<FnReleaseKernel>(b"clReleaseKernel\0").ok()?,
                release_command_queue: *lib.get::<FnReleaseCommandQueue>(b"clReleaseCommandQueue\0").ok()?,
                release_program: *lib.get::<FnReleaseProgram>(b"clReleaseProgram\0").ok()?,
                release_context: *lib.get::<FnReleaseContext>(b"clReleaseContext\0").ok()?,
                _lib: lib,
            };
            Some(api)
        }
    }
}

/// Get the runtime-loaded OpenCL API. Returns None if no ICD loader is installed.
pub fn cl_api() -> Option<&'static ClApi> {
    CL_API
        .get_or_init(|| {
            let api = ClApi::try_load();
            if api.is_none() {
                tracing::debug!("OpenCL ICD loader not found (tried {:?})", LIBRARY_NAMES);
            }
            api
        })
        .as_ref()
}

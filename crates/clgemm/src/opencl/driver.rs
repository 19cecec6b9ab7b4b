//! The accelerator API seen by the runtime and the dispatch engine.
//!
//! [`ClDriver`] is the narrow slice of OpenCL this crate needs. [`OpenCl`] forwards
//! it to the runtime-loaded ICD loader; tests substitute an instrumented mock.

use std::ffi::{c_char, c_void, CString};

use super::ffi::{self, ClApi, ClInt, CL_SUCCESS};
use crate::config::DeviceType;
use crate::error::{ClResult, ClStatus};

/// Access mode of a device buffer, as seen by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    ReadOnly,
    ReadWrite,
}

/// One positional kernel argument.
#[derive(Debug, Clone, Copy)]
pub enum KernelArg<'a, M> {
    Int(i32),
    Float(f32),
    Buffer(&'a M),
}

/// Operations on an OpenCL-style accelerator runtime.
///
/// Every fallible call returns the raw status on failure; callers attach the
/// failing step with [`ResultExt::context`](crate::error::ResultExt::context).
pub trait ClDriver {
    type Platform: Copy;
    type Device: Copy;
    type Context;
    type Program;
    type Queue;
    type Kernel;
    type Mem;
    type Event;

    fn first_platform(&self) -> ClResult<Self::Platform>;

    fn first_device(&self, platform: Self::Platform, device_type: DeviceType) -> ClResult<Self::Device>;

    fn device_name(&self, device: Self::Device) -> ClResult<String>;

    fn create_context(&self, device: Self::Device) -> ClResult<Self::Context>;

    fn create_program_with_binary(
        &self,
        context: &Self::Context,
        device: Self::Device,
        binary: &[u8],
    ) -> ClResult<Self::Program>;

    fn build_program(&self, program: &Self::Program, device: Self::Device, options: &str) -> ClResult<()>;

    fn build_log(&self, program: &Self::Program, device: Self::Device) -> ClResult<String>;

    fn create_command_queue(&self, context: &Self::Context, device: Self::Device) -> ClResult<Self::Queue>;

    fn create_kernel(&self, program: &Self::Program, name: &str) -> ClResult<Self::Kernel>;

    /// Allocate a buffer initialised with a copy of `host`.
    fn create_buffer(&self, context: &Self::Context, access: MemAccess, host: &[f32]) -> ClResult<Self::Mem>;

    fn set_kernel_arg(&self, kernel: &Self::Kernel, index: u32, arg: KernelArg<'_, Self::Mem>) -> ClResult<()>;

    /// Enqueue one 1-D launch of `kernel` with the given global work size.
    fn enqueue_kernel(&self, queue: &Self::Queue, kernel: &Self::Kernel, global_work_size: usize)
        -> ClResult<Self::Event>;

    /// Enqueue a non-blocking read of `mem` into `dst` once `wait_for` completes.
    ///
    /// # Safety
    /// The device writes into `dst` asynchronously. The caller must keep `dst`
    /// alive and untouched until the returned event has completed.
    unsafe fn enqueue_read_buffer(
        &self,
        queue: &Self::Queue,
        mem: &Self::Mem,
        dst: &mut [f32],
        wait_for: &[&Self::Event],
    ) -> ClResult<Self::Event>;

    fn wait_for_events(&self, events: &[&Self::Event]) -> ClResult<()>;

    /// Block until every command previously enqueued on `queue` has completed.
    fn finish(&self, queue: &Self::Queue) -> ClResult<()>;

    fn release_event(&self, event: Self::Event) -> ClResult<()>;
    fn release_mem(&self, mem: Self::Mem) -> ClResult<()>;
    fn release_kernel(&self, kernel: Self::Kernel) -> ClResult<()>;
    fn release_queue(&self, queue: Self::Queue) -> ClResult<()>;
    fn release_program(&self, program: Self::Program) -> ClResult<()>;
    fn release_context(&self, context: Self::Context) -> ClResult<()>;
}

/// The system OpenCL implementation, reached through the ICD loader.
///
/// A missing loader reports `CL_PLATFORM_NOT_FOUND_KHR` from every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCl;

/// Check if an OpenCL loader is installed and exposes at least one platform.
pub fn is_opencl_available() -> bool {
    OpenCl.first_platform().is_ok()
}

fn api() -> ClResult<&'static ClApi> {
    ffi::cl_api().ok_or(ClStatus::PLATFORM_NOT_FOUND)
}

/// Turn a handle-returning call's `(handle, errcode)` pair into a result.
fn created<H>(handle: H, status: ClInt) -> ClResult<H> {
    ClStatus::check(status).map(|()| handle)
}

fn device_type_bits(device_type: DeviceType) -> ffi::ClBitfield {
    match device_type {
        DeviceType::Default => ffi::CL_DEVICE_TYPE_DEFAULT,
        DeviceType::Cpu => ffi::CL_DEVICE_TYPE_CPU,
        DeviceType::Gpu => ffi::CL_DEVICE_TYPE_GPU,
        DeviceType::Accelerator => ffi::CL_DEVICE_TYPE_ACCELERATOR,
        DeviceType::All => ffi::CL_DEVICE_TYPE_ALL,
    }
}

/// Read a NUL-terminated string out of a size-then-data info query.
fn info_string(query: impl Fn(usize, *mut c_void, *mut usize) -> ClInt) -> ClResult<String> {
    let mut size = 0usize;
    ClStatus::check(query(0, std::ptr::null_mut(), &mut size as *mut usize))?;
    let mut buf = vec![0u8; size];
    ClStatus::check(query(size, buf.as_mut_ptr() as *mut c_void, std::ptr::null_mut()))?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl ClDriver for OpenCl {
    type Platform = ffi::PlatformId;
    type Device = ffi::DeviceId;
    type Context = ffi::Context;
    type Program = ffi::Program;
    type Queue = ffi::CommandQueue;
    type Kernel = ffi::Kernel;
    type Mem = ffi::Mem;
    type Event = ffi::Event;

    fn first_platform(&self) -> ClResult<Self::Platform> {
        let api = api()?;
        let mut platform = ffi::PlatformId::null();
        let mut count = 0u32;
        ClStatus::check(unsafe { (api.get_platform_ids)(1, &mut platform, &mut count) })?;
        if count == 0 || platform.is_null() {
            return Err(ClStatus::PLATFORM_NOT_FOUND);
        }
        Ok(platform)
    }

    fn first_device(&self, platform: Self::Platform, device_type: DeviceType) -> ClResult<Self::Device> {
        let api = api()?;
        let mut device = ffi::DeviceId::null();
        let mut count = 0u32;
        ClStatus::check(unsafe {
            (api.get_device_ids)(platform, device_type_bits(device_type), 1, &mut device, &mut count)
        })?;
        if count == 0 || device.is_null() {
            return Err(ClStatus::DEVICE_NOT_FOUND);
        }
        Ok(device)
    }

    fn device_name(&self, device: Self::Device) -> ClResult<String> {
        let api = api()?;
        info_string(|size, value, size_ret| unsafe {
            (api.get_device_info)(device, ffi::CL_DEVICE_NAME, size, value, size_ret)
        })
    }

    fn create_context(&self, device: Self::Device) -> ClResult<Self::Context> {
        let api = api()?;
        let mut status = CL_SUCCESS;
        let context = unsafe {
            (api.create_context)(
                std::ptr::null(),
                1,
                &device,
                std::ptr::null(),
                std::ptr::null_mut(),
                &mut status,
            )
        };
        created(context, status)
    }

    fn create_program_with_binary(
        &self,
        context: &Self::Context,
        device: Self::Device,
        binary: &[u8],
    ) -> ClResult<Self::Program> {
        let api = api()?;
        let lengths = [binary.len()];
        let binaries = [binary.as_ptr()];
        let mut binary_status = CL_SUCCESS;
        let mut status = CL_SUCCESS;
        let program = unsafe {
            (api.create_program_with_binary)(
                *context,
                1,
                &device,
                lengths.as_ptr(),
                binaries.as_ptr(),
                &mut binary_status,
                &mut status,
            )
        };
        let program = created(program, status)?;
        if binary_status != CL_SUCCESS {
            unsafe { (api.release_program)(program) };
            return Err(ClStatus(binary_status));
        }
        Ok(program)
    }

    fn build_program(&self, program: &Self::Program, device: Self::Device, options: &str) -> ClResult<()> {
        let api = api()?;
        let options = CString::new(options).map_err(|_| ClStatus::INVALID_VALUE)?;
        ClStatus::check(unsafe {
            (api.build_program)(
                *program,
                1,
                &device,
                options.as_ptr() as *const c_char,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        })
    }

    fn build_log(&self, program: &Self::Program, device: Self::Device) -> ClResult<String> {
        let api = api()?;
        info_string(|size, value, size_ret| unsafe {
            (api.get_program_build_info)(*program, device, ffi::CL_PROGRAM_BUILD_LOG, size, value, size_ret)
        })
    }

    fn create_command_queue(&self, context: &Self::Context, device: Self::Device) -> ClResult<Self::Queue> {
        let api = api()?;
        let mut status = CL_SUCCESS;
        let queue = unsafe { (api.create_command_queue)(*context, device, 0, &mut status) };
        created(queue, status)
    }

    fn create_kernel(&self, program: &Self::Program, name: &str) -> ClResult<Self::Kernel> {
        let api = api()?;
        let name = CString::new(name).map_err(|_| ClStatus::INVALID_KERNEL_NAME)?;
        let mut status = CL_SUCCESS;
        let kernel = unsafe { (api.create_kernel)(*program, name.as_ptr(), &mut status) };
        created(kernel, status)
    }

    fn create_buffer(&self, context: &Self::Context, access: MemAccess, host: &[f32]) -> ClResult<Self::Mem> {
        let api = api()?;
        let flags = match access {
            MemAccess::ReadOnly => ffi::CL_MEM_READ_ONLY,
            MemAccess::ReadWrite => ffi::CL_MEM_READ_WRITE,
        } | ffi::CL_MEM_COPY_HOST_PTR;
        let mut status = CL_SUCCESS;
        // COPY_HOST_PTR only reads from the host pointer.
        let mem = unsafe {
            (api.create_buffer)(
                *context,
                flags,
                std::mem::size_of_val(host),
                host.as_ptr() as *mut c_void,
                &mut status,
            )
        };
        created(mem, status)
    }

    fn set_kernel_arg(&self, kernel: &Self::Kernel, index: u32, arg: KernelArg<'_, Self::Mem>) -> ClResult<()> {
        let api = api()?;
        let status = unsafe {
            match arg {
                KernelArg::Int(v) => (api.set_kernel_arg)(
                    *kernel, index, std::mem::size_of::<i32>(), &v as *const i32 as *const c_void,
                ),
                KernelArg::Float(v) => (api.set_kernel_arg)(
                    *kernel, index, std::mem::size_of::<f32>(), &v as *const f32 as *const c_void,
                ),
                KernelArg::Buffer(mem) => (api.set_kernel_arg)(
                    *kernel, index, std::mem::size_of::<ffi::Mem>(), mem as *const ffi::Mem as *const c_void,
                ),
            }
        };
        ClStatus::check(status)
    }

    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global_work_size: usize,
    ) -> ClResult<Self::Event> {
        let api = api()?;
        let global = [global_work_size];
        let mut event = ffi::Event::null();
        ClStatus::check(unsafe {
            (api.enqueue_nd_range_kernel)(
                *queue,
                *kernel,
                1,
                std::ptr::null(),
                global.as_ptr(),
                std::ptr::null(),
                0,
                std::ptr::null(),
                &mut event,
            )
        })?;
        Ok(event)
    }

    unsafe fn enqueue_read_buffer(
        &self,
        queue: &Self::Queue,
        mem: &Self::Mem,
        dst: &mut [f32],
        wait_for: &[&Self::Event],
    ) -> ClResult<Self::Event> {
        let api = api()?;
        let wait_list: Vec<ffi::Event> = wait_for.iter().map(|e| **e).collect();
        let mut event = ffi::Event::null();
        ClStatus::check((api.enqueue_read_buffer)(
            *queue,
            *mem,
            ffi::CL_FALSE,
            0,
            std::mem::size_of_val(dst),
            dst.as_mut_ptr() as *mut c_void,
            wait_list.len() as u32,
            if wait_list.is_empty() { std::ptr::null() } else { wait_list.as_ptr() },
            &mut event,
        ))?;
        Ok(event)
    }

    fn wait_for_events(&self, events: &[&Self::Event]) -> ClResult<()> {
        let api = api()?;
        let list: Vec<ffi::Event> = events.iter().map(|e| **e).collect();
        ClStatus::check(unsafe { (api.wait_for_events)(list.len() as u32, list.as_ptr()) })
    }

    fn finish(&self, queue: &Self::Queue) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.finish)(*queue) })
    }

    fn release_event(&self, event: Self::Event) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.release_event)(event) })
    }

    fn release_mem(&self, mem: Self::Mem) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.release_mem_object)(mem) })
    }

    fn release_kernel(&self, kernel: Self::Kernel) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.release_kernel)(kernel) })
    }

    fn release_queue(&self, queue: Self::Queue) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.release_command_queue)(queue) })
    }

    fn release_program(&self, program: Self::Program) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.release_program)(program) })
    }

    fn release_context(&self, context: Self::Context) -> ClResult<()> {
        ClStatus::check(unsafe { (api()?.release_context)(context) })
    }
}

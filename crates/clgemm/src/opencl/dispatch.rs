//! GEMM dispatch: device path when the runtime is ready, host path otherwise.
//!
//! One device call is: three buffers from host memory, ten positional kernel
//! arguments, a single-work-item launch, a read-back of C that waits on the
//! launch, and a blocking wait on the read-back. Buffers and events are RAII
//! guards, so they are released on every exit path. If the wait on the
//! read-back fails, the queue is drained before returning so that no transfer
//! into C outlives the call.

use super::driver::{ClDriver, KernelArg, MemAccess};
use super::memory::{CompletionEvent, DeviceBuffer};
use super::runtime::AcceleratorRuntime;
use crate::error::{abort_on_error, GemmError, ResultExt};
use crate::host;
use crate::matrix::{conform, kernel_int, non_negative, GemmDims, MatrixView, MatrixViewMut};

/// Global work size of every launch. The kernel performs the whole M×N×K
/// product inside one work item; no host-side decomposition is done.
pub const GLOBAL_WORK_SIZE: usize = 1;

/// Which path satisfied a dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    Device,
    Host,
}

/// `C := alpha·A·B + C`, offloaded when `runtime` is ready.
///
/// Never changes the runtime state. Without a ready runtime the call logs a
/// warning and runs [`host::gemm_nn`] with the same arguments.
pub fn dispatch<D: ClDriver>(
    runtime: &AcceleratorRuntime<D>,
    alpha: f32,
    a: &MatrixView<'_>,
    b: &MatrixView<'_>,
    c: &mut MatrixViewMut<'_>,
) -> Result<DispatchPath, GemmError> {
    let dims = conform(a, b, c)?;
    let args = KernelArgs::new(dims, a, b, c)?;

    let handles = runtime
        .accelerator_context()
        .filter(|_| runtime.is_ready())
        .and_then(|ctx| ctx.launch_handles());
    let Some((context, queue, kernel)) = handles else {
        tracing::warn!("OpenCL GEMM runtime not initialized; using host path");
        host::gemm_nn(alpha, a, b, c)?;
        return Ok(DispatchPath::Host);
    };

    if dims.is_empty() {
        tracing::debug!("gemm_nn {}x{}x{}: nothing to compute", dims.m, dims.n, dims.k);
        return Ok(DispatchPath::Device);
    }

    tracing::debug!("gemm_nn {}x{}x{} on device", dims.m, dims.n, dims.k);

    let driver = runtime.driver();

    let a_buf = DeviceBuffer::from_host(driver, context, MemAccess::ReadOnly, a.as_slice())
        .context("Failed to create buffer for input A")?;
    let b_buf = DeviceBuffer::from_host(driver, context, MemAccess::ReadOnly, b.as_slice())
        .context("Failed to create buffer for input B")?;
    let c_buf = DeviceBuffer::from_host(driver, context, MemAccess::ReadWrite, c.as_slice())
        .context("Failed to create buffer for input/output C")?;
    tracing::trace!("device buffers: A={} B={} C={} floats", a_buf.len(), b_buf.len(), c_buf.len());

    let positional = [
        KernelArg::Int(args.m),
        KernelArg::Int(args.n),
        KernelArg::Int(args.k),
        KernelArg::Float(alpha),
        KernelArg::Buffer(a_buf.mem()),
        KernelArg::Int(args.lda),
        KernelArg::Buffer(b_buf.mem()),
        KernelArg::Int(args.ldb),
        KernelArg::Buffer(c_buf.mem()),
        KernelArg::Int(args.ldc),
    ];
    for (index, arg) in positional.into_iter().enumerate() {
        driver
            .set_kernel_arg(kernel, index as u32, arg)
            .context(format!("Failed to set kernel argument {}", index))?;
    }

    let launch = CompletionEvent::new(
        driver,
        driver.enqueue_kernel(queue, kernel, GLOBAL_WORK_SIZE).context("Failed to launch kernel")?,
    );

    // Safety: the device writes into C asynchronously. C stays exclusively
    // borrowed until the read-back is known to be complete: either the wait
    // below succeeds, or `drain` blocks on the whole queue before we return.
    let read = unsafe { driver.enqueue_read_buffer(queue, c_buf.mem(), c.as_mut_slice(), &[launch.raw()]) }
        .context("Failed to read from a buffer object")?;
    let finish = CompletionEvent::new(driver, read);
    if let Err(status) = finish.wait() {
        drain(driver, queue);
        return Err(GemmError::Runtime { context: "Failed to wait for the read-back".to_string(), status });
    }

    Ok(DispatchPath::Device)
}

/// C-style entry point with `int` sizes and raw slices, as the kernel sees them.
///
/// A is `m × k` with stride `lda`, B is `k × n` with stride `ldb`, C is
/// `m × n` with stride `ldc`, all row-major.
#[allow(clippy::too_many_arguments)]
pub fn gemm_nn<D: ClDriver>(
    runtime: &AcceleratorRuntime<D>,
    m: i32,
    n: i32,
    k: i32,
    alpha: f32,
    a: &[f32],
    lda: i32,
    b: &[f32],
    ldb: i32,
    c: &mut [f32],
    ldc: i32,
) -> Result<DispatchPath, GemmError> {
    let m = non_negative("M", m)?;
    let n = non_negative("N", n)?;
    let k = non_negative("K", k)?;
    let av = MatrixView::new(a, m, k, non_negative("lda", lda)?).map_err(|e| labelled("A", e))?;
    let bv = MatrixView::new(b, k, n, non_negative("ldb", ldb)?).map_err(|e| labelled("B", e))?;
    let mut cv = MatrixViewMut::new(c, m, n, non_negative("ldc", ldc)?).map_err(|e| labelled("C", e))?;
    dispatch(runtime, alpha, &av, &bv, &mut cv)
}

/// Block until nothing on `queue` can still write into host memory.
///
/// Called when waiting on a read-back failed. If the queue cannot be drained
/// either, the device may still be writing into memory the caller gets back,
/// so the process is terminated.
fn drain<D: ClDriver>(driver: &D, queue: &D::Queue) {
    if let Err(status) = driver.finish(queue) {
        abort_on_error(&GemmError::Runtime {
            context: "Failed to drain the command queue after a failed read-back".to_string(),
            status,
        });
    }
}

fn labelled(name: &str, err: GemmError) -> GemmError {
    match err {
        GemmError::InvalidArgument(msg) => GemmError::InvalidArgument(format!("{}: {}", name, msg)),
        other => other,
    }
}

/// Integer kernel arguments, range-checked against the kernel's `int`.
struct KernelArgs {
    m: i32,
    n: i32,
    k: i32,
    lda: i32,
    ldb: i32,
    ldc: i32,
}

impl KernelArgs {
    fn new(
        dims: GemmDims,
        a: &MatrixView<'_>,
        b: &MatrixView<'_>,
        c: &MatrixViewMut<'_>,
    ) -> Result<Self, GemmError> {
        Ok(Self {
            m: kernel_int("M", dims.m)?,
            n: kernel_int("N", dims.n)?,
            k: kernel_int("K", dims.k)?,
            lda: kernel_int("lda", a.ld())?,
            ldb: kernel_int("ldb", b.ld())?,
            ldc: kernel_int("ldc", c.ld())?,
        })
    }
}

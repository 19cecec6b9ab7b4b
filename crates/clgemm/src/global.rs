//! Process-wide default runtime with the abort-on-error policy.
//!
//! These functions mirror a plain C-style surface: `init`, `deinit` and
//! `gemm_nn` return nothing and terminate the process on any accelerator
//! failure. Configuration is read from the environment on first use (see
//! [`RuntimeConfig::from_env`]). Code that wants to handle errors should own
//! an [`AcceleratorRuntime`] and call [`dispatch`](crate::dispatch) instead.

use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};

use crate::config::RuntimeConfig;
use crate::error::OrAbort;
use crate::opencl::dispatch;
use crate::opencl::runtime::{AcceleratorRuntime, RuntimeState};

static RUNTIME: OnceLock<Mutex<AcceleratorRuntime>> = OnceLock::new();

fn runtime() -> MutexGuard<'static, AcceleratorRuntime> {
    RUNTIME
        .get_or_init(|| Mutex::new(AcceleratorRuntime::opencl(RuntimeConfig::from_env())))
        .lock()
}

/// Initialise the default runtime. No-op if already initialised; aborts on failure.
pub fn init() {
    runtime().init().or_abort()
}

/// Release the default runtime. No-op if not initialised.
pub fn deinit() {
    runtime().deinit()
}

pub fn is_ready() -> bool {
    runtime().is_ready()
}

pub fn state() -> RuntimeState {
    runtime().state()
}

/// `C := alpha·A·B + C` through the default runtime; aborts on failure.
///
/// Falls back to the host path, with a warning, when `init` has not run.
#[allow(clippy::too_many_arguments)]
pub fn gemm_nn(
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
) {
    let rt = runtime();
    dispatch::gemm_nn(&*rt, m, n, k, alpha, a, lda, b, ldb, c, ldc).or_abort();
}

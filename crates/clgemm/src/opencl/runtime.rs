//! Accelerator lifecycle: device selection, program build, queue and kernel.
//!
//! An [`AcceleratorRuntime`] is either `Uninitialized` (no device resources)
//! or `Ready` (a complete [`AcceleratorContext`]). `init` and `deinit` are
//! idempotent and are the only operations that change the state.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::driver::{ClDriver, OpenCl};
use crate::config::RuntimeConfig;
use crate::error::{GemmError, ResultExt};

/// Lifecycle state of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeState {
    #[default]
    Uninitialized,
    Ready,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeState::Uninitialized => write!(f, "uninitialized"),
            RuntimeState::Ready => write!(f, "ready"),
        }
    }
}

/// Device resources owned by a runtime.
///
/// Each handle is optional so that a context abandoned part way through
/// `init` releases exactly what was created.
pub struct AcceleratorContext<D: ClDriver> {
    device: Option<D::Device>,
    device_name: String,
    context: Option<D::Context>,
    program: Option<D::Program>,
    queue: Option<D::Queue>,
    kernel: Option<D::Kernel>,
}

impl<D: ClDriver> AcceleratorContext<D> {
    fn empty() -> Self {
        Self {
            device: None,
            device_name: String::new(),
            context: None,
            program: None,
            queue: None,
            kernel: None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Context, queue and kernel, present once `init` has completed.
    pub(crate) fn launch_handles(&self) -> Option<(&D::Context, &D::Queue, &D::Kernel)> {
        Some((self.context.as_ref()?, self.queue.as_ref()?, self.kernel.as_ref()?))
    }

    /// Release in reverse creation order, skipping handles never created.
    fn release(&mut self, driver: &D) {
        if let Some(kernel) = self.kernel.take() {
            if let Err(status) = driver.release_kernel(kernel) {
                tracing::warn!("clReleaseKernel failed: {}", status);
            }
        }
        if let Some(queue) = self.queue.take() {
            if let Err(status) = driver.release_queue(queue) {
                tracing::warn!("clReleaseCommandQueue failed: {}", status);
            }
        }
        if let Some(program) = self.program.take() {
            if let Err(status) = driver.release_program(program) {
                tracing::warn!("clReleaseProgram failed: {}", status);
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(status) = driver.release_context(context) {
                tracing::warn!("clReleaseContext failed: {}", status);
            }
        }
        self.device = None;
    }
}

/// Owner of the accelerator lifecycle for one device.
///
/// Not internally synchronised: `init`/`deinit` take `&mut self`, dispatch
/// takes `&self`.
pub struct AcceleratorRuntime<D: ClDriver = OpenCl> {
    driver: D,
    config: RuntimeConfig,
    state: RuntimeState,
    context: Option<AcceleratorContext<D>>,
}

impl AcceleratorRuntime<OpenCl> {
    /// Runtime over the system OpenCL installation.
    pub fn opencl(config: RuntimeConfig) -> Self {
        Self::new(OpenCl, config)
    }
}

impl<D: ClDriver> AcceleratorRuntime<D> {
    pub fn new(driver: D, config: RuntimeConfig) -> Self {
        Self { driver, config, state: RuntimeState::Uninitialized, context: None }
    }

    /// Bring the accelerator up. No-op when already `Ready`.
    ///
    /// On failure every resource created so far is released and the runtime
    /// stays `Uninitialized`.
    pub fn init(&mut self) -> Result<(), GemmError> {
        if self.state == RuntimeState::Ready {
            return Ok(());
        }

        let mut ctx = AcceleratorContext::empty();
        if let Err(err) = self.build_context(&mut ctx) {
            ctx.release(&self.driver);
            return Err(err);
        }

        tracing::info!(
            "OpenCL GEMM runtime ready on '{}' (kernel '{}' from {})",
            ctx.device_name,
            self.config.kernel_name,
            self.config.artifact_path.display()
        );
        self.context = Some(ctx);
        self.state = RuntimeState::Ready;
        Ok(())
    }

    fn build_context(&self, ctx: &mut AcceleratorContext<D>) -> Result<(), GemmError> {
        let driver = &self.driver;

        let platform = driver.first_platform().context("Failed to get Platform ID")?;
        let device = driver
            .first_device(platform, self.config.device_type)
            .context("Failed to get Device ID")?;
        ctx.device = Some(device);
        ctx.device_name = driver.device_name(device).unwrap_or_else(|status| {
            tracing::debug!("device name query failed: {}", status);
            "<unknown device>".to_string()
        });

        let context = ctx.context.insert(driver.create_context(device).context("Failed to create the context")?);

        let binary = load_artifact(&self.config.artifact_path)?;
        tracing::debug!("loaded {} byte kernel artifact {}", binary.len(), self.config.artifact_path.display());

        let program = ctx.program.insert(
            driver
                .create_program_with_binary(context, device, &binary)
                .context("Failed to create program")?,
        );

        if let Err(status) = driver.build_program(program, device, &self.config.build_options) {
            let log = driver.build_log(program, device).unwrap_or_default();
            if !log.is_empty() {
                tracing::error!("program build log:\n{}", log);
            }
            return Err(GemmError::Build { status, log });
        }

        let queue = driver.create_command_queue(context, device).context("Failed to create command queue")?;
        ctx.queue = Some(queue);

        let kernel = driver.create_kernel(program, &self.config.kernel_name).context("Failed to create kernel")?;
        ctx.kernel = Some(kernel);
        Ok(())
    }

    /// Release all device resources. No-op when `Uninitialized`; never fails.
    pub fn deinit(&mut self) {
        if self.state == RuntimeState::Uninitialized {
            return;
        }
        if let Some(mut ctx) = self.context.take() {
            ctx.release(&self.driver);
        }
        self.state = RuntimeState::Uninitialized;
        tracing::debug!("OpenCL GEMM runtime released");
    }

    pub fn is_ready(&self) -> bool {
        self.state == RuntimeState::Ready
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Name of the selected device while `Ready`.
    pub fn device_name(&self) -> Option<&str> {
        self.context.as_ref().map(|ctx| ctx.device_name())
    }

    pub(crate) fn accelerator_context(&self) -> Option<&AcceleratorContext<D>> {
        self.context.as_ref()
    }
}

impl<D: ClDriver> Drop for AcceleratorRuntime<D> {
    fn drop(&mut self) {
        self.deinit();
    }
}

/// Read the kernel image, sizing the buffer from the file's actual length.
pub fn load_artifact(path: &Path) -> Result<Vec<u8>, GemmError> {
    let artifact_err = |source| GemmError::Artifact { path: path.to_path_buf(), source };

    let mut file = File::open(path).map_err(artifact_err)?;
    let size = file.metadata().map_err(artifact_err)?.len() as usize;
    if size == 0 {
        return Err(GemmError::EmptyArtifact { path: path.to_path_buf() });
    }
    let mut binary = vec![0u8; size];
    file.read_exact(&mut binary).map_err(artifact_err)?;
    Ok(binary)
}

//! Runtime configuration: where the kernel artifact lives and how to bind it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GemmError;

/// Default location of the precompiled kernel image, relative to the working directory.
pub const DEFAULT_ARTIFACT: &str = "gemm.aocx";

/// Default kernel entry point inside the artifact.
pub const DEFAULT_KERNEL_NAME: &str = "gemm_nn";

/// Which class of OpenCL device to select on the first platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Default,
    Cpu,
    Gpu,
    Accelerator,
    All,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Default => "default",
            DeviceType::Cpu => "cpu",
            DeviceType::Gpu => "gpu",
            DeviceType::Accelerator => "accelerator",
            DeviceType::All => "all",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceType {
    type Err = GemmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(DeviceType::Default),
            "cpu" => Ok(DeviceType::Cpu),
            "gpu" => Ok(DeviceType::Gpu),
            "accelerator" | "fpga" => Ok(DeviceType::Accelerator),
            "all" => Ok(DeviceType::All),
            other => Err(GemmError::Config(format!("unknown device type '{}'", other))),
        }
    }
}

/// Configuration for an [`AcceleratorRuntime`](crate::opencl::runtime::AcceleratorRuntime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path of the precompiled kernel image loaded during `init`.
    pub artifact_path: PathBuf,

    /// Kernel entry point bound after the program is built.
    pub kernel_name: String,

    /// Device class requested from the first platform.
    pub device_type: DeviceType,

    /// Options passed to `clBuildProgram`.
    pub build_options: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT),
            kernel_name: DEFAULT_KERNEL_NAME.to_string(),
            device_type: DeviceType::Default,
            build_options: String::new(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `CLGEMM_ARTIFACT`, `CLGEMM_KERNEL`,
    /// `CLGEMM_DEVICE_TYPE` and `CLGEMM_BUILD_OPTIONS`.
    ///
    /// An unparsable device type is logged and ignored.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, GemmError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GemmError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, GemmError> {
        serde_json::from_str(text).map_err(|e| GemmError::Config(e.to_string()))
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("CLGEMM_ARTIFACT") {
            self.artifact_path = PathBuf::from(path);
        }
        if let Some(name) = lookup("CLGEMM_KERNEL") {
            self.kernel_name = name;
        }
        if let Some(kind) = lookup("CLGEMM_DEVICE_TYPE") {
            match kind.parse() {
                Ok(kind) => self.device_type = kind,
                Err(e) => tracing::warn!("ignoring CLGEMM_DEVICE_TYPE: {}", e),
            }
        }
        if let Some(options) = lookup("CLGEMM_BUILD_OPTIONS") {
            self.build_options = options;
        }
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn with_kernel_name(mut self, name: impl Into<String>) -> Self {
        self.kernel_name = name.into();
        self
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }
}

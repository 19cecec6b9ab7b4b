//! Shared helpers: an instrumented in-memory `ClDriver` and artifact files.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use clgemm::{ClDriver, ClResult, ClStatus, DeviceType, KernelArg, MemAccess, RuntimeConfig};

/// Kinds of object the mock hands out; used as creation/release counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Object {
    Context,
    Program,
    Queue,
    Kernel,
    Buffer,
    Event,
}

/// Calls that can be made to fail with an injected status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Platform,
    Device,
    Context,
    CreateProgram,
    Build,
    Queue,
    Kernel,
    Buffer(usize),
    SetArg(u32),
    Launch,
    Read,
    Wait,
    Finish,
    Release(Object),
}

/// A recorded kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
    Buffer(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub u64);

#[derive(Default)]
pub struct MockState {
    next_id: u64,
    pub created: HashMap<Object, usize>,
    pub released: HashMap<Object, usize>,
    pub live: HashMap<u64, Object>,
    pub buffers: HashMap<u64, (MemAccess, Vec<f32>)>,
    buffer_calls: usize,
    pub args: HashMap<u32, Arg>,
    pub launches: Vec<usize>,
    pub launch_events: Vec<u64>,
    /// (event id, wait list) of every read-back.
    pub reads: Vec<(u64, Vec<u64>)>,
    /// Events the host blocked on.
    pub waited: Vec<u64>,
    /// Read-back events whose transfer has not been observed complete by a
    /// successful wait or queue drain.
    pub pending_reads: Vec<u64>,
    pub finishes: usize,
    pub artifact_len: Option<usize>,
    pub kernel_name: Option<String>,
    pub device_type: Option<DeviceType>,
    pub fail: Option<(Step, ClStatus)>,
    pub build_log: String,
}

impl MockState {
    fn alloc(&mut self, kind: Object) -> Handle {
        self.next_id += 1;
        *self.created.entry(kind).or_default() += 1;
        self.live.insert(self.next_id, kind);
        Handle(self.next_id)
    }

    fn free(&mut self, handle: Handle, kind: Object) -> ClResult<()> {
        self.check(Step::Release(kind))?;
        match self.live.remove(&handle.0) {
            Some(k) if k == kind => {
                *self.released.entry(kind).or_default() += 1;
                self.buffers.remove(&handle.0);
                Ok(())
            }
            _ => Err(ClStatus(-38)),
        }
    }

    fn check(&self, step: Step) -> ClResult<()> {
        match self.fail {
            Some((s, status)) if s == step => Err(status),
            _ => Ok(()),
        }
    }

    pub fn created(&self, kind: Object) -> usize {
        self.created.get(&kind).copied().unwrap_or(0)
    }

    pub fn released(&self, kind: Object) -> usize {
        self.released.get(&kind).copied().unwrap_or(0)
    }

    pub fn balanced(&self, kind: Object) -> bool {
        self.created(kind) == self.released(kind)
    }

    /// Run the reference kernel over the bound arguments.
    fn run_kernel(&mut self) -> ClResult<()> {
        let int = |i: u32| match self.args.get(&i) {
            Some(Arg::Int(v)) => Ok(*v as usize),
            _ => Err(ClStatus(-52)),
        };
        let buf = |i: u32| match self.args.get(&i) {
            Some(Arg::Buffer(id)) => Ok(*id),
            _ => Err(ClStatus(-52)),
        };
        let (m, n, k) = (int(0)?, int(1)?, int(2)?);
        let alpha = match self.args.get(&3) {
            Some(Arg::Float(v)) => *v,
            _ => return Err(ClStatus(-52)),
        };
        let (a_id, lda, b_id, ldb, c_id, ldc) = (buf(4)?, int(5)?, buf(6)?, int(7)?, buf(8)?, int(9)?);

        let a = self.buffers.get(&a_id).ok_or(ClStatus(-38))?.1.clone();
        let b = self.buffers.get(&b_id).ok_or(ClStatus(-38))?.1.clone();
        let (access, c) = self.buffers.get_mut(&c_id).ok_or(ClStatus(-38))?;
        if *access != MemAccess::ReadWrite {
            return Err(ClStatus(-38));
        }
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0f32;
                for p in 0..k {
                    sum += a[i * lda + p] * b[p * ldb + j];
                }
                c[i * ldc + j] += alpha * sum;
            }
        }
        Ok(())
    }
}

/// In-memory stand-in for an OpenCL implementation that counts every
/// creation and release and executes a reference GEMM kernel on launch.
///
/// Clones share one state, so a test can keep a handle after the runtime
/// owning the driver is dropped.
#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(step: Step, status: ClStatus) -> Self {
        let driver = Self::default();
        driver.state.lock().fail = Some((step, status));
        driver
    }

    pub fn fail_at(&self, step: Step, status: ClStatus) {
        self.state.lock().fail = Some((step, status));
    }

    pub fn clear_failure(&self) {
        self.state.lock().fail = None;
    }
}

impl ClDriver for MockDriver {
    type Platform = Handle;
    type Device = Handle;
    type Context = Handle;
    type Program = Handle;
    type Queue = Handle;
    type Kernel = Handle;
    type Mem = Handle;
    type Event = Handle;

    fn first_platform(&self) -> ClResult<Handle> {
        self.state.lock().check(Step::Platform)?;
        Ok(Handle(u64::MAX))
    }

    fn first_device(&self, _platform: Handle, device_type: DeviceType) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::Device)?;
        st.device_type = Some(device_type);
        Ok(Handle(u64::MAX - 1))
    }

    fn device_name(&self, _device: Handle) -> ClResult<String> {
        Ok("Mock FPGA".to_string())
    }

    fn create_context(&self, _device: Handle) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::Context)?;
        Ok(st.alloc(Object::Context))
    }

    fn create_program_with_binary(&self, _context: &Handle, _device: Handle, binary: &[u8]) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::CreateProgram)?;
        st.artifact_len = Some(binary.len());
        Ok(st.alloc(Object::Program))
    }

    fn build_program(&self, _program: &Handle, _device: Handle, _options: &str) -> ClResult<()> {
        self.state.lock().check(Step::Build)
    }

    fn build_log(&self, _program: &Handle, _device: Handle) -> ClResult<String> {
        Ok(self.state.lock().build_log.clone())
    }

    fn create_command_queue(&self, _context: &Handle, _device: Handle) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::Queue)?;
        Ok(st.alloc(Object::Queue))
    }

    fn create_kernel(&self, _program: &Handle, name: &str) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::Kernel)?;
        st.kernel_name = Some(name.to_string());
        Ok(st.alloc(Object::Kernel))
    }

    fn create_buffer(&self, _context: &Handle, access: MemAccess, host: &[f32]) -> ClResult<Handle> {
        let mut st = self.state.lock();
        let call = st.buffer_calls;
        st.buffer_calls += 1;
        st.check(Step::Buffer(call))?;
        if host.is_empty() {
            return Err(ClStatus(-61));
        }
        let handle = st.alloc(Object::Buffer);
        st.buffers.insert(handle.0, (access, host.to_vec()));
        Ok(handle)
    }

    fn set_kernel_arg(&self, _kernel: &Handle, index: u32, arg: KernelArg<'_, Handle>) -> ClResult<()> {
        let mut st = self.state.lock();
        st.check(Step::SetArg(index))?;
        if index >= 10 {
            return Err(ClStatus::INVALID_ARG_INDEX);
        }
        let arg = match arg {
            KernelArg::Int(v) => Arg::Int(v),
            KernelArg::Float(v) => Arg::Float(v),
            KernelArg::Buffer(h) => Arg::Buffer(h.0),
        };
        st.args.insert(index, arg);
        Ok(())
    }

    fn enqueue_kernel(&self, _queue: &Handle, _kernel: &Handle, global_work_size: usize) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::Launch)?;
        st.launches.push(global_work_size);
        st.run_kernel()?;
        let event = st.alloc(Object::Event);
        st.launch_events.push(event.0);
        Ok(event)
    }

    unsafe fn enqueue_read_buffer(
        &self,
        _queue: &Handle,
        mem: &Handle,
        dst: &mut [f32],
        wait_for: &[&Handle],
    ) -> ClResult<Handle> {
        let mut st = self.state.lock();
        st.check(Step::Read)?;
        let (_, data) = st.buffers.get(&mem.0).ok_or(ClStatus(-38))?;
        if data.len() != dst.len() {
            return Err(ClStatus::INVALID_VALUE);
        }
        dst.copy_from_slice(data);
        let event = st.alloc(Object::Event);
        st.reads.push((event.0, wait_for.iter().map(|e| e.0).collect()));
        st.pending_reads.push(event.0);
        Ok(event)
    }

    fn wait_for_events(&self, events: &[&Handle]) -> ClResult<()> {
        let mut st = self.state.lock();
        st.check(Step::Wait)?;
        st.waited.extend(events.iter().map(|e| e.0));
        st.pending_reads.retain(|id| !events.iter().any(|e| e.0 == *id));
        Ok(())
    }

    fn finish(&self, _queue: &Handle) -> ClResult<()> {
        let mut st = self.state.lock();
        st.check(Step::Finish)?;
        st.finishes += 1;
        st.pending_reads.clear();
        Ok(())
    }

    fn release_event(&self, event: Handle) -> ClResult<()> {
        self.state.lock().free(event, Object::Event)
    }

    fn release_mem(&self, mem: Handle) -> ClResult<()> {
        self.state.lock().free(mem, Object::Buffer)
    }

    fn release_kernel(&self, kernel: Handle) -> ClResult<()> {
        self.state.lock().free(kernel, Object::Kernel)
    }

    fn release_queue(&self, queue: Handle) -> ClResult<()> {
        self.state.lock().free(queue, Object::Queue)
    }

    fn release_program(&self, program: Handle) -> ClResult<()> {
        self.state.lock().free(program, Object::Program)
    }

    fn release_context(&self, context: Handle) -> ClResult<()> {
        self.state.lock().free(context, Object::Context)
    }
}

static ARTIFACT_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Write `bytes` to a fresh file under the temp dir and return its path.
pub fn artifact_file(bytes: &[u8]) -> PathBuf {
    let seq = ARTIFACT_SEQ.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("clgemm_test_{}_{}.aocx", std::process::id(), seq));
    std::fs::write(&path, bytes).expect("write test artifact");
    path
}

/// Config pointing at a freshly written dummy artifact.
pub fn mock_config() -> RuntimeConfig {
    RuntimeConfig::default().with_artifact(artifact_file(&[0xAB; 4096]))
}

pub fn assert_close(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len(), "length mismatch: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!(
            (x - y).abs() < tol,
            "element {} differs: {} vs {} (tol={})",
            i, x, y, tol
        );
    }
}

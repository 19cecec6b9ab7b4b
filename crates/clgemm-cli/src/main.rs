use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;

use clgemm::{
    dispatch, host, is_opencl_available, AcceleratorRuntime, DeviceType, DispatchPath, MatrixView, MatrixViewMut,
    OrAbort, RuntimeConfig,
};

#[derive(Parser)]
#[command(
    name = "clgemm",
    about = "OpenCL GEMM offload tool",
    long_about = "Bring up an OpenCL accelerator from a precompiled kernel image and run\nC := alpha*A*B + C on it, falling back to the host when it is unavailable.",
    version
)]
struct Cli {
    /// JSON config file (artifact_path, kernel_name, device_type, build_options)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Kernel image to load; overrides the config and CLGEMM_ARTIFACT
    #[arg(long, global = true)]
    artifact: Option<PathBuf>,

    /// Device class: default, cpu, gpu, accelerator, all
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show the OpenCL loader, configuration and selected device
    Info,
    /// Compare one device GEMM against the host result
    Verify {
        /// Square matrix size
        #[arg(long, default_value = "64")]
        size: usize,
        /// Scale factor applied to A·B
        #[arg(long, default_value = "1.0")]
        alpha: f32,
    },
    /// Time device and host GEMM
    Bench {
        /// Matrix sizes to benchmark (comma-separated)
        #[arg(long, default_value = "64,128,256,512")]
        sizes: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = load_config(&cli);

    match cli.command {
        Commands::Info => cmd_info(config),
        Commands::Verify { size, alpha } => cmd_verify(config, size, alpha),
        Commands::Bench { sizes } => cmd_bench(config, &sizes),
    }
}

fn load_config(cli: &Cli) -> RuntimeConfig {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_json_file(path).or_abort(),
        None => RuntimeConfig::from_env(),
    };
    if let Some(path) = &cli.artifact {
        config = config.with_artifact(path);
    }
    if let Some(device) = &cli.device {
        let device: DeviceType = device.parse().or_abort();
        config = config.with_device_type(device);
    }
    tracing::debug!("effective config: {:?}", config);
    config
}

fn cmd_info(config: RuntimeConfig) {
    println!("clgemm v{}\n", env!("CARGO_PKG_VERSION"));

    println!("Platform");
    println!("  OS:     {}", std::env::consts::OS);
    println!("  Arch:   {}", std::env::consts::ARCH);
    println!("  OpenCL: {}", if is_opencl_available() { "[x] loader found" } else { "[ ] no loader" });

    let mut rt = AcceleratorRuntime::opencl(config);
    let config = rt.config();
    println!("\nConfig");
    println!("  artifact:      {}", config.artifact_path.display());
    println!("  kernel:        {}", config.kernel_name);
    println!("  device type:   {}", config.device_type);
    println!("  build options: {}", if config.build_options.is_empty() { "<none>" } else { config.build_options.as_str() });

    println!("\nRuntime");
    match rt.init() {
        Ok(()) => {
            println!("  state:  {}", rt.state());
            println!("  device: {}", rt.device_name().unwrap_or("<unknown>"));
            rt.deinit();
            println!("  released, state: {}", rt.state());
        }
        Err(e) => {
            println!("  state:  {}", rt.state());
            println!("  init failed: {}", e);
        }
    }
}

fn cmd_verify(config: RuntimeConfig, size: usize, alpha: f32) {
    let mut rt = AcceleratorRuntime::opencl(config);
    rt.init().or_abort();
    println!("Device: {} (kernel '{}')", rt.device_name().unwrap_or("<unknown>"), rt.config().kernel_name);

    let (m, n, k) = (size, size, size);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let a: Vec<f32> = (0..m * k).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let b: Vec<f32> = (0..k * n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let c0: Vec<f32> = (0..m * n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();

    let mut expected = c0.clone();
    let mut got = c0;
    let av = MatrixView::dense(&a, m, k).or_abort();
    let bv = MatrixView::dense(&b, k, n).or_abort();
    host::gemm_nn(alpha, &av, &bv, &mut MatrixViewMut::dense(&mut expected, m, n).or_abort()).or_abort();

    let start = Instant::now();
    let path = dispatch(&rt, alpha, &av, &bv, &mut MatrixViewMut::dense(&mut got, m, n).or_abort()).or_abort();
    let elapsed = start.elapsed();

    let max_diff = got
        .iter()
        .zip(&expected)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max);
    let tol = 1e-4 * k.max(1) as f32;

    println!("{}x{}x{} alpha={} on {:?} path in {:.3}ms", m, n, k, alpha, path, elapsed.as_secs_f64() * 1000.0);
    println!("max |device - host| = {:.3e} (tolerance {:.1e})", max_diff, tol);
    if max_diff > tol {
        eprintln!("Error: device result differs from host");
        std::process::exit(1);
    }
    println!("OK");
}

fn cmd_bench(config: RuntimeConfig, sizes_str: &str) {
    let sizes: Vec<usize> = sizes_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let mut rt = AcceleratorRuntime::opencl(config);
    if let Err(e) = rt.init() {
        println!("Accelerator unavailable ({}); timing host only\n", e);
    }

    println!("=== clgemm Benchmark ===");
    println!("{:<14} {:>12} {:>10} {:>14} {:>10}", "Size", "Host (ms)", "Host GF/s", "Device (ms)", "Dev GF/s");
    println!("{}", "-".repeat(64));

    for &sz in &sizes {
        let (m, n, k) = (sz, sz, sz);
        let a: Vec<f32> = (0..m * k).map(|i| ((i * 7 + 3) % 13) as f32 * 0.1 - 0.6).collect();
        let b: Vec<f32> = (0..k * n).map(|i| ((i * 11 + 5) % 17) as f32 * 0.1 - 0.8).collect();
        let mut c = vec![0.0f32; m * n];

        let av = MatrixView::dense(&a, m, k).or_abort();
        let bv = MatrixView::dense(&b, k, n).or_abort();
        let iters = if sz <= 128 { 50 } else if sz <= 256 { 10 } else { 3 };

        let host_s = time_it(iters, || {
            let mut cv = MatrixViewMut::dense(&mut c, m, n).or_abort();
            host::gemm_nn(1.0, &av, &bv, &mut cv).or_abort();
        });

        let device = if rt.is_ready() {
            let mut path = DispatchPath::Host;
            let secs = time_it(iters, || {
                let mut cv = MatrixViewMut::dense(&mut c, m, n).or_abort();
                path = dispatch(&rt, 1.0, &av, &bv, &mut cv).or_abort();
            });
            (path == DispatchPath::Device).then_some(secs)
        } else {
            None
        };

        let (dev_ms, dev_gf) = match device {
            Some(secs) => (format!("{:.3}ms", secs * 1000.0), format!("{:.2}", gflops(m, n, k, secs))),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<14} {:>10.3}ms {:>10.2} {:>14} {:>10}",
            format!("{}x{}x{}", m, n, k),
            host_s * 1000.0,
            gflops(m, n, k, host_s),
            dev_ms,
            dev_gf,
        );
    }
}

fn gflops(m: usize, n: usize, k: usize, secs: f64) -> f64 {
    (2.0 * m as f64 * n as f64 * k as f64) / secs / 1e9
}

fn time_it(iters: usize, mut f: impl FnMut()) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

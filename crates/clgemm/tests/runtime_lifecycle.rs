mod common;

use clgemm::{AcceleratorRuntime, ClStatus, DeviceType, GemmError, RuntimeConfig, RuntimeState};
use common::{artifact_file, mock_config, MockDriver, Object, Step};

const LONG_LIVED: [Object; 4] = [Object::Context, Object::Program, Object::Queue, Object::Kernel];

#[test]
fn test_init_brings_runtime_up() {
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), mock_config());
    assert_eq!(rt.state(), RuntimeState::Uninitialized);

    rt.init().unwrap();
    assert!(rt.is_ready());
    assert_eq!(rt.device_name(), Some("Mock FPGA"));

    let st = rt.driver().state.lock();
    for kind in LONG_LIVED {
        assert_eq!(st.created(kind), 1, "{:?}", kind);
        assert_eq!(st.released(kind), 0, "{:?}", kind);
    }
    assert_eq!(st.artifact_len, Some(4096));
    assert_eq!(st.kernel_name.as_deref(), Some("gemm_nn"));
    assert_eq!(st.device_type, Some(DeviceType::Default));
}

#[test]
fn test_init_is_idempotent() {
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), mock_config());
    rt.init().unwrap();
    rt.init().unwrap();
    assert!(rt.is_ready());

    let st = rt.driver().state.lock();
    for kind in LONG_LIVED {
        assert_eq!(st.created(kind), 1, "second init must not recreate {:?}", kind);
    }
}

#[test]
fn test_deinit_releases_everything() {
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), mock_config());
    rt.init().unwrap();
    rt.deinit();
    assert_eq!(rt.state(), RuntimeState::Uninitialized);
    assert_eq!(rt.device_name(), None);

    let st = rt.driver().state.lock();
    for kind in LONG_LIVED {
        assert_eq!(st.released(kind), 1, "{:?}", kind);
    }
    assert!(st.live.is_empty());
}

#[test]
fn test_deinit_release_failure_is_not_fatal() {
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), mock_config());
    rt.init().unwrap();
    rt.driver().fail_at(Step::Release(Object::Queue), ClStatus::OUT_OF_RESOURCES);

    rt.deinit();
    assert_eq!(rt.state(), RuntimeState::Uninitialized);
    assert_eq!(rt.device_name(), None);

    let st = rt.driver().state.lock();
    assert_eq!(st.released(Object::Kernel), 1);
    assert_eq!(st.released(Object::Queue), 0);
    assert_eq!(st.released(Object::Program), 1);
    assert_eq!(st.released(Object::Context), 1);
}

#[test]
fn test_deinit_without_init_is_noop() {
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), mock_config());
    rt.deinit();
    rt.deinit();
    assert_eq!(rt.state(), RuntimeState::Uninitialized);
    assert!(rt.driver().state.lock().released.is_empty());
}

#[test]
fn test_reinit_after_deinit() {
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), mock_config());
    rt.init().unwrap();
    rt.deinit();
    rt.init().unwrap();
    assert!(rt.is_ready());

    let st = rt.driver().state.lock();
    assert_eq!(st.created(Object::Kernel), 2);
    assert_eq!(st.released(Object::Kernel), 1);
}

#[test]
fn test_init_failure_at_each_step() {
    let cases = [
        (Step::Platform, "Failed to get Platform ID"),
        (Step::Device, "Failed to get Device ID"),
        (Step::Context, "Failed to create the context"),
        (Step::CreateProgram, "Failed to create program"),
        (Step::Queue, "Failed to create command queue"),
        (Step::Kernel, "Failed to create kernel"),
    ];

    for (step, message) in cases {
        let driver = MockDriver::failing_at(step, ClStatus::OUT_OF_RESOURCES);
        let mut rt = AcceleratorRuntime::new(driver, mock_config());

        let err = rt.init().unwrap_err();
        let text = err.to_string();
        assert!(text.contains(message), "{:?}: unexpected error '{}'", step, text);
        assert!(text.contains("CL_OUT_OF_RESOURCES"), "{:?}: '{}'", step, text);
        assert_eq!(err.status(), Some(ClStatus::OUT_OF_RESOURCES));
        assert_eq!(rt.state(), RuntimeState::Uninitialized);

        let st = rt.driver().state.lock();
        for kind in LONG_LIVED {
            assert!(st.balanced(kind), "{:?}: {:?} leaked", step, kind);
        }
        assert!(st.live.is_empty(), "{:?}: live handles {:?}", step, st.live);
    }
}

#[test]
fn test_build_failure_carries_log() {
    let driver = MockDriver::failing_at(Step::Build, ClStatus::BUILD_PROGRAM_FAILURE);
    driver.state.lock().build_log = "error: kernel image built for a different board".to_string();
    let mut rt = AcceleratorRuntime::new(driver, mock_config());

    match rt.init().unwrap_err() {
        GemmError::Build { status, log } => {
            assert_eq!(status, ClStatus::BUILD_PROGRAM_FAILURE);
            assert!(log.contains("different board"));
        }
        other => panic!("expected build error, got {:?}", other),
    }
    assert!(!rt.is_ready());

    let st = rt.driver().state.lock();
    assert_eq!(st.released(Object::Program), 1);
    assert_eq!(st.released(Object::Context), 1);
    assert_eq!(st.created(Object::Queue), 0);
}

#[test]
fn test_init_recovers_after_failure() {
    let driver = MockDriver::failing_at(Step::Kernel, ClStatus::INVALID_KERNEL_NAME);
    let mut rt = AcceleratorRuntime::new(driver, mock_config());
    assert!(rt.init().is_err());

    rt.driver().clear_failure();
    rt.init().unwrap();
    assert!(rt.is_ready());
}

#[test]
fn test_missing_artifact() {
    let config = RuntimeConfig::default().with_artifact("/nonexistent/clgemm/gemm.aocx");
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), config);

    let err = rt.init().unwrap_err();
    assert!(matches!(err, GemmError::Artifact { .. }), "{:?}", err);
    assert_eq!(rt.state(), RuntimeState::Uninitialized);

    let st = rt.driver().state.lock();
    assert_eq!(st.created(Object::Program), 0);
    assert!(st.balanced(Object::Context));
}

#[test]
fn test_empty_artifact() {
    let config = RuntimeConfig::default().with_artifact(artifact_file(b""));
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), config);

    let err = rt.init().unwrap_err();
    assert!(matches!(err, GemmError::EmptyArtifact { .. }), "{:?}", err);
    assert!(rt.driver().state.lock().live.is_empty());
}

#[test]
fn test_artifact_loaded_in_full() {
    let bytes: Vec<u8> = (0..65_537u32).map(|i| (i % 7) as u8).collect();
    let config = RuntimeConfig::default().with_artifact(artifact_file(&bytes));
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), config);
    rt.init().unwrap();
    assert_eq!(rt.driver().state.lock().artifact_len, Some(bytes.len()));
}

#[test]
fn test_configured_kernel_and_device_type() {
    let config = mock_config().with_kernel_name("sgemm_tiled").with_device_type(DeviceType::Accelerator);
    let mut rt = AcceleratorRuntime::new(MockDriver::new(), config);
    rt.init().unwrap();

    let st = rt.driver().state.lock();
    assert_eq!(st.kernel_name.as_deref(), Some("sgemm_tiled"));
    assert_eq!(st.device_type, Some(DeviceType::Accelerator));
}

#[test]
fn test_drop_releases_resources() {
    let driver = MockDriver::new();
    {
        let mut rt = AcceleratorRuntime::new(driver.clone(), mock_config());
        rt.init().unwrap();
    }
    let st = driver.state.lock();
    for kind in LONG_LIVED {
        assert!(st.balanced(kind), "{:?} leaked on drop", kind);
    }
    assert!(st.live.is_empty());
}

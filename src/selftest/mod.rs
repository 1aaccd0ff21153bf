//! Hardware and runtime self-test (`echo-infer check`).

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

pub mod hardware;
pub mod runtime;

use crate::backend::{AcceleratorSdk, KernelDriverSdk};
use crate::config::EchoConfig;
use crate::platform::HostInfo;
use crate::preprocess::{default_audio_decoders, default_vision_decoders};

pub const ACCELERATED_INFERENCE: &str = "Accelerated Inference";
pub const CPU_INFERENCE: &str = "CPU Inference";
pub const VISION_PREPROCESSING: &str = "Vision Preprocessing";
pub const AUDIO_PREPROCESSING: &str = "Audio Preprocessing";

/// Run the full self-test suite against the current host.
pub fn run(config: &EchoConfig) -> SelfTestReport {
    let sdk = KernelDriverSdk::from_config(&config.accelerator);
    run_with(&HostInfo::current(), &sdk)
}

/// Run the self-test suite against an explicit host and accelerator SDK.
pub fn run_with(host: &HostInfo, sdk: &dyn AcceleratorSdk) -> SelfTestReport {
    info!("Self-test: checking platform, accelerator and runtimes...");

    let mut results = Vec::new();

    // 1. Platform
    results.push(hardware::check_platform(host));

    // 2. Board
    match hardware::check_board() {
        Ok(res) => results.push(res),
        Err(e) => results.push(ComponentResult {
            component: "Board".to_string(),
            status: TestStatus::Warning,
            details: format!("Failed to inspect board: {}", e),
            remediation: None,
        }),
    }

    // 3. Accelerator SDK + devices
    let sdk_present = hardware::sdk_present(sdk);
    results.push(hardware::check_accelerator_sdk(host, sdk_present));
    match hardware::check_accelerator_devices(host, sdk, sdk_present) {
        Ok(res) => results.push(res),
        Err(e) => results.push(ComponentResult {
            component: "Accelerator Devices".to_string(),
            status: TestStatus::Fail,
            details: format!("Failed to query accelerator devices: {}", e),
            remediation: Some("Check permissions on the accelerator device nodes.".to_string()),
        }),
    }

    // 4. CPU runtimes
    results.push(runtime::check_onnx());
    results.push(runtime::check_tflite());

    // 5. Media decoders
    results.push(runtime::check_image_decoder(&default_vision_decoders()));
    results.push(runtime::check_audio_decoder(&default_audio_decoders()));

    info!("Self-test complete. {} check(s) run.", results.len());

    let readiness = calculate_readiness(&results);
    SelfTestReport {
        host: host.clone(),
        accelerator_sdk_missing: host.supports_accelerator() && !sdk_present,
        results,
        readiness,
    }
}

#[derive(Debug, Serialize)]
pub struct SelfTestReport {
    pub host: HostInfo,
    pub results: Vec<ComponentResult>,
    /// Capability name -> ready
    pub readiness: BTreeMap<String, bool>,
    /// The host can take the accelerator but its SDK is absent; action required.
    pub accelerator_sdk_missing: bool,
}

impl SelfTestReport {
    pub fn status_of(&self, component: &str) -> Option<&TestStatus> {
        self.results
            .iter()
            .find(|r| r.component == component)
            .map(|r| &r.status)
    }

    /// Process exit code for `check`: 1 when the accelerator SDK is missing on
    /// a host that supports it, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.accelerator_sdk_missing {
            1
        } else {
            0
        }
    }
}

fn calculate_readiness(results: &[ComponentResult]) -> BTreeMap<String, bool> {
    let passed = |name: &str| {
        results
            .iter()
            .any(|r| r.component == name && r.status == TestStatus::Pass)
    };

    let mut map = BTreeMap::new();
    map.insert(
        ACCELERATED_INFERENCE.to_string(),
        passed("Platform") && passed("Accelerator SDK") && passed("Accelerator Devices"),
    );
    map.insert(
        CPU_INFERENCE.to_string(),
        passed("ONNX Runtime") || passed("TFLite Runtime"),
    );
    map.insert(VISION_PREPROCESSING.to_string(), passed("Image Decoder"));
    map.insert(AUDIO_PREPROCESSING.to_string(), passed("Audio Decoder"));
    map
}

/// Self-test result for a single component.
#[derive(Debug, Serialize, Clone)]
pub struct ComponentResult {
    pub component: String,
    pub status: TestStatus,
    pub details: String,
    pub remediation: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
    Warning,
    Skipped,
}

impl TestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Warning => "WARN",
            TestStatus::Skipped => "SKIP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(component: &str, status: TestStatus) -> ComponentResult {
        ComponentResult {
            component: component.to_string(),
            status,
            details: String::new(),
            remediation: None,
        }
    }

    #[test]
    fn test_readiness_cpu_only_host() {
        let results = vec![
            result("Platform", TestStatus::Skipped),
            result("Accelerator SDK", TestStatus::Skipped),
            result("ONNX Runtime", TestStatus::Fail),
            result("TFLite Runtime", TestStatus::Pass),
            result("Image Decoder", TestStatus::Pass),
            result("Audio Decoder", TestStatus::Fail),
        ];
        let map = calculate_readiness(&results);
        assert_eq!(map.len(), 4);
        assert!(!map[ACCELERATED_INFERENCE]);
        assert!(map[CPU_INFERENCE]);
        assert!(map[VISION_PREPROCESSING]);
        assert!(!map[AUDIO_PREPROCESSING]);
    }

    #[test]
    fn test_readiness_accelerated() {
        let results = vec![
            result("Platform", TestStatus::Pass),
            result("Accelerator SDK", TestStatus::Pass),
            result("Accelerator Devices", TestStatus::Pass),
        ];
        assert!(calculate_readiness(&results)[ACCELERATED_INFERENCE]);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(TestStatus::Pass.label(), "PASS");
        assert_eq!(TestStatus::Warning.label(), "WARN");
        assert_eq!(TestStatus::Skipped.label(), "SKIP");
    }
}

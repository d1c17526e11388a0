//! Test configuration helpers

use serde_json::json;
use std::path::Path;
use swift_output::OutputConfig;

/// Container every test writes to
pub const TEST_CONTAINER: &str = "embulk_output";

/// TempAuth configuration staging into `staging_dir`
///
/// Retry waits are kept short so failure paths finish quickly in real time.
pub fn tempauth_config(auth_url: &str, staging_dir: &Path) -> OutputConfig {
    serde_json::from_value(json!({
        "auth_type": "tempauth",
        "auth_url": auth_url,
        "username": "test:tester",
        "password": "testing",
        "container": TEST_CONTAINER,
        "path_prefix": "logs/part",
        "file_ext": "csv",
        "staging_dir": staging_dir,
        "max_connection_retry": 3,
        "initial_retry_wait": 10,
        "max_retry_wait": 40
    }))
    .unwrap_or_else(|e| panic!("invalid test config: {e}"))
}

/// Keystone configuration without any tenant setting
pub fn keystone_without_tenant(staging_dir: &Path) -> OutputConfig {
    let mut config = tempauth_config("http://127.0.0.1:9/v2.0/tokens", staging_dir);
    config.auth_type = "keystone".to_string();
    config
}

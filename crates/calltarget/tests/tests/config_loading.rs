//! Configuration loading from files and `CALLTARGET_*` environment variables.
//!
//! Kept in its own test binary, and in a single test, because environment
//! variables are process-global.

use std::fs;

use calltarget_invoker::{Invoker, InvokerConfig};

#[test]
fn file_then_environment_layering() {
    // Defaults when neither source is present.
    let config = InvokerConfig::load(Some("/nonexistent/calltarget")).unwrap();
    assert!(config.enabled);
    assert!(config.disabled_integrations.is_empty());
    assert_eq!(config.logging.level, "info");

    // File values override defaults.
    let path = std::env::temp_dir().join(format!("calltarget-{}.toml", std::process::id()));
    fs::write(
        &path,
        r#"
disabled_integrations = ["redis", "grpc"]

[logging]
level = "calltarget=debug"
json = true
"#,
    )
    .unwrap();
    let file = path.to_str().unwrap();
    let config = InvokerConfig::load(Some(file)).unwrap();
    assert_eq!(config.disabled_integrations, ["redis", "grpc"]);
    assert_eq!(config.logging.level, "calltarget=debug");
    assert!(config.logging.json);
    assert!(config.logging.timestamps);

    // Environment overrides the file.
    std::env::set_var("CALLTARGET_ENABLED", "false");
    std::env::set_var("CALLTARGET_LOGGING__LEVEL", "warn");
    let config = InvokerConfig::load(Some(file)).unwrap();
    std::env::remove_var("CALLTARGET_ENABLED");
    std::env::remove_var("CALLTARGET_LOGGING__LEVEL");
    fs::remove_file(&path).unwrap();

    assert!(!config.enabled);
    assert_eq!(config.logging.level, "warn");
    assert!(!config.is_integration_enabled("http.client"));

    let invoker = Invoker::new(config);
    assert!(!invoker.config().enabled);
}

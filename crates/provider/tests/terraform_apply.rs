use std::path::{Path, PathBuf};
use std::process::Command;

fn in_path(bin: &str) -> bool {
    Command::new("sh")
        .arg("-lc")
        .arg(format!("command -v {bin} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn terraform(dir: &Path, cli_config: &Path, args: &[&str]) -> std::process::ExitStatus {
    Command::new("terraform")
        .args(args)
        .env("TF_CLI_CONFIG_FILE", cli_config)
        .current_dir(dir)
        .status()
        .unwrap_or_else(|e| panic!("run terraform {}: {e}", args.join(" ")))
}

/// Terraform Acceptance Smoke Test
///
/// Points Terraform at the freshly built provider through `dev_overrides`,
/// applies the demo configuration against a real Corellium account, checks
/// the follow-up plan is empty, then destroys everything.
///
/// Marked ignored because it needs Terraform and creates real objects.
#[test]
#[ignore]
fn demo_configuration_applies_cleanly() {
    if !in_path("terraform") {
        eprintln!("Skipping: terraform not available in PATH");
        return;
    }
    if std::env::var("CORELLIUM_API_TOKEN").map_or(true, |t| t.is_empty()) {
        eprintln!("Skipping: CORELLIUM_API_TOKEN is not set");
        return;
    }

    let binary = PathBuf::from(env!("CARGO_BIN_EXE_terraform-provider-corellium"));
    let binary_dir = binary.parent().expect("provider binary has a parent dir");

    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root");
    let demo_source = workspace_root.join("demos").join("terraform");

    // Work on a copy so state files never land in the source tree
    let work = tempfile::tempdir().expect("temp dir");
    std::fs::copy(demo_source.join("main.tf"), work.path().join("main.tf")).expect("copy main.tf");

    let cli_config = work.path().join("dev.tfrc");
    std::fs::write(
        &cli_config,
        format!(
            "provider_installation {{\n  dev_overrides {{\n    \"corellium/corellium\" = \"{}\"\n  }}\n  direct {{}}\n}}\n",
            binary_dir.display()
        ),
    )
    .expect("write CLI config");

    let status = terraform(work.path(), &cli_config, &["apply", "-auto-approve", "-input=false"]);
    assert!(status.success(), "terraform apply failed: {status}");

    let status = terraform(work.path(), &cli_config, &["plan", "-detailed-exitcode", "-input=false"]);
    let code = status.code().unwrap_or(1);

    let destroyed = terraform(work.path(), &cli_config, &["destroy", "-auto-approve", "-input=false"]);

    assert_eq!(code, 0, "expected no diff after apply; terraform plan exit code was {code}");
    assert!(destroyed.success(), "terraform destroy failed: {destroyed}");
}

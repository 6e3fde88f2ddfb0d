//! Integration tests for the `finance-mcp` binary.

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect and debug output for readability"
)]
mod tests {
    use std::process::Command;

    /// Command for the built binary with every optional variable set but empty,
    /// as an env file with `NAME=` lines produces.
    fn command_with_empty_env() -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_finance-mcp"));
        let _cmd = cmd
            .env("MONOBANK_API_TOKEN", "")
            .env("WISE_API_TOKEN", "")
            .env("WISE_PROFILE_ID", "")
            .env("MCP_AUTH_TOKEN", "")
            .env("RUST_LOG", "warn");
        cmd
    }

    #[test]
    fn empty_env_values_do_not_block_startup() {
        let out_dir = tempfile::tempdir().expect("temp dir");
        let output = command_with_empty_env()
            .args(["report", "--days", "1", "--banks", "mono", "--output-dir"])
            .arg(out_dir.path())
            .output()
            .expect("binary runs");
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Weekly Spending Report"), "{stdout}");

        let saved: Vec<String> = std::fs::read_dir(out_dir.path())
            .expect("output dir readable")
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(saved.len(), 1, "{saved:?}");
        let name = saved.first().expect("one report");
        assert!(name.starts_with("spending_"), "{name}");
        assert!(name.ends_with("_1d_mono.md"), "{name}");
    }

    #[test]
    fn malformed_profile_id_is_rejected() {
        let output = command_with_empty_env()
            .env("WISE_PROFILE_ID", "not-a-number")
            .args(["report", "--days", "1", "--banks", "mono"])
            .output()
            .expect("binary runs");
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("wise-profile-id"), "{stderr}");
    }
}

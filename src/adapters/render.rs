use std::time::Duration;

use crate::error::ScrapeError;

/// Grace added on top of the configured render timeout before the worker
/// gives up on the child process itself.
const RENDER_KILL_GRACE_MS: u64 = 5_000;

/// Fetch a JS-rendered page by shelling out to an external headless
/// browser command. The command is expected to print the rendered HTML on
/// stdout:
///
/// ```text
/// <render_cmd> --url <url> --timeout-ms <ms> [--wait-for <selector>]
/// ```
///
/// All failures here are fetch errors: the page may render fine on the
/// next run.
pub async fn render_page(
    render_cmd: &str,
    url: &str,
    wait_for: Option<&str>,
    timeout_ms: u64,
) -> Result<String, ScrapeError> {
    let mut cmd = tokio::process::Command::new(render_cmd);
    cmd.arg("--url")
        .arg(url)
        .arg("--timeout-ms")
        .arg(timeout_ms.to_string());
    if let Some(selector) = wait_for {
        cmd.arg("--wait-for").arg(selector);
    }
    cmd.kill_on_drop(true);

    let deadline = Duration::from_millis(timeout_ms + RENDER_KILL_GRACE_MS);
    let output = tokio::time::timeout(deadline, cmd.output())
        .await
        .map_err(|_| ScrapeError::Fetch(format!("render of {url} timed out")))?
        .map_err(|e| ScrapeError::Fetch(format!("failed to run {render_cmd}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScrapeError::Fetch(format!(
            "{render_cmd} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| ScrapeError::Fetch(format!("render output is not UTF-8: {e}")))
}

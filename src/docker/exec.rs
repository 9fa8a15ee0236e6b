use anyhow::{Context, Result};
use bollard::container::LogOutput;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::ExecConfig;
use bollard::Docker;
use futures_util::StreamExt;

/// Bytes of output kept for diagnostics.
const OUTPUT_TAIL: usize = 2048;

/// Result of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// `-1` when the daemon did not report a code.
    pub exit_code: i64,
    /// Tail of stdout and stderr, interleaved as received.
    pub output: String,
}

/// Run `cmd` in a running container and wait for it to finish.
pub async fn exec_in_container(
    docker: &Docker,
    container: &str,
    cmd: Vec<String>,
) -> Result<ExecOutput> {
    let config = ExecConfig {
        cmd: Some(cmd),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    };
    let exec = docker
        .create_exec(container, config)
        .await
        .with_context(|| format!("creating exec in {}", container))?;

    let started = docker
        .start_exec(
            &exec.id,
            Some(StartExecOptions {
                detach: false,
                ..Default::default()
            }),
        )
        .await
        .with_context(|| format!("starting exec in {}", container))?;

    let mut output = String::new();
    if let StartExecResults::Attached { output: mut stream, .. } = started {
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                    if output.len() > OUTPUT_TAIL * 2 {
                        let cut = output.len() - OUTPUT_TAIL;
                        let cut = (cut..output.len())
                            .find(|i| output.is_char_boundary(*i))
                            .unwrap_or(output.len());
                        output.drain(..cut);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(container = %container, "exec stream error: {}", e);
                    break;
                }
            }
        }
    }

    let exit_code = docker
        .inspect_exec(&exec.id)
        .await
        .with_context(|| format!("inspecting exec in {}", container))?
        .exit_code
        .unwrap_or(-1);
    Ok(ExecOutput { exit_code, output })
}

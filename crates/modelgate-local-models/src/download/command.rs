use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use modelgate_common::ModelId;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Downloader;
use crate::error::DownloadError;

/// Longest stderr excerpt kept in an error
const MAX_STDERR_CHARS: usize = 2000;

/// Runs an external command-line tool to fetch a model.
///
/// Argument templates may contain `{model}` (the identifier) and `{dest}`
/// (the target directory). The tool is expected to leave the model in `dest`.
#[derive(Debug, Clone)]
pub struct CommandDownloader {
    program: String,
    args: Vec<String>,
}

impl CommandDownloader {
    /// Create a downloader for `program` with argument templates
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `mlc_llm download-model --model-name {model}`
    pub fn mlc_llm() -> Self {
        Self::new(
            "mlc_llm",
            vec![
                "download-model".to_string(),
                "--model-name".to_string(),
                "{model}".to_string(),
            ],
        )
    }

    /// Program that will be executed
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with placeholders substituted
    pub fn render_args(&self, model: &ModelId, dest: &Path) -> Vec<String> {
        let dest = dest.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", model.as_str())
                    .replace("{dest}", &dest)
            })
            .collect()
    }
}

#[async_trait]
impl Downloader for CommandDownloader {
    fn name(&self) -> &str {
        "command"
    }

    async fn download(&self, model: &ModelId, dest: &Path) -> Result<(), DownloadError> {
        let args = self.render_args(model, dest);
        info!(model = %model, program = %self.program, args = ?args, "Running download command");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = tail_chars(stderr.trim(), MAX_STDERR_CHARS);
            warn!(model = %model, status = %output.status, "Download command failed");
            return Err(DownloadError::CommandFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        debug!(
            model = %model,
            stdout_bytes = output.stdout.len(),
            "Download command finished"
        );
        Ok(())
    }
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        text.chars().skip(count - max).collect()
    }
}

use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

use super::{Detector, PhotoImage, RawDetection};

/// Runs an external detector: image bytes on stdin, a JSON array of detections
/// on stdout.
pub struct CommandDetector {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: &str, args: &[String]) -> Result<Self> {
        let program = program.trim();
        if program.is_empty() {
            bail!("detector command is empty");
        }
        let Some(resolved) = resolve_program(program) else {
            bail!("detector command not available: {program}");
        };
        Ok(Self {
            program: resolved,
            args: args.to_vec(),
        })
    }
}

impl Detector for CommandDetector {
    fn describe(&self) -> String {
        if self.args.is_empty() {
            format!("command:{}", self.program.display())
        } else {
            format!("command:{} {}", self.program.display(), self.args.join(" "))
        }
    }

    fn detect(&self, image: &PhotoImage) -> Result<Vec<RawDetection>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute {}", self.program.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .context("detector stdin was not captured")?;
        let bytes = image.bytes();
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(bytes));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .map_err(|_| anyhow::anyhow!("detector stdin writer panicked"))?;
            if let Err(error) = written
                && error.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(error).context("failed to write image to detector stdin");
            }
            output.context("failed to wait for detector")
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} returned non-zero exit status: {}",
                self.program.display(),
                stderr.trim()
            );
        }

        serde_json::from_slice::<Vec<RawDetection>>(&output.stdout).with_context(|| {
            format!(
                "failed to parse detections from {}",
                self.program.display()
            )
        })
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_rejected_at_construction() {
        let error = CommandDetector::new("definitely-not-a-real-detector-binary", &[])
            .err()
            .expect("unknown program should fail");
        assert!(error.to_string().contains("not available"));
        assert!(CommandDetector::new("  ", &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn parses_detections_from_stdout() {
        let detector = CommandDetector::new(
            "/bin/sh",
            &[
                "-c".to_string(),
                r#"cat > /dev/null; echo '[{"x":0.1,"y":0.2,"w":0.1,"h":0.05,"text":"77","confidence":0.8}]'"#
                    .to_string(),
            ],
        )
        .expect("sh should be available");

        let detections = detector
            .detect(&PhotoImage::new(vec![0_u8; 4096]))
            .expect("command detector should succeed");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text.as_deref(), Some("77"));
        assert_eq!(detections[0].confidence, Some(0.8));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        let detector = CommandDetector::new(
            "/bin/sh",
            &["-c".to_string(), "echo boom >&2; exit 3".to_string()],
        )
        .expect("sh should be available");

        let error = detector
            .detect(&PhotoImage::new(Vec::new()))
            .err()
            .expect("failing command should error");
        assert!(error.to_string().contains("boom"));
    }
}

//! Adapter for the external flow-extraction tool (CICFlowMeter-style):
//! `tool <capture.pcap> <output_dir>` writes `<capture.pcap>_Flow.csv` into
//! `output_dir`. The tool's naming is not fully reliable, so when the expected
//! file is absent the newest CSV in the output directory is used instead.

use crate::config::ExtractorConfig;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("flow extraction tool not found at {0}")]
    ToolNotFound(PathBuf),
    #[error("failed to launch flow extraction tool: {0}")]
    Launch(#[source] std::io::Error),
    #[error("cannot create flow output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot resolve {path} against the working directory: {source}")]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Exit code, or `None` when the tool was killed by a signal
    #[error("flow extraction tool exited with code {0:?}")]
    ExtractionFailed(Option<i32>),
    #[error("flow extraction produced no CSV in {0}")]
    OutputMissing(PathBuf),
}

pub struct ExternalFlowExtractor {
    tool_path: PathBuf,
    working_dir: Option<PathBuf>,
    output_suffix: String,
}

impl ExternalFlowExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        // The launcher resolves its jars relative to its own directory
        let working_dir = config
            .working_dir
            .clone()
            .or_else(|| config.tool_path.parent().filter(|p| !p.as_os_str().is_empty()).map(Path::to_path_buf));
        Self {
            tool_path: config.tool_path.clone(),
            working_dir,
            output_suffix: config.output_suffix.clone(),
        }
    }

    pub fn tool_path(&self) -> &Path {
        &self.tool_path
    }

    /// File name the tool is documented to produce for `capture_path`
    pub fn expected_output(&self, capture_path: &Path, output_dir: &Path) -> PathBuf {
        let name = capture_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        output_dir.join(format!("{}{}", name, self.output_suffix))
    }

    /// Run the tool synchronously and return the path of the flow table it wrote.
    pub fn extract(&self, capture_path: &Path, output_dir: &Path) -> Result<PathBuf, ExtractionError> {
        if !self.tool_path.is_file() {
            return Err(ExtractionError::ToolNotFound(self.tool_path.clone()));
        }
        std::fs::create_dir_all(output_dir).map_err(|source| ExtractionError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;
        // The tool runs from its own directory, so relative paths would not resolve
        let capture_path = absolute(capture_path)?;
        let output_dir = absolute(output_dir)?;
        let tool = absolute(&self.tool_path)?;
        let (capture_path, output_dir) = (capture_path.as_path(), output_dir.as_path());

        let mut cmd = Command::new(&tool);
        cmd.arg(capture_path).arg(output_dir);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output().map_err(ExtractionError::Launch)?;
        debug!(
            tool = %self.tool_path.display(),
            capture = %capture_path.display(),
            stdout = %String::from_utf8_lossy(&output.stdout),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "flow extraction tool finished"
        );
        if !output.status.success() {
            return Err(ExtractionError::ExtractionFailed(output.status.code()));
        }

        let expected = self.expected_output(capture_path, output_dir);
        if expected.is_file() {
            return Ok(expected);
        }
        match newest_csv(output_dir) {
            Some(found) => {
                warn!(
                    expected = %expected.display(),
                    found = %found.display(),
                    "flow table not at expected name; using newest csv in output dir"
                );
                Ok(found)
            }
            None => Err(ExtractionError::OutputMissing(output_dir.to_path_buf())),
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ExtractionError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| ExtractionError::ResolvePath {
            path: path.to_path_buf(),
            source,
        })
}

fn newest_csv(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("csv")))
        .map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, p)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(tool: &Path) -> ExternalFlowExtractor {
        ExternalFlowExtractor::new(&ExtractorConfig {
            tool_path: tool.to_path_buf(),
            working_dir: None,
            output_suffix: "_Flow.csv".into(),
        })
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("cfm");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn missing_tool_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(&dir.path().join("no-such-tool"));
        let err = ex.extract(&dir.path().join("capture_0.pcap"), dir.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::ToolNotFound(_)));
    }

    #[test]
    fn unusable_output_dir_is_not_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("cfm");
        std::fs::write(&tool, b"").unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = extractor(&tool)
            .extract(&dir.path().join("capture_0.pcap"), &blocker.join("flows"))
            .unwrap_err();
        match err {
            ExtractionError::OutputDir { path, .. } => assert_eq!(path, blocker.join("flows")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let resolved = absolute(Path::new("work/batch_0")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("work/batch_0"));
    }

    #[test]
    fn expected_name_keeps_pcap_extension() {
        let ex = extractor(Path::new("/opt/cfm/bin/cfm"));
        assert_eq!(
            ex.expected_output(Path::new("/w/batch_3/capture_3.pcap"), Path::new("/w/batch_3/flows")),
            PathBuf::from("/w/batch_3/flows/capture_3.pcap_Flow.csv")
        );
    }

    #[cfg(unix)]
    #[test]
    fn finds_output_by_documented_name() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), r#"echo "a,b" > "$2/$(basename "$1")_Flow.csv""#);
        let out = dir.path().join("flows");
        let capture = dir.path().join("capture_7.pcap");
        std::fs::write(&capture, b"").unwrap();

        let path = extractor(&tool).extract(&capture, &out).unwrap();
        assert_eq!(path, out.join("capture_7.pcap_Flow.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn falls_back_to_newest_csv() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), r#"echo "a,b" > "$2/renamed.csv"; echo x > "$2/notes.txt""#);
        let out = dir.path().join("flows");
        let capture = dir.path().join("capture_1.pcap");
        std::fs::write(&capture, b"").unwrap();

        let path = extractor(&tool).extract(&capture, &out).unwrap();
        assert_eq!(path, out.join("renamed.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_reports_code() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), "exit 3");
        let err = extractor(&tool)
            .extract(&dir.path().join("capture_0.pcap"), &dir.path().join("flows"))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ExtractionFailed(Some(3))));
    }

    #[cfg(unix)]
    #[test]
    fn no_csv_is_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), "true");
        let err = extractor(&tool)
            .extract(&dir.path().join("capture_0.pcap"), &dir.path().join("flows"))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::OutputMissing(_)));
    }
}

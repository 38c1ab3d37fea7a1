//! Doc tool implementation.
//!
//! Read-only views over text documents in the sandbox: windowed reads,
//! size statistics and a Markdown heading outline. All file access goes
//! through the same `FileSystemDriver` as the disk tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::disk::FileSystemDriver;
use super::dispatch::Dispatcher;
use super::Tool;
use crate::error::{ActionFailure, ToolError};

const DEFAULT_READ_LIMIT: usize = 2000;

pub static DOC_ACTIONS: ActionSet = ActionSet {
    tool: "doc",
    params: &[
        ParamSpec {
            name: "path",
            kind: ParamKind::String,
            description: "Document path relative to the sandbox root",
        },
        ParamSpec {
            name: "offset",
            kind: ParamKind::Integer,
            description: "First line to return, 1-based (default: 1)",
        },
        ParamSpec {
            name: "limit",
            kind: ParamKind::Integer,
            description: "Maximum number of lines to return (default: 2000)",
        },
    ],
    actions: &[
        ActionSpec {
            name: "read",
            description: "Read a window of lines from a document",
            required: &["path"],
            optional: &["offset", "limit"],
        },
        ActionSpec {
            name: "stats",
            description: "Count lines, words, characters and bytes",
            required: &["path"],
            optional: &[],
        },
        ActionSpec {
            name: "outline",
            description: "List Markdown headings with their level and line",
            required: &["path"],
            optional: &[],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: String,
}

/// A Markdown heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: usize,
    pub title: String,
    /// 1-based line number.
    pub line: usize,
}

pub struct DocTool {
    driver: Arc<dyn FileSystemDriver>,
    dispatcher: Dispatcher,
}

impl DocTool {
    pub fn new(driver: Arc<dyn FileSystemDriver>, dispatcher: Dispatcher) -> Self {
        Self { driver, dispatcher }
    }
}

#[async_trait]
impl Tool for DocTool {
    fn description(&self) -> &str {
        "Inspect text documents in the sandbox: read a range of lines, \
         get size statistics, or list the Markdown outline."
    }

    fn actions(&self) -> &'static ActionSet {
        &DOC_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "read" => {
                let p: ReadParams = decode(action, params)?;
                let text = self.driver.read(&p.path).await?;
                let offset = p.offset.unwrap_or(1);
                let limit = p.limit.unwrap_or(DEFAULT_READ_LIMIT);
                Ok(read_window(&text, offset, limit)?)
            }
            "stats" => {
                let p: PathParams = decode(action, params)?;
                let text = self.driver.read(&p.path).await?;
                let bytes = text.len() as u64;
                Ok(json!({
                    "path": p.path,
                    "lines": text.lines().count(),
                    "words": text.split_whitespace().count(),
                    "chars": text.chars().count(),
                    "bytes": bytes,
                    "size": format_size(bytes),
                }))
            }
            "outline" => {
                let p: PathParams = decode(action, params)?;
                let text = self.driver.read(&p.path).await?;
                let headings = outline(&text);
                Ok(json!({
                    "path": p.path,
                    "count": headings.len(),
                    "headings": headings,
                }))
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &DOC_ACTIONS.names(),
            )
            .into()),
        }
    }
}

fn read_window(text: &str, offset: usize, limit: usize) -> Result<Value, ActionFailure> {
    if offset == 0 {
        return Err(ActionFailure::invalid_parameter("'offset' is 1-based and must be at least 1"));
    }
    if limit == 0 {
        return Err(ActionFailure::invalid_parameter("'limit' must be at least 1"));
    }

    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    if offset > total.max(1) {
        return Err(ActionFailure::invalid_parameter(format!(
            "'offset' {} is past the end of the document ({} lines)",
            offset, total
        )));
    }

    let start = offset - 1;
    let end = start.saturating_add(limit).min(total);
    Ok(json!({
        "content": lines[start..end].join("\n"),
        "start_line": offset,
        "end_line": end,
        "total_lines": total,
    }))
}

/// ATX headings (`#` to `######`), skipping fenced code blocks.
pub fn outline(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut fence: Option<&str> = None;

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }

        let level = trimmed.chars().take_while(|c| *c == '#').count();
        if !(1..=6).contains(&level) {
            continue;
        }
        let rest = &trimmed[level..];
        if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
            continue;
        }
        let title = rest.trim().trim_end_matches('#').trim_end();
        headings.push(Heading {
            level,
            title: title.to_string(),
            line: index + 1,
        });
    }
    headings
}

/// Format a byte count as a human-readable size.
fn format_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::disk::LocalFileSystem;

    fn setup() -> (tempfile::TempDir, DocTool, std::path::PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::open(temp.path().join("sandbox")).unwrap();
        let root = fs.sandbox().root().to_path_buf();
        let tool = DocTool::new(Arc::new(fs), Dispatcher::default());
        (temp, tool, root)
    }

    #[tokio::test]
    async fn test_read_window() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("notes.txt"), "one\ntwo\nthree\nfour\nfive\n").unwrap();

        let result = tool
            .execute("read", json!({ "path": "notes.txt", "offset": 2, "limit": 2 }))
            .await
            .unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["content"], "two\nthree");
        assert_eq!(data["start_line"], 2);
        assert_eq!(data["end_line"], 3);
        assert_eq!(data["total_lines"], 5);
    }

    #[tokio::test]
    async fn test_read_huge_limit_clamps_to_end() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("a.txt"), "one\ntwo\nthree\n").unwrap();

        let result = tool
            .execute("read", json!({ "path": "a.txt", "offset": 2, "limit": u64::MAX }))
            .await
            .unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["content"], "two\nthree");
        assert_eq!(data["start_line"], 2);
        assert_eq!(data["end_line"], 3);
    }

    #[tokio::test]
    async fn test_read_whole_file_by_default() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("a.txt"), "x\ny").unwrap();
        let result = tool.execute("read", json!({ "path": "a.txt" })).await.unwrap();
        assert_eq!(result.data().unwrap()["content"], "x\ny");
    }

    #[tokio::test]
    async fn test_read_offset_past_end() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("a.txt"), "x\n").unwrap();
        let result = tool
            .execute("read", json!({ "path": "a.txt", "offset": 10 }))
            .await
            .unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::InvalidParameter));
    }

    #[tokio::test]
    async fn test_read_empty_file() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("empty.txt"), "").unwrap();
        let result = tool.execute("read", json!({ "path": "empty.txt" })).await.unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["content"], "");
        assert_eq!(data["total_lines"], 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("s.txt"), "hello world\nsecond line here\n").unwrap();
        let result = tool.execute("stats", json!({ "path": "s.txt" })).await.unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["lines"], 2);
        assert_eq!(data["words"], 5);
        assert_eq!(data["bytes"], 29);
        assert_eq!(data["size"], "29 B");
    }

    #[tokio::test]
    async fn test_outline_tool() {
        let (_temp, tool, root) = setup();
        std::fs::write(root.join("README.md"), "# Title\n\ntext\n## Usage\n").unwrap();
        let result = tool.execute("outline", json!({ "path": "README.md" })).await.unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["count"], 2);
        assert_eq!(data["headings"][1]["title"], "Usage");
        assert_eq!(data["headings"][1]["line"], 4);
    }

    #[tokio::test]
    async fn test_escape_is_security_violation() {
        let (_temp, tool, _root) = setup();
        let err = tool.execute("stats", json!({ "path": "../secret" })).await.unwrap_err();
        assert_eq!(err.path, "../secret");
    }

    #[test]
    fn test_outline_skips_code_fences() {
        let text = "# Top\n```sh\n# not a heading\n```\n### Deep ###\n#nospace\n####### seven\n";
        let headings = outline(text);
        assert_eq!(
            headings,
            vec![
                Heading {
                    level: 1,
                    title: "Top".to_string(),
                    line: 1
                },
                Heading {
                    level: 3,
                    title: "Deep".to_string(),
                    line: 5
                },
            ]
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1_048_576), "1.0 MB");
    }
}

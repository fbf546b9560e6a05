//! Parsers for the text conventions agents answer in.
//!
//! Agents write files as `FILE: <path>` followed by a fenced block, list
//! modules as `MODULE:` lines or a JSON `modules` block, and report tests as
//! `TEST <name>: PASS|FAIL` lines or a JSON `tests` block.

use crate::core::{is_safe_relative_path, FileSet, TestVerdict};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

// Patterns are string literals; compiling them cannot fail at runtime.
#[allow(clippy::expect_used)]
static FILE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#+[ \t]*)?FILE:[ \t]*(.+?)[ \t]*$").expect("valid regex")
});

#[allow(clippy::expect_used)]
static MODULE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*[-*]?[ \t]*MODULE:[ \t]*(.+?)[ \t]*$").expect("valid regex")
});

#[allow(clippy::expect_used)]
static TEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*[-*]?[ \t]*TEST[ \t]+(.+?)[ \t]*:[ \t]*(PASS(?:ED)?|FAIL(?:ED)?)\b[ \t]*(?:[-:][ \t]*(.*?))?[ \t]*$",
    )
    .expect("valid regex")
});

/// A `FILE:` section whose path would escape the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafePath(pub String);

/// A complete fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FencedBlock<'a> {
    /// First word of the opening fence's info string, possibly empty.
    tag: &'a str,
    /// Text between the opening and closing fence lines.
    content: &'a str,
    /// Byte offset of the opening fence line.
    start: usize,
    /// Byte offset just past the closing fence line.
    end: usize,
}

struct OpenFence<'a> {
    ticks: usize,
    tag: &'a str,
    start: usize,
    content_start: usize,
    depth: usize,
}

/// Splits a fence line into its backtick count and info string.
fn fence_line(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim();
    let ticks = trimmed.len() - trimmed.trim_start_matches('`').len();
    (ticks >= 3).then(|| (ticks, trimmed[ticks..].trim()))
}

/// Scans `text` for complete fenced blocks, in order.
///
/// A block closes on a bare fence at least as long as its opening fence.
/// Inside a block, a tagged fence of that length opens a nested block that
/// the next bare fence closes, so a markdown file can quote shell snippets
/// with plain triple backticks. Unclosed blocks are dropped.
fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut open: Option<OpenFence<'_>> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let Some((ticks, info)) = fence_line(line) else {
            continue;
        };

        match open.as_mut() {
            None => {
                open = Some(OpenFence {
                    ticks,
                    tag: info.split_whitespace().next().unwrap_or(""),
                    start: line_start,
                    content_start: offset,
                    depth: 0,
                });
            }
            Some(fence) if ticks < fence.ticks => {}
            Some(fence) if !info.is_empty() => fence.depth += 1,
            Some(fence) if fence.depth > 0 => fence.depth -= 1,
            Some(_) => {
                if let Some(fence) = open.take() {
                    blocks.push(FencedBlock {
                        tag: fence.tag,
                        content: &text[fence.content_start..line_start],
                        start: fence.start,
                        end: offset,
                    });
                }
            }
        }
    }

    blocks
}

/// Pairs each `FILE:` header outside a code block with the first complete
/// block that follows it before the next header. Returns the raw path and
/// the index of the claimed block.
fn file_sections<'a>(text: &'a str, blocks: &[FencedBlock<'a>]) -> Vec<(&'a str, usize)> {
    let inside_block = |pos: usize| blocks.iter().any(|b| b.start <= pos && pos < b.end);
    let headers: Vec<_> = FILE_HEADER
        .captures_iter(text)
        .filter_map(|caps| Some((caps.get(0)?, caps.get(1)?)))
        .filter(|(whole, _)| !inside_block(whole.start()))
        .collect();

    headers
        .iter()
        .enumerate()
        .filter_map(|(i, (whole, path))| {
            let limit = headers
                .get(i + 1)
                .map_or(text.len(), |(next, _)| next.start());
            let index = blocks
                .iter()
                .position(|b| b.start >= whole.end() && b.start < limit)?;
            Some((path.as_str(), index))
        })
        .collect()
}

/// Extracts `FILE:` sections.
///
/// Each section's content is its first complete code block, without the
/// fence lines. Sections without a block are skipped. Later sections for
/// the same path win.
pub fn parse_file_sections(text: &str) -> Result<FileSet, UnsafePath> {
    let blocks = fenced_blocks(text);
    let mut files = FileSet::new();

    for (path, index) in file_sections(text, &blocks) {
        let path = path
            .trim_matches(|c| c == '`' || c == '*' || c == '"')
            .trim();
        if !is_safe_relative_path(path) {
            return Err(UnsafePath(path.to_string()));
        }
        let content = blocks[index]
            .content
            .trim_end_matches(['\n', '\r', ' ', '\t']);
        files.insert(path.trim_start_matches("./").to_string(), content.to_string());
    }

    Ok(files)
}

/// Returns the first JSON object carrying `key`, from a `json` or untagged
/// fenced block outside any `FILE:` section, or else from the whole text.
pub fn extract_json_field(text: &str, key: &str) -> Option<Value> {
    let blocks = fenced_blocks(text);
    let claimed: Vec<usize> = file_sections(text, &blocks)
        .into_iter()
        .map(|(_, index)| index)
        .collect();
    let fenced = blocks
        .iter()
        .enumerate()
        .filter(|(i, block)| {
            !claimed.contains(i) && (block.tag.is_empty() || block.tag.eq_ignore_ascii_case("json"))
        })
        .map(|(_, block)| block.content);

    fenced
        .chain(std::iter::once(text.trim()))
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find_map(|value| value.get(key).cloned())
}

/// Parses the module list of an architecture document.
pub fn parse_modules(text: &str) -> Vec<String> {
    if let Some(Value::Array(items)) = extract_json_field(text, "modules") {
        let modules: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.trim().to_string()),
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|n| n.trim().to_string()),
                _ => None,
            })
            .filter(|name| !name.is_empty())
            .collect();
        if !modules.is_empty() {
            return modules;
        }
    }

    MODULE_LINE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parses per-test verdicts from a testing report.
pub fn parse_verdicts(text: &str) -> Vec<TestVerdict> {
    if let Some(Value::Array(items)) = extract_json_field(text, "tests") {
        let verdicts: Vec<TestVerdict> = items.iter().filter_map(verdict_from_json).collect();
        if !verdicts.is_empty() {
            return verdicts;
        }
    }

    TEST_LINE
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let passed = caps.get(2)?.as_str().to_ascii_uppercase().starts_with("PASS");
            let details = caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .filter(|d| !d.is_empty());
            Some(TestVerdict {
                name,
                passed,
                details,
            })
        })
        .collect()
}

fn verdict_from_json(item: &Value) -> Option<TestVerdict> {
    let name = item.get("name")?.as_str()?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let passed = match (item.get("passed"), item.get("status")) {
        (Some(Value::Bool(passed)), _) => *passed,
        (_, Some(Value::String(status))) => {
            let status = status.to_ascii_lowercase();
            status == "pass" || status == "passed"
        }
        _ => return None,
    };
    let details = item
        .get("details")
        .or_else(|| item.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(TestVerdict {
        name,
        passed,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_file_sections() {
        let text = "Here are the files.\n\nFILE: src/main.py\n```python\nprint('hi')\n```\n\n\
                    FILE: ./README.md\n```markdown\n# App\n\nUsage\n```\n";
        let files = parse_file_sections(text).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files["src/main.py"], "print('hi')");
        assert_eq!(files["README.md"], "# App\n\nUsage");
    }

    #[test]
    fn test_file_section_keeps_inner_fences() {
        let text = "FILE: docs/guide.md\n```markdown\nRun:\n```sh\nmake\n```\n```\n";
        let files = parse_file_sections(text).unwrap();
        assert_eq!(files["docs/guide.md"], "Run:\n```sh\nmake\n```");
    }

    #[test]
    fn test_file_section_without_fence_skipped() {
        let files = parse_file_sections("FILE: notes.txt\njust prose").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_markdown_heading_and_backticks_in_header() {
        let text = "### FILE: `app/models.py`\n```python\nclass User: ...\n```";
        let files = parse_file_sections(text).unwrap();
        assert!(files.contains_key("app/models.py"));
    }

    #[test]
    fn test_unsafe_path_rejected() {
        let err = parse_file_sections("FILE: ../../etc/cron\n```\nx\n```").unwrap_err();
        assert_eq!(err, UnsafePath("../../etc/cron".into()));
    }

    #[test]
    fn test_parse_modules_from_json_block() {
        let text = "Design:\n```json\n{\"modules\": [\"api\", {\"name\": \"storage\"}, \"\"]}\n```";
        assert_eq!(parse_modules(text), vec!["api", "storage"]);
    }

    #[test]
    fn test_parse_modules_from_lines() {
        let text = "# Architecture\nMODULE: cli - entry point\n- MODULE: core\nprose";
        assert_eq!(parse_modules(text), vec!["cli - entry point", "core"]);
    }

    #[test]
    fn test_parse_modules_empty() {
        assert!(parse_modules("# Architecture\nNo list here").is_empty());
    }

    #[test]
    fn test_parse_verdicts_from_lines() {
        let text = "TEST test_add: PASS\nTEST test_div: FAIL - ZeroDivisionError\ntest_sub: passed";
        let verdicts = parse_verdicts(text);

        assert_eq!(
            verdicts,
            vec![
                TestVerdict::pass("test_add"),
                TestVerdict::fail("test_div", "ZeroDivisionError"),
            ]
        );
    }

    #[test]
    fn test_parse_verdicts_from_json() {
        let text = r#"{"tests": [
            {"name": "test_login", "passed": true},
            {"name": "test_logout", "status": "failed", "details": "401"}
        ]}"#;
        let verdicts = parse_verdicts(text);

        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].passed);
        assert_eq!(verdicts[1], TestVerdict::fail("test_logout", "401"));
    }

    #[test]
    fn test_extract_json_field_prefers_fenced_block() {
        let text = "```json\n{\"tests\": []}\n```\n{\"modules\": [\"x\"]}";
        assert_eq!(extract_json_field(text, "tests"), Some(serde_json::json!([])));
        assert!(extract_json_field(text, "modules").is_none());
    }

    #[test]
    fn test_json_block_after_tagged_fences() {
        let text = "Layout:\n```text\nsrc/\n  api.py\n```\n\nDiagram:\n```mermaid\ngraph TD\n```\n\n\
                    ```json\n{\"modules\": [\"api\"]}\n```";
        assert_eq!(parse_modules(text), vec!["api"]);
    }

    #[test]
    fn test_file_section_stops_at_its_closing_fence() {
        let text = "FILE: t.py\n```python\nassert 1\n```\n\n\
                    ```json\n{\"tests\": [{\"name\": \"t\", \"passed\": true}]}\n```";

        let files = parse_file_sections(text).unwrap();
        assert_eq!(files["t.py"], "assert 1");
        assert_eq!(parse_verdicts(text), vec![TestVerdict::pass("t")]);
    }

    #[test]
    fn test_json_inside_file_section_is_not_a_report() {
        let text = "FILE: fixtures/report.json\n```json\n{\"tests\": [{\"name\": \"x\", \"passed\": false}]}\n```\n\
                    TEST test_real: PASS";
        assert_eq!(parse_verdicts(text), vec![TestVerdict::pass("test_real")]);
    }

    #[test]
    fn test_file_header_inside_block_is_content() {
        let text = "FILE: README.md\n```markdown\nFormat:\nFILE: <path>\n```\n";
        let files = parse_file_sections(text).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["README.md"], "Format:\nFILE: <path>");
    }

    #[test]
    fn test_long_fences() {
        let cases = [
            ("FILE: a.py\n````\n", None),
            ("FILE: a.py\n````\n```", None),
            ("FILE: a.py\n```", None),
            (
                "FILE: README.md\n````markdown\n# App\n```sh\nmake\n```\n````\n",
                Some("# App\n```sh\nmake\n```"),
            ),
            ("FILE: a.py\n````python\nx = 1\n```\n````", Some("x = 1\n```")),
        ];

        for (text, expected) in cases {
            let files = parse_file_sections(text).unwrap();
            let path = files.keys().next().cloned();
            assert_eq!(
                path.as_ref().map(|p| files[p].as_str()),
                expected,
                "input: {text:?}"
            );
        }
    }

    #[test]
    fn test_fence_scan_of_unclosed_blocks() {
        assert!(fenced_blocks("```json\n{\"tests\": []}").is_empty());
        assert_eq!(extract_json_field("```json\n{\"tests\": []}", "tests"), None);
        let blocks = fenced_blocks("```\na\n```\n```rust\nb\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "a\n");
    }
}

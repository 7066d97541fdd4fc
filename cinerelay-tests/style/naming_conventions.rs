//! Naming Convention Checker
//!
//! Flags banned function prefixes, role-only type suffixes, generic module
//! names and malformed `# Errors` doc sections in the gateway crates.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct NamingViolation {
    file_path: String,
    line_number: usize,
    kind: &'static str,
    message: String,
}

struct NamingChecker {
    violations: Vec<NamingViolation>,
    files_checked: usize,
}

const BANNED_FUNCTION_PREFIXES: [(&str, &str); 3] = [
    ("get_", "Use the noun directly: source.url() not source.get_url()"),
    ("set_", "Use a descriptive verb: with_access_policy() not set_policy()"),
    ("handle_", "Be specific: stream_media() not handle_stream()"),
];

const BANNED_TYPE_SUFFIXES: [(&str, &str); 2] = [
    ("Factory", "Use a plain new() or from_config() constructor"),
    ("Service", "Name what it is: StreamProxy, not StreamingService"),
];

/// Acceptable on traits, not on structs and enums.
const ROLE_TYPE_SUFFIXES: [&str; 4] = ["Manager", "Handler", "Processor", "Controller"];

const BANNED_MODULE_NAMES: [&str; 5] = ["utils", "common", "helpers", "misc", "stuff"];

impl NamingChecker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
            files_checked: 0,
        }
    }

    fn record(&mut self, file_path: &Path, line_number: usize, kind: &'static str, message: String) {
        self.violations.push(NamingViolation {
            file_path: file_path.display().to_string(),
            line_number,
            kind,
            message,
        });
    }

    fn find_rust_files(root: &Path, files: &mut Vec<PathBuf>, depth: usize) -> std::io::Result<()> {
        if depth > 6 {
            return Ok(());
        }
        if let Some(name) = root.file_name() {
            let name = name.to_string_lossy();
            if name == "target" || name.starts_with('.') {
                return Ok(());
            }
        }
        // Only the gateway crates; the workspace root also holds unrelated trees.
        if depth == 1 && !root.to_string_lossy().contains("cinerelay") {
            return Ok(());
        }

        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::find_rust_files(&path, files, depth + 1)?;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    fn check_function_prefixes(&mut self, file_path: &Path, content: &str) {
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            let is_fn = ["pub fn ", "pub async fn ", "fn ", "async fn ", "pub(crate) fn "]
                .iter()
                .any(|start| trimmed.starts_with(start));
            if !is_fn {
                continue;
            }
            for (prefix, correction) in BANNED_FUNCTION_PREFIXES {
                if trimmed.contains(&format!("fn {prefix}")) {
                    self.record(
                        file_path,
                        index + 1,
                        "BANNED_FUNCTION_PREFIX",
                        format!("Function uses banned prefix '{prefix}'. {correction}"),
                    );
                }
            }
        }
    }

    fn check_type_naming(&mut self, file_path: &Path, content: &str) {
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            let mut words = trimmed.split_whitespace();
            let mut keyword = words.next().unwrap_or("");
            if keyword == "pub" {
                keyword = words.next().unwrap_or("");
            }
            if !matches!(keyword, "struct" | "enum" | "trait") {
                continue;
            }
            let Some(name) = words.next() else {
                continue;
            };
            let name = name
                .split(['<', '{', '(', ';', ':'])
                .next()
                .unwrap_or("")
                .trim();

            for (suffix, message) in BANNED_TYPE_SUFFIXES {
                if name.ends_with(suffix) {
                    self.record(
                        file_path,
                        index + 1,
                        "BANNED_TYPE_SUFFIX",
                        format!("Type '{name}' uses banned '{suffix}' suffix. {message}"),
                    );
                }
            }
            if keyword != "trait" {
                for suffix in ROLE_TYPE_SUFFIXES {
                    if name.ends_with(suffix) {
                        self.record(
                            file_path,
                            index + 1,
                            "VERBOSE_TYPE_SUFFIX",
                            format!("Type '{name}' names a role via '{suffix}', name what it is"),
                        );
                    }
                }
            }
        }
    }

    fn check_module_name(&mut self, file_path: &Path) {
        let Some(stem) = file_path.file_stem() else {
            return;
        };
        let stem = stem.to_string_lossy();
        if BANNED_MODULE_NAMES.contains(&stem.as_ref()) {
            self.record(
                file_path,
                1,
                "BANNED_MODULE_NAME",
                format!("Module name '{stem}' is too generic, name its purpose"),
            );
        }
    }

    /// Every `# Errors` section needs a blank line, then `- `Type` - condition` bullets.
    fn check_errors_sections(&mut self, file_path: &Path, content: &str) {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        for (index, line) in lines.iter().enumerate() {
            if *line != "/// # Errors" {
                continue;
            }
            if lines.get(index + 1) != Some(&"///") {
                self.record(
                    file_path,
                    index + 1,
                    "INVALID_DOC_FORMAT",
                    "# Errors section must be followed by blank line: `///`".to_string(),
                );
                continue;
            }

            let mut bullets = 0;
            for (offset, doc) in lines[index + 2..].iter().enumerate() {
                let Some(text) = doc.strip_prefix("///") else {
                    break;
                };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if text.starts_with("# ") {
                    break;
                }
                let well_formed = text
                    .strip_prefix("- ")
                    .is_some_and(|bullet| bullet.starts_with('`') && bullet.contains("` - "));
                if !well_formed {
                    self.record(
                        file_path,
                        index + 3 + offset,
                        "INVALID_DOC_FORMAT",
                        "Use format `- ErrorType - condition` with backticks around error type"
                            .to_string(),
                    );
                }
                bullets += 1;
            }
            if bullets == 0 {
                self.record(
                    file_path,
                    index + 1,
                    "INVALID_DOC_FORMAT",
                    "# Errors section cannot be empty - list specific error types".to_string(),
                );
            }
        }
    }

    fn check_file(&mut self, file_path: &Path) -> std::io::Result<()> {
        // This file quotes violations in its own test cases.
        if file_path.ends_with("naming_conventions.rs") {
            return Ok(());
        }
        let content = fs::read_to_string(file_path)?;

        self.check_function_prefixes(file_path, &content);
        self.check_type_naming(file_path, &content);
        self.check_module_name(file_path);
        self.check_errors_sections(file_path, &content);

        self.files_checked += 1;
        Ok(())
    }

    fn check_workspace(&mut self) -> std::io::Result<()> {
        let mut files = Vec::new();
        Self::find_rust_files(Path::new(".."), &mut files, 0)?;
        for file in files {
            self.check_file(&file)?;
        }
        Ok(())
    }

    fn report(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}:{}:{} - {}", v.file_path, v.line_number, v.kind, v.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[test]
fn test_banned_function_prefixes() {
    let mut checker = NamingChecker::new();
    let code = r#"
impl StreamSession {
    pub fn get_id(&self) -> Uuid { self.id }
    pub fn set_quality(&mut self, q: String) { }
    pub async fn handle_range(&self) { }
    pub fn record_bytes(&mut self, n: usize) { }
    fn process_get_request(&self) { }
}
"#;
    checker.check_function_prefixes(Path::new("session.rs"), code);

    assert_eq!(checker.violations.len(), 3);
    assert!(checker.violations.iter().all(|v| v.kind == "BANNED_FUNCTION_PREFIX"));
    assert_eq!(checker.violations[0].line_number, 3);
}

#[test]
fn test_type_suffixes() {
    let mut checker = NamingChecker::new();
    let code = r#"
pub struct StreamingService {
}
struct ProxyFactory;
pub enum RelayController {
}
pub trait EventHandler: Send + Sync {
}
pub struct StreamProxy {
}
"#;
    checker.check_type_naming(Path::new("types.rs"), code);

    let names: Vec<&str> = checker.violations.iter().map(|v| v.kind).collect();
    assert_eq!(
        names,
        vec!["BANNED_TYPE_SUFFIX", "BANNED_TYPE_SUFFIX", "VERBOSE_TYPE_SUFFIX"]
    );
    assert!(!checker.report().contains("EventHandler"));
}

#[test]
fn test_generic_module_names() {
    let mut checker = NamingChecker::new();
    for name in ["utils.rs", "helpers.rs", "relay.rs", "mod.rs", "probe.rs"] {
        checker.check_module_name(Path::new(name));
    }
    assert_eq!(checker.violations.len(), 2);
}

#[test]
fn test_errors_section_format() {
    let mut checker = NamingChecker::new();
    let code = r#"
/// Good.
///
/// # Errors
///
/// - `StreamingError::UpstreamTimeout` - No headers in time
pub fn good() {}

/// # Errors
/// - `StreamingError::UpstreamTimeout` - Missing blank line
pub fn no_blank() {}

/// # Errors
///
/// Returns an error when upstream fails
pub fn prose() {}
"#;
    checker.check_errors_sections(Path::new("proxy.rs"), code);

    assert_eq!(checker.violations.len(), 2, "{}", checker.report());
    assert_eq!(checker.violations[0].line_number, 9);
    assert_eq!(checker.violations[1].line_number, 15);
}

#[test]
fn naming_convention_enforcement() {
    let mut checker = NamingChecker::new();
    checker
        .check_workspace()
        .expect("Failed to scan workspace sources");

    assert!(checker.files_checked > 0, "no sources found to check");
    assert!(
        checker.violations.is_empty(),
        "Naming convention violations found:\n{}",
        checker.report()
    );
}

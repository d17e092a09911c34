//! Tool policy engine
//!
//! Pre- and post-checks around tool invocations: a command allowlist for
//! shell-like tools, a path sandbox under the project root, sensitive-content
//! scanning (field names plus credential-shaped patterns), and truncation of
//! oversized outputs. Modes: `off` bypasses everything, `log_only` downgrades
//! `block` findings to `warn`, `enforce` returns them as-is; the caller
//! decides whether to abort the tool call.

use crate::config::{Settings, ToolPolicyMode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Outcome class of one policy finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Warn,
    Block,
}

/// One policy finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResult {
    pub action: PolicyAction,
    pub policy: String,
    pub reason: String,
    pub details: serde_json::Value,
}

/// Tool invocation under evaluation
#[derive(Debug, Clone)]
pub struct ToolPolicyContext {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub session_id: Option<String>,
    pub run_id: Option<String>,
}

/// Result of the post-tool check: the (possibly truncated) result + findings
#[derive(Debug, Clone)]
pub struct PostPolicyResult {
    pub result: serde_json::Value,
    pub findings: Vec<PolicyResult>,
}

const PATH_KEYS: &[&str] = &[
    "path", "paths", "file", "files", "filepath", "filename", "source", "target", "src", "dst",
    "dir", "directory", "cwd", "workdir", "output_dir", "input_path", "output_path",
];

const SHELL_TOOL_HINTS: &[&str] = &["shell", "exec", "command", "terminal", "bash"];

const SENSITIVE_FIELD_NAMES: &[&str] =
    &["api_key", "token", "secret", "password", "authorization", "auth"];

/// Policy engine over tool invocations
pub struct ToolPolicyService {
    enabled: bool,
    mode: ToolPolicyMode,
    allowed_cmd_prefixes: HashSet<String>,
    large_output_bytes: usize,
    project_root: PathBuf,
    sensitive_patterns: Vec<(&'static str, Regex)>,
}

impl ToolPolicyService {
    pub fn new(settings: &Settings, project_root: PathBuf) -> Self {
        let sensitive_patterns = vec![
            (
                "provider_key",
                Regex::new(r"\bsk-[A-Za-z0-9]{20,}\b").expect("static regex"),
            ),
            (
                "aws_access_key",
                Regex::new(r"\bAKIA[0-9A-Z]{16}\b").expect("static regex"),
            ),
            (
                "bearer_token",
                Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9\-\._=]{16,}\b").expect("static regex"),
            ),
            (
                "credential_assignment",
                Regex::new(r#"(?i)\b(api[_-]?key|token|secret|password)\b\s*[:=]\s*['"]?[A-Za-z0-9_\-\.]{8,}"#)
                    .expect("static regex"),
            ),
        ];

        Self {
            enabled: settings.tool_policy_enabled,
            mode: settings.tool_policy_mode,
            allowed_cmd_prefixes: settings
                .tool_policy_allowed_cmd_prefixes
                .iter()
                .map(|prefix| prefix.trim().to_string())
                .filter(|prefix| !prefix.is_empty())
                .collect(),
            large_output_bytes: settings.tool_policy_large_output_bytes.max(1024),
            project_root,
            sensitive_patterns,
        }
    }

    /// Evaluate an invocation before the tool runs
    pub fn pre_tool_use(&self, context: &ToolPolicyContext) -> Vec<PolicyResult> {
        if !self.enabled || self.mode == ToolPolicyMode::Off {
            return Vec::new();
        }

        let mut findings = Vec::new();
        if let Some(finding) = self.check_command_allowlist(context) {
            findings.push(self.apply_mode(finding));
        }
        if let Some(finding) = self.check_path_boundary(&context.arguments) {
            findings.push(self.apply_mode(finding));
        }
        if let Some(finding) = self.check_sensitive_content(&context.arguments, "arguments") {
            findings.push(self.apply_mode(finding));
        }
        findings
    }

    /// Scan and possibly truncate a tool result after it ran
    pub fn post_tool_use(
        &self,
        _context: &ToolPolicyContext,
        result: serde_json::Value,
    ) -> PostPolicyResult {
        if !self.enabled || self.mode == ToolPolicyMode::Off {
            return PostPolicyResult {
                result,
                findings: Vec::new(),
            };
        }

        let mut findings = Vec::new();
        if let Some(finding) = self.check_sensitive_content(&result, "result") {
            findings.push(self.apply_mode(finding));
        }
        let (result, truncation) = self.truncate_large_output(result);
        if let Some(finding) = truncation {
            findings.push(self.apply_mode(finding));
        }
        PostPolicyResult { result, findings }
    }

    fn apply_mode(&self, finding: PolicyResult) -> PolicyResult {
        if self.mode == ToolPolicyMode::LogOnly && finding.action == PolicyAction::Block {
            return PolicyResult {
                action: PolicyAction::Warn,
                ..finding
            };
        }
        finding
    }

    fn is_shell_tool(&self, tool_name: &str) -> bool {
        let lowered = tool_name.trim().to_lowercase();
        !lowered.is_empty() && SHELL_TOOL_HINTS.iter().any(|hint| lowered.contains(hint))
    }

    fn extract_command(arguments: &serde_json::Value) -> Option<String> {
        if let Some(command) = arguments.as_str() {
            return Some(command.to_string());
        }
        let map = arguments.as_object()?;
        for key in ["cmd", "command"] {
            if let Some(value) = map.get(key).and_then(|value| value.as_str()) {
                if !value.trim().is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        if let Some(args) = map.get("args").and_then(|value| value.as_array()) {
            let parts: Vec<&str> = args.iter().filter_map(|item| item.as_str()).collect();
            if !parts.is_empty() && parts.len() == args.len() {
                return Some(parts.join(" "));
            }
        }
        map.get("value")
            .and_then(|value| value.as_str())
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.to_string())
    }

    fn check_command_allowlist(&self, context: &ToolPolicyContext) -> Option<PolicyResult> {
        if !self.is_shell_tool(&context.tool_name) {
            return None;
        }
        let command = Self::extract_command(&context.arguments)?;
        let first_token = command.split_whitespace().next()?;
        let command_prefix = first_token.rsplit('/').next().unwrap_or(first_token);

        if self.allowed_cmd_prefixes.contains(command_prefix) {
            return None;
        }

        let mut allowed: Vec<&String> = self.allowed_cmd_prefixes.iter().collect();
        allowed.sort();
        Some(PolicyResult {
            action: PolicyAction::Block,
            policy: "command_allowlist".to_string(),
            reason: format!("Command '{command_prefix}' not in allowed prefixes"),
            details: serde_json::json!({
                "command_prefix": command_prefix,
                "allowed_prefixes": allowed,
            }),
        })
    }

    fn check_path_boundary(&self, value: &serde_json::Value) -> Option<PolicyResult> {
        let mut candidates = Vec::new();
        collect_candidate_paths(value, &mut candidates);

        for candidate in candidates {
            let normalized = candidate.trim();
            if normalized.is_empty() || normalized.contains("://") {
                continue;
            }

            let raw = Path::new(normalized);
            let absolute = if raw.is_absolute() {
                raw.to_path_buf()
            } else {
                self.project_root.join(raw)
            };
            let resolved = normalize_path(&absolute);

            if !resolved.starts_with(&self.project_root) {
                return Some(PolicyResult {
                    action: PolicyAction::Block,
                    policy: "path_boundary".to_string(),
                    reason: format!("Path '{normalized}' is outside project directory"),
                    details: serde_json::json!({
                        "path": normalized,
                        "resolved_path": resolved.to_string_lossy(),
                        "project_root": self.project_root.to_string_lossy(),
                    }),
                });
            }
        }
        None
    }

    fn check_sensitive_content(
        &self,
        value: &serde_json::Value,
        location: &str,
    ) -> Option<PolicyResult> {
        let mut fields = Vec::new();
        collect_fields(value, &mut fields);
        for (field_name, field_value) in &fields {
            let lowered = field_name.to_lowercase();
            if SENSITIVE_FIELD_NAMES.contains(&lowered.as_str()) && has_non_empty_value(field_value)
            {
                return Some(PolicyResult {
                    action: PolicyAction::Block,
                    policy: "sensitive_content".to_string(),
                    reason: format!("Sensitive field '{field_name}' detected in {location}"),
                    details: serde_json::json!({"location": location, "field": field_name}),
                });
            }
        }

        let text = value.to_string();
        for (pattern_name, pattern) in &self.sensitive_patterns {
            if pattern.is_match(&text) {
                return Some(PolicyResult {
                    action: PolicyAction::Block,
                    policy: "sensitive_content".to_string(),
                    reason: format!(
                        "Sensitive content pattern '{pattern_name}' detected in {location}"
                    ),
                    details: serde_json::json!({"location": location, "pattern": pattern_name}),
                });
            }
        }
        None
    }

    fn truncate_large_output(
        &self,
        mut result: serde_json::Value,
    ) -> (serde_json::Value, Option<PolicyResult>) {
        let Some(output) = result.get("output") else {
            return (result, None);
        };
        let text = match output.as_str() {
            Some(text) => text.to_string(),
            None => output.to_string(),
        };
        let size = text.len();
        if size <= self.large_output_bytes {
            return (result, None);
        }

        let preview_limit = (self.large_output_bytes / 4).clamp(256, 2048);
        let preview_end = (0..=preview_limit.min(text.len()))
            .rev()
            .find(|&index| text.is_char_boundary(index))
            .unwrap_or(0);
        let truncated = serde_json::json!({
            "truncated": true,
            "preview": &text[..preview_end],
            "original_size": size,
            "max_size": self.large_output_bytes,
        });
        if let Some(map) = result.as_object_mut() {
            map.insert("output".to_string(), truncated);
        }

        let finding = PolicyResult {
            action: PolicyAction::Warn,
            policy: "large_output_truncate".to_string(),
            reason: "Tool output exceeded configured size limit and was truncated".to_string(),
            details: serde_json::json!({
                "original_size": size,
                "max_size": self.large_output_bytes,
            }),
        };
        (result, Some(finding))
    }
}

fn collect_candidate_paths(value: &serde_json::Value, collected: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                if PATH_KEYS.contains(&key.to_lowercase().as_str()) {
                    match item {
                        serde_json::Value::String(path) => collected.push(path.clone()),
                        serde_json::Value::Array(items) => {
                            for part in items {
                                if let Some(path) = part.as_str() {
                                    collected.push(path.to_string());
                                }
                            }
                        }
                        _ => {}
                    }
                } else {
                    collect_candidate_paths(item, collected);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_candidate_paths(item, collected);
            }
        }
        _ => {}
    }
}

fn collect_fields<'a>(
    value: &'a serde_json::Value,
    fields: &mut Vec<(String, &'a serde_json::Value)>,
) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                fields.push((key.clone(), item));
                collect_fields(item, fields);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_fields(item, fields);
            }
        }
        _ => {}
    }
}

fn has_non_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(text) => !text.trim().is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Lexically resolve `.` and `..` components without touching the filesystem
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(mode: ToolPolicyMode) -> ToolPolicyService {
        let settings = Settings {
            tool_policy_mode: mode,
            ..Default::default()
        };
        ToolPolicyService::new(&settings, PathBuf::from("/workspace/project"))
    }

    fn shell_context(command: &str) -> ToolPolicyContext {
        ToolPolicyContext {
            tool_name: "shell_exec".to_string(),
            arguments: json!({"command": command}),
            session_id: None,
            run_id: None,
        }
    }

    #[test]
    fn test_allowed_command_passes() {
        let policy = service(ToolPolicyMode::Enforce);
        assert!(policy.pre_tool_use(&shell_context("npm install")).is_empty());
        assert!(policy.pre_tool_use(&shell_context("/usr/bin/git status")).is_empty());
    }

    #[test]
    fn test_disallowed_command_blocked() {
        let policy = service(ToolPolicyMode::Enforce);
        let findings = policy.pre_tool_use(&shell_context("rm -rf /"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].action, PolicyAction::Block);
        assert_eq!(findings[0].policy, "command_allowlist");
    }

    #[test]
    fn test_log_only_downgrades_block() {
        let policy = service(ToolPolicyMode::LogOnly);
        let findings = policy.pre_tool_use(&shell_context("rm -rf /"));
        assert_eq!(findings[0].action, PolicyAction::Warn);
    }

    #[test]
    fn test_off_mode_bypasses() {
        let policy = service(ToolPolicyMode::Off);
        assert!(policy.pre_tool_use(&shell_context("rm -rf /")).is_empty());
    }

    #[test]
    fn test_non_shell_tool_skips_allowlist() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = ToolPolicyContext {
            tool_name: "write_file".to_string(),
            arguments: json!({"command": "rm -rf /"}),
            session_id: None,
            run_id: None,
        };
        assert!(policy.pre_tool_use(&context).is_empty());
    }

    #[test]
    fn test_path_escape_blocked() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = ToolPolicyContext {
            tool_name: "write_file".to_string(),
            arguments: json!({"path": "../../etc/passwd"}),
            session_id: None,
            run_id: None,
        };
        let findings = policy.pre_tool_use(&context);
        assert_eq!(findings[0].policy, "path_boundary");
        assert_eq!(findings[0].action, PolicyAction::Block);
    }

    #[test]
    fn test_path_inside_root_passes() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = ToolPolicyContext {
            tool_name: "write_file".to_string(),
            arguments: json!({"path": "pages/home.html", "files": ["assets/app.css"]}),
            session_id: None,
            run_id: None,
        };
        assert!(policy.pre_tool_use(&context).is_empty());
    }

    #[test]
    fn test_url_arguments_ignored_by_path_check() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = ToolPolicyContext {
            tool_name: "fetch".to_string(),
            arguments: json!({"source": "https://example.com/image.png"}),
            session_id: None,
            run_id: None,
        };
        assert!(policy.pre_tool_use(&context).is_empty());
    }

    #[test]
    fn test_sensitive_field_blocked() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = ToolPolicyContext {
            tool_name: "http_request".to_string(),
            arguments: json!({"headers": {"api_key": "abcd1234efgh"}}),
            session_id: None,
            run_id: None,
        };
        let findings = policy.pre_tool_use(&context);
        assert_eq!(findings[0].policy, "sensitive_content");
    }

    #[test]
    fn test_sensitive_pattern_blocked() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = ToolPolicyContext {
            tool_name: "notes".to_string(),
            arguments: json!({"text": "use sk-abcdefghijklmnopqrstuvwx please"}),
            session_id: None,
            run_id: None,
        };
        let findings = policy.pre_tool_use(&context);
        assert_eq!(findings[0].policy, "sensitive_content");
    }

    #[test]
    fn test_large_output_truncated() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = shell_context("ls");
        let big = "x".repeat(200 * 1024);
        let outcome = policy.post_tool_use(&context, json!({"output": big}));

        let output = &outcome.result["output"];
        assert_eq!(output["truncated"], true);
        assert_eq!(output["original_size"], 200 * 1024);
        assert_eq!(output["max_size"], 100 * 1024);
        assert!(outcome
            .findings
            .iter()
            .any(|finding| finding.policy == "large_output_truncate"
                && finding.action == PolicyAction::Warn));
    }

    #[test]
    fn test_small_output_untouched() {
        let policy = service(ToolPolicyMode::Enforce);
        let context = shell_context("ls");
        let outcome = policy.post_tool_use(&context, json!({"output": "short"}));
        assert_eq!(outcome.result["output"], "short");
        assert!(outcome.findings.is_empty());
    }
}

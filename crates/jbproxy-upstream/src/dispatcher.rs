//! Tool allow-list and per-tool path rewriting.
//!
//! Every tool the proxy exposes is described by a [`ToolSpec`]: its required
//! arguments, and which request/response JSON fields carry filesystem paths
//! that need translating between the client's and server's path styles.
//! Tools with no path-bearing arguments (the three `get_project_*` tools)
//! use no-op rewrites and are allow-listed purely so they show up in
//! `list_tools`.

use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value};

use jbproxy_paths::{convert_path, PathStyle};

use crate::error::ToolError;

type RequestRewrite = fn(&mut Map<String, Value>, PathStyle, PathStyle);
type ResponseRewrite = fn(&mut Value, PathStyle, PathStyle);

pub struct ToolSpec {
    pub name: &'static str,
    pub required_args: &'static [&'static str],
    rewrite_request: RequestRewrite,
    rewrite_response: ResponseRewrite,
}

fn req_noop(_: &mut Map<String, Value>, _: PathStyle, _: PathStyle) {}
fn resp_noop(_: &mut Value, _: PathStyle, _: PathStyle) {}

fn convert_string_field(obj: &mut Map<String, Value>, key: &str, from: PathStyle, to: PathStyle) {
    if let Some(Value::String(s)) = obj.get(key) {
        let converted = convert_path(s, from, to);
        obj.insert(key.to_string(), Value::String(converted));
    }
}

fn convert_string_list_field(obj: &mut Map<String, Value>, key: &str, from: PathStyle, to: PathStyle) {
    if let Some(Value::Array(items)) = obj.get_mut(key) {
        for item in items.iter_mut() {
            if let Value::String(s) = item {
                *s = convert_path(s, from, to);
            }
        }
    }
}

fn resp_get_all_open_file_paths(value: &mut Value, from: PathStyle, to: PathStyle) {
    if let Value::Object(obj) = value {
        convert_string_field(obj, "activeFilePath", from, to);
        convert_string_list_field(obj, "openFiles", from, to);
    }
}

fn req_file_path(obj: &mut Map<String, Value>, from: PathStyle, to: PathStyle) {
    convert_string_field(obj, "filePath", from, to);
}
fn resp_file_path(value: &mut Value, from: PathStyle, to: PathStyle) {
    if let Value::Object(obj) = value {
        convert_string_field(obj, "filePath", from, to);
    }
}

fn req_path_in_project(obj: &mut Map<String, Value>, from: PathStyle, to: PathStyle) {
    convert_string_field(obj, "pathInProject", from, to);
}

fn req_directory_path(obj: &mut Map<String, Value>, from: PathStyle, to: PathStyle) {
    convert_string_field(obj, "directoryPath", from, to);
}

/// Rewrites only the root-directory line of `tree` (its first line); the
/// remaining lines are relative entries under it and are left untouched.
fn resp_list_directory_tree(value: &mut Value, from: PathStyle, to: PathStyle) {
    if let Value::Object(obj) = value {
        convert_string_field(obj, "traversedDirectory", from, to);
        if let Some(Value::String(tree)) = obj.get("tree") {
            if let Some((first, rest)) = tree.split_once('\n') {
                let converted_first = convert_path(first, from, to);
                obj.insert("tree".to_string(), Value::String(format!("{converted_first}\n{rest}")));
            } else {
                let converted = convert_path(tree, from, to);
                obj.insert("tree".to_string(), Value::String(converted));
            }
        }
    }
}

fn req_path(obj: &mut Map<String, Value>, from: PathStyle, to: PathStyle) {
    convert_string_field(obj, "path", from, to);
}

fn req_directory_to_search(obj: &mut Map<String, Value>, from: PathStyle, to: PathStyle) {
    convert_string_field(obj, "directoryToSearch", from, to);
}

fn resp_search_entries(value: &mut Value, from: PathStyle, to: PathStyle) {
    if let Value::Object(obj) = value {
        if let Some(Value::Array(entries)) = obj.get_mut("entries") {
            for entry in entries.iter_mut() {
                if let Value::Object(entry_obj) = entry {
                    convert_string_field(entry_obj, "filePath", from, to);
                }
            }
        }
    }
}

pub static TOOL_REGISTRY: &[ToolSpec] = &[
    ToolSpec {
        name: "get_all_open_file_paths",
        required_args: &[],
        rewrite_request: req_noop,
        rewrite_response: resp_get_all_open_file_paths,
    },
    ToolSpec {
        name: "get_file_problems",
        required_args: &["filePath"],
        rewrite_request: req_file_path,
        rewrite_response: resp_file_path,
    },
    ToolSpec {
        name: "get_file_text_by_path",
        required_args: &["pathInProject"],
        rewrite_request: req_path_in_project,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "get_project_dependencies",
        required_args: &[],
        rewrite_request: req_noop,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "get_project_modules",
        required_args: &[],
        rewrite_request: req_noop,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "get_project_problems",
        required_args: &[],
        rewrite_request: req_noop,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "list_directory_tree",
        required_args: &["directoryPath"],
        rewrite_request: req_directory_path,
        rewrite_response: resp_list_directory_tree,
    },
    ToolSpec {
        name: "reformat_file",
        required_args: &["path"],
        rewrite_request: req_path,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "rename_refactoring",
        required_args: &["pathInProject", "symbolName", "newName"],
        rewrite_request: req_path_in_project,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "replace_text_in_file",
        required_args: &["pathInProject", "oldText", "newText"],
        rewrite_request: req_path_in_project,
        rewrite_response: resp_noop,
    },
    ToolSpec {
        name: "search_in_files_by_regex",
        required_args: &["regexPattern"],
        rewrite_request: req_directory_to_search,
        rewrite_response: resp_search_entries,
    },
    ToolSpec {
        name: "search_in_files_by_text",
        required_args: &["searchText"],
        rewrite_request: req_directory_to_search,
        rewrite_response: resp_search_entries,
    },
];

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOL_REGISTRY.iter().find(|spec| spec.name == name)
}

pub fn is_allowed(name: &str) -> bool {
    find(name).is_some()
}

pub fn validate_required_args(
    spec: &ToolSpec,
    arguments: &Map<String, Value>,
) -> Result<(), ToolError> {
    for required in spec.required_args {
        if !arguments.contains_key(*required) {
            return Err(ToolError::argument(format!(
                "missing required argument '{required}' for tool '{}'",
                spec.name
            )));
        }
    }
    Ok(())
}

/// Rewrites request arguments in place, client style -> server style. No-op
/// when the two styles are equal.
pub fn rewrite_request_args(
    spec: &ToolSpec,
    arguments: &mut Map<String, Value>,
    client_style: PathStyle,
    server_style: PathStyle,
) {
    if client_style == server_style {
        return;
    }
    (spec.rewrite_request)(arguments, client_style, server_style);
}

/// Rewrites each text content block's JSON payload in place, server style ->
/// client style. Skipped when the two styles are equal, when the upstream
/// reported an error, or when there is no content. A block whose text isn't
/// valid JSON, or whose rewrite otherwise fails, is logged and left
/// unchanged rather than dropped.
pub fn rewrite_response_content(
    spec: &ToolSpec,
    result: &mut CallToolResult,
    client_style: PathStyle,
    server_style: PathStyle,
) {
    if client_style == server_style {
        return;
    }
    if result.is_error.unwrap_or(false) {
        return;
    }
    if result.content.is_empty() {
        return;
    }

    for block in result.content.iter_mut() {
        let Some(text_content) = block.as_text() else {
            continue;
        };
        let original_text = text_content.text.clone();

        match serde_json::from_str::<Value>(&original_text) {
            Ok(mut value) => {
                (spec.rewrite_response)(&mut value, server_style, client_style);
                match serde_json::to_string(&value) {
                    Ok(rewritten) => {
                        *block = Content::text(rewritten);
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to re-serialize rewritten response for tool '{}': {e}",
                            spec.name
                        );
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "failed to parse response content as JSON for tool '{}': {e}, \
                     returning original response",
                    spec.name
                );
            }
        }
    }
}

//! Pure conversion between WSL (`/mnt/x/...`), Git-Bash (`/x/...`) and
//! Windows (`X:/...`) path styles.
//!
//! Every function here is synchronous and infallible: unknown styles or
//! paths that cannot be converted are returned unchanged rather than
//! raising, matching the upstream tool's path conventions exactly so a
//! client and server that disagree on path style can still talk to each
//! other.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// One of the three path conventions this proxy translates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    Wsl,
    WindowsGitBash,
    Windows,
}

impl PathStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            PathStyle::Wsl => "wsl",
            PathStyle::WindowsGitBash => "windows_git_bash",
            PathStyle::Windows => "windows",
        }
    }
}

impl fmt::Display for PathStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name one of the three path styles.
#[derive(Debug, thiserror::Error)]
#[error("unknown path style `{0}`, expected one of: wsl, windows_git_bash, windows")]
pub struct UnknownPathStyle(pub String);

impl FromStr for PathStyle {
    type Err = UnknownPathStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wsl" => Ok(PathStyle::Wsl),
            "windows_git_bash" => Ok(PathStyle::WindowsGitBash),
            "windows" => Ok(PathStyle::Windows),
            other => Err(UnknownPathStyle(other.to_string())),
        }
    }
}

static WSL_DRIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/mnt/[a-z]+/").expect("valid regex"));
static GIT_BASH_DRIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/[a-z]+/").expect("valid regex"));
static WINDOWS_DRIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+:").expect("valid regex"));

/// Strips outer whitespace, converts backslashes to forward slashes, and
/// collapses runs of forward slashes to one. Internal collapsing is
/// universal: there is no UNC (`//server/share`) preservation.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let mut p = path.trim().replace('\\', "/");
    while p.contains("//") {
        p = p.replace("//", "/");
    }
    p
}

/// Extracts `(drive, tail)` from a normalized WSL-style path.
///
/// Recognizes `/mnt/x/...` (drive `x`, tail `/...`). Anything else is
/// returned with no drive.
fn parse_from_wsl(p_norm: &str) -> (Option<String>, String) {
    if WSL_DRIVE_RE.is_match(p_norm) {
        let mut parts = p_norm.splitn(4, '/');
        let _empty = parts.next();
        let _mnt = parts.next();
        if let (Some(drive), Some(remainder)) = (parts.next(), parts.next()) {
            return (Some(drive.to_string()), format!("/{remainder}"));
        }
    }
    (None, p_norm.to_string())
}

/// Extracts `(drive, tail)` from a normalized Git-Bash-style path.
///
/// Recognizes `/x/...` (single lowercase segment as drive). A path starting
/// `/mnt/x/...` parses as drive `mnt`, tail `/x/...` here — Git-Bash has no
/// special case for `/mnt/`; callers who mean WSL must pass `from =
/// PathStyle::Wsl`.
fn parse_from_windows_git_bash(p_norm: &str) -> (Option<String>, String) {
    if GIT_BASH_DRIVE_RE.is_match(p_norm) {
        let mut parts = p_norm.splitn(3, '/');
        let _empty = parts.next();
        if let (Some(drive), Some(remainder)) = (parts.next(), parts.next()) {
            return (Some(drive.to_string()), format!("/{remainder}"));
        }
    }
    (None, p_norm.to_string())
}

/// Extracts `(drive, tail)` from a normalized Windows-style path.
///
/// Recognizes `X:/...` or bare `X:` (tail becomes `/`).
fn parse_from_windows(p_norm: &str) -> (Option<String>, String) {
    if WINDOWS_DRIVE_RE.is_match(p_norm) {
        let mut parts = p_norm.splitn(2, '/');
        let drive_with_colon = parts.next().unwrap_or_default();
        let drive = drive_with_colon.trim_end_matches(':').to_string();
        let remainder = parts.next().unwrap_or_default();
        return (Some(drive), format!("/{remainder}"));
    }
    (None, p_norm.to_string())
}

/// Detects the path style of an (unnormalized) path string.
///
/// WSL iff `^/mnt/[a-z]+/` (lowercase-only drive, trailing slash required).
/// Windows iff `^[A-Za-z]+:` (any case). Otherwise `None`. Git-Bash is never
/// detected — a path starting `/x/...` is ambiguous between Git-Bash and a
/// plain relative/absolute path, so detection only ever resolves to WSL or
/// Windows.
pub fn detect_path_type(path: &str) -> Option<PathStyle> {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        return None;
    }

    if WSL_DRIVE_RE.is_match(&normalized) {
        return Some(PathStyle::Wsl);
    }
    if WINDOWS_DRIVE_RE.is_match(&normalized) {
        return Some(PathStyle::Windows);
    }
    None
}

fn detect_drive_and_path(p_norm: &str, from_style: PathStyle) -> (Option<String>, String) {
    match from_style {
        PathStyle::Wsl => parse_from_wsl(p_norm),
        PathStyle::WindowsGitBash => parse_from_windows_git_bash(p_norm),
        PathStyle::Windows => parse_from_windows(p_norm),
    }
}

fn build_converted_path(
    drive: Option<&str>,
    path: &str,
    to_style: PathStyle,
    original: &str,
) -> String {
    match to_style {
        PathStyle::Wsl => match drive {
            Some(d) => format!("/mnt/{}{path}", d.to_lowercase()),
            None => path.to_string(),
        },
        PathStyle::WindowsGitBash => match drive {
            Some(d) => format!("/{}{path}", d.to_lowercase()),
            None => path.to_string(),
        },
        PathStyle::Windows => match drive {
            Some(d) => format!("{d}:{path}"),
            None => {
                if !path.starts_with('/') {
                    path.to_string()
                } else {
                    log::warn!(
                        "failed to convert {original} to windows style (starts with '/') \
                         without drive letter, returning original"
                    );
                    original.to_string()
                }
            }
        },
    }
}

/// Converts `path` from `from_style` to `to_style`.
///
/// Short-circuits on an empty path or `from_style == to_style`. Detects the
/// actual style of the input first: if detection recognizes WSL or Windows
/// and it disagrees with `from_style`, the detected style wins (with a
/// warning) — see [`detect_path_type`]. Never panics; paths that cannot be
/// converted (no drive, target is Windows) are returned unchanged.
pub fn convert_path(path: &str, from_style: PathStyle, to_style: PathStyle) -> String {
    if path.is_empty() || from_style == to_style {
        return path.to_string();
    }

    let mut from_style = from_style;
    if let Some(detected) = detect_path_type(path) {
        if detected == to_style {
            return path.to_string();
        }
        if detected != from_style {
            log::warn!(
                "path {path} detected as {detected}, but requested conversion from \
                 {from_style} to {to_style}; using detected type instead"
            );
            from_style = detected;
        }
    }

    let p_norm = normalize_path(path);
    let (drive, tail) = detect_drive_and_path(&p_norm, from_style);
    build_converted_path(drive.as_deref(), &tail, to_style, path)
}

impl PartialEq<PathStyle> for &PathStyle {
    fn eq(&self, other: &PathStyle) -> bool {
        **self == *other
    }
}

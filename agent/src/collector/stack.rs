//! Call-site capture
//!
//! Walks the current stack with the `backtrace` crate, drops frames that
//! belong to infrastructure namespaces and reports the rest outermost first.

use lens_shared::types::record::BacktraceFrame;
use std::path::Path;

/// One unfiltered stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Demangled symbol path without the hash suffix
    pub symbol: Option<String>,
    /// `(file, line)` of the instruction in this frame
    pub call_site: Option<(String, u32)>,
    /// `(file, line)` of the enclosing function's entry address
    pub declaration: Option<(String, u32)>,
}

/// Capture the current stack, innermost frame first.
pub fn capture_raw(resolve_declarations: bool) -> Vec<RawFrame> {
    let mut frames = Vec::new();
    backtrace::trace(|frame| {
        let mut raw = RawFrame::default();
        backtrace::resolve_frame(frame, |symbol| {
            if raw.symbol.is_none() {
                raw.symbol = symbol.name().map(|name| format!("{:#}", name));
            }
            if raw.call_site.is_none() {
                if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                    raw.call_site = Some((file.display().to_string(), line));
                }
            }
        });

        if resolve_declarations {
            let entry = frame.symbol_address();
            if !entry.is_null() {
                backtrace::resolve(entry, |symbol| {
                    if raw.declaration.is_none() {
                        if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                            raw.declaration = Some((file.display().to_string(), line));
                        }
                    }
                });
            }
        }

        frames.push(raw);
        true
    });
    frames
}

/// Filter innermost-first `raw` frames into an outermost-first backtrace.
///
/// Frames without a symbol or a resolvable source location are dropped, as
/// are frames in any `ignored` namespace. File paths under `base` are made
/// relative to it.
pub fn filter_frames(
    raw: Vec<RawFrame>,
    ignored: &[String],
    prefer_declaration_site: bool,
    base: Option<&Path>,
) -> Vec<BacktraceFrame> {
    let mut out: Vec<BacktraceFrame> = raw
        .into_iter()
        .filter_map(|frame| {
            let symbol = frame.symbol?;
            let path = symbol.trim_start_matches('<');
            if ignored.iter().any(|prefix| path.starts_with(prefix.as_str())) {
                return None;
            }

            let location = if prefer_declaration_site {
                frame.declaration.or(frame.call_site)
            } else {
                frame.call_site
            };
            let (file, line) = location?;
            let (class, function) = split_symbol(path);

            Some(BacktraceFrame {
                file: relative_to(&file, base),
                line,
                function,
                class,
            })
        })
        .collect();
    out.reverse();
    out
}

/// `a::b::Type::method` → `(Some("a::b::Type"), "method")`.
fn split_symbol(path: &str) -> (Option<String>, String) {
    match path.rsplit_once("::") {
        Some((owner, function)) if !owner.is_empty() => {
            (Some(owner.to_string()), function.to_string())
        }
        _ => (None, path.to_string()),
    }
}

fn relative_to(file: &str, base: Option<&Path>) -> String {
    base.and_then(|base| Path::new(file).strip_prefix(base).ok())
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|| file.to_string())
}

//! The format stage: builds an `ErrorReport` and extracts a `file`/`line`
//! from free-form stack trace text.

use regex::Regex;

struct FrameMatcher {
    regex: Regex,
    file_group: usize,
    line_group: usize,
}

fn matchers() -> Vec<FrameMatcher> {
    vec![
        // `at name (file:line:col)`
        FrameMatcher {
            regex: Regex::new(r"at .*\(([^():\n]+):(\d+):(\d+)\)").expect("built-in pattern must compile"),
            file_group: 1,
            line_group: 2,
        },
        // `name@file:line:col`
        FrameMatcher {
            regex: Regex::new(r"[^@\s]+@([^():\n]+):(\d+):(\d+)").expect("built-in pattern must compile"),
            file_group: 1,
            line_group: 2,
        },
        // bare `file:line:col`
        FrameMatcher {
            regex: Regex::new(r"([^\s:()]+):(\d+):(\d+)").expect("built-in pattern must compile"),
            file_group: 1,
            line_group: 2,
        },
    ]
}

/// Scans `stack_trace` for the first frame matching a common stack-frame
/// shape, returning its file and line. Falls back to `("unknown", 0)` when
/// no frame is recognized, matching a stack-parse failure being replaced
/// by a sentinel rather than propagated.
pub fn parse_stack_frame(stack_trace: &str) -> (String, u32) {
    for matcher in matchers() {
        if let Some(captures) = matcher.regex.captures(stack_trace) {
            let file = captures.get(matcher.file_group).map(|m| m.as_str().to_string());
            let line = captures
                .get(matcher.line_group)
                .and_then(|m| m.as_str().parse::<u32>().ok());
            if let (Some(file), Some(line)) = (file, line) {
                return (file, line);
            }
        }
    }
    ("unknown".to_string(), 0)
}

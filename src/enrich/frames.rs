//! Tolerant stack-frame extraction.
//!
//! Traces are matched against an ordered list of [`FrameMatcher`]s; the first
//! matcher that yields at least one frame wins. Nothing here ever fails: an
//! unrecognised trace produces an empty frame list.

use regex::Regex;

/// One `{file, line}` location taken from a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
}

impl StackFrame {
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Extracts frames for one textual stack-trace convention.
pub trait FrameMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Frames in the order they appear in `trace`.
    fn extract(&self, trace: &str) -> Vec<StackFrame>;
}

/// Matcher driven by a regex with named `file` and `line` groups.
#[derive(Debug, Clone)]
pub struct RegexFrameMatcher {
    name: &'static str,
    pattern: Regex,
}

impl RegexFrameMatcher {
    /// # Errors
    /// Returns the regex compile error when `pattern` is invalid.
    pub fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
        })
    }

    /// `File "app/views.py", line 42, in handler`
    #[must_use]
    pub fn python() -> Self {
        Self::builtin("python", r#"File "(?P<file>[^"]+)", line (?P<line>\d+)"#)
    }

    /// `at handler (/srv/app/routes.js:10:15)`
    #[must_use]
    pub fn javascript() -> Self {
        Self::builtin("javascript", r"at .*?\((?P<file>[^()\s]+?):(?P<line>\d+):\d+\)")
    }

    /// `at com.example.Service.run(Service.java:88)`
    #[must_use]
    pub fn jvm() -> Self {
        Self::builtin("jvm", r"at [^\s(]+\((?P<file>[^():]+):(?P<line>\d+)\)")
    }

    fn builtin(name: &'static str, pattern: &str) -> Self {
        Self::new(name, pattern)
            .unwrap_or_else(|error| panic!("builtin {name} frame pattern must compile: {error}"))
    }
}

impl FrameMatcher for RegexFrameMatcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, trace: &str) -> Vec<StackFrame> {
        self.pattern
            .captures_iter(trace)
            .filter_map(|caps| {
                let file = caps.name("file")?.as_str();
                let line = caps.name("line")?.as_str().parse::<u32>().ok()?;
                Some(StackFrame {
                    file: file.to_string(),
                    line,
                })
            })
            .collect()
    }
}

/// Python, JavaScript and JVM conventions, tried in that order.
#[must_use]
pub fn default_matchers() -> Vec<Box<dyn FrameMatcher>> {
    vec![
        Box::new(RegexFrameMatcher::python()),
        Box::new(RegexFrameMatcher::javascript()),
        Box::new(RegexFrameMatcher::jvm()),
    ]
}

/// Runs `matchers` in order and returns the first non-empty result.
#[must_use]
pub fn parse_frames(trace: &str, matchers: &[Box<dyn FrameMatcher>]) -> Vec<StackFrame> {
    matchers
        .iter()
        .map(|matcher| matcher.extract(trace))
        .find(|frames| !frames.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PYTHON_TRACE: &str = r#"Traceback (most recent call last):
  File "/app/api/views.py", line 42, in create_order
    order = service.place(payload)
  File "/app/services/orders.py", line 17, in place
    raise ValueError("bad sku 8812")
ValueError: bad sku 8812"#;

    const NODE_TRACE: &str = "TypeError: Cannot read properties of undefined
    at getUser (/srv/app/users.js:10:15)
    at Layer.handle (/srv/node_modules/express/lib/router/layer.js:95:5)";

    const JAVA_TRACE: &str = "java.lang.IllegalStateException: boom
\tat com.example.OrderService.place(OrderService.java:88)
\tat com.example.OrderController.create(OrderController.java:31)";

    #[rstest]
    #[case(PYTHON_TRACE, "/app/api/views.py:42")]
    #[case(NODE_TRACE, "/srv/app/users.js:10")]
    #[case(JAVA_TRACE, "OrderService.java:88")]
    fn first_frame_follows_trace_order(#[case] trace: &str, #[case] expected: &str) {
        let frames = parse_frames(trace, &default_matchers());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].signature(), expected);
    }

    #[test]
    fn unrecognised_trace_yields_no_frames() {
        let frames = parse_frames("segfault somewhere, no idea", &default_matchers());
        assert!(frames.is_empty());
    }

    #[test]
    fn first_matching_convention_wins() {
        let mixed = format!("{PYTHON_TRACE}\n{NODE_TRACE}");
        let frames = parse_frames(&mixed, &default_matchers());
        assert!(frames.iter().all(|frame| frame.file.ends_with(".py")));
    }

    #[test]
    fn custom_matchers_extend_the_chain() {
        let go = RegexFrameMatcher::new("go", r"\s(?P<file>/\S+\.go):(?P<line>\d+)")
            .expect("valid pattern");
        let mut matchers = default_matchers();
        matchers.push(Box::new(go));

        let trace = "goroutine 1 [running]:\nmain.main()\n\t/src/main.go:12 +0x1d";
        let frames = parse_frames(trace, &matchers);
        assert_eq!(frames, vec![StackFrame { file: "/src/main.go".into(), line: 12 }]);
    }
}

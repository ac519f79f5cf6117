use sha2::{Digest, Sha256};

use super::frames::{FrameMatcher, StackFrame, parse_frames};
use crate::domain::LogEntry;

pub(crate) const UNKNOWN_ERROR_TYPE: &str = "UnknownError";
pub(crate) const UNKNOWN_PLATFORM: &str = "unknown";
pub(crate) const SIGNATURE_FRAMES: usize = 3;

/// Grouping key for exception events, `None` for everything else.
///
/// Only exceptions with a non-blank stack trace are fingerprinted. A trace that
/// no matcher understands still produces a fingerprint from type and platform.
#[must_use]
pub fn fingerprint(entry: &LogEntry, matchers: &[Box<dyn FrameMatcher>]) -> Option<String> {
    if !entry.is_exception() {
        return None;
    }
    let trace = entry.stack_trace.as_deref()?;
    if trace.trim().is_empty() {
        return None;
    }

    let frames = parse_frames(trace, matchers);
    let signature = signature(
        entry.error_type.as_deref(),
        &frames,
        entry.platform.as_deref(),
    );
    Some(hash_signature(&signature))
}

/// `"<error_type>:<file:line|file:line|file:line>:<platform>"` over the top frames.
pub(crate) fn signature(
    error_type: Option<&str>,
    frames: &[StackFrame],
    platform: Option<&str>,
) -> String {
    let frame_signature = frames
        .iter()
        .take(SIGNATURE_FRAMES)
        .map(StackFrame::signature)
        .collect::<Vec<_>>()
        .join("|");

    format!(
        "{}:{}:{}",
        error_type.unwrap_or(UNKNOWN_ERROR_TYPE),
        frame_signature,
        platform.unwrap_or(UNKNOWN_PLATFORM)
    )
}

fn hash_signature(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{LogLevel, LogType};
    use crate::enrich::frames::default_matchers;

    const TRACE: &str = r#"Traceback (most recent call last):
  File "/app/a.py", line 1, in one
  File "/app/b.py", line 2, in two
  File "/app/c.py", line 3, in three
  File "/app/d.py", line 4, in four
KeyError: 'user_1234'"#;

    fn exception(trace: Option<&str>) -> LogEntry {
        LogEntry {
            error_type: Some("KeyError".into()),
            error_message: Some("'user_1234'".into()),
            stack_trace: trace.map(str::to_string),
            platform: Some("python".into()),
            ..LogEntry::new(Utc::now(), LogLevel::Error, LogType::Exception, "boom")
        }
    }

    #[test]
    fn signature_uses_top_three_frames() {
        let frames = parse_frames(TRACE, &default_matchers());
        let sig = signature(Some("KeyError"), &frames, Some("python"));
        assert_eq!(sig, "KeyError:/app/a.py:1|/app/b.py:2|/app/c.py:3:python");
    }

    #[test]
    fn signature_defaults_missing_type_and_platform() {
        assert_eq!(signature(None, &[], None), "UnknownError::unknown");
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint(&exception(Some(TRACE)), &default_matchers()).expect("fingerprint");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn message_text_does_not_affect_fingerprint() {
        let matchers = default_matchers();
        let first = exception(Some(TRACE));
        let mut second = exception(Some(TRACE));
        second.message = "boom for user_9999".into();
        second.error_message = Some("'user_9999'".into());

        assert_eq!(fingerprint(&first, &matchers), fingerprint(&second, &matchers));
    }

    #[test]
    fn frames_past_the_third_do_not_affect_fingerprint() {
        let matchers = default_matchers();
        let shorter = TRACE.replace("  File \"/app/d.py\", line 4, in four\n", "");
        assert_eq!(
            fingerprint(&exception(Some(TRACE)), &matchers),
            fingerprint(&exception(Some(&shorter)), &matchers)
        );
    }

    #[test]
    fn blank_or_missing_trace_has_no_fingerprint() {
        let matchers = default_matchers();
        assert!(fingerprint(&exception(None), &matchers).is_none());
        assert!(fingerprint(&exception(Some("   \n")), &matchers).is_none());
    }

    #[test]
    fn unparseable_trace_still_fingerprints_from_type_and_platform() {
        let matchers = default_matchers();
        let fp = fingerprint(&exception(Some("no frames here")), &matchers);
        assert_eq!(fp, Some(hash_signature("KeyError::python")));
    }
}

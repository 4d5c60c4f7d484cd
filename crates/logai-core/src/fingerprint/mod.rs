//! Fingerprint Engine: maps an error event to the stable key of its cluster.
//!
//! The key is the first 128 bits of SHA-256 over
//! `exception_class|primary_frame|normalized_message`, hex encoded. It is a
//! pure function of the event; nothing here touches storage.

mod normalize;
mod stack;

pub use normalize::normalize_message;
pub use stack::{Frame, ParsedStack, parse_stack};

use logai_types::{ClusterCandidate, LogEvent, SourceLocation};
use sha2::{Digest, Sha256};

use crate::config::FingerprintConfig;

/// Fingerprint plus the descriptive fields a new cluster is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub key: String,
    pub candidate: ClusterCandidate,
}

#[derive(Debug, Clone)]
pub struct Fingerprinter {
    framework_prefixes: Vec<String>,
}

impl Fingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            framework_prefixes: config.framework_prefixes.clone(),
        }
    }

    /// ERROR/FATAL events that carry an exception class or a stack trace.
    pub fn is_eligible(event: &LogEvent) -> bool {
        event.level.is_error()
            && (non_blank(event.exception_class.as_deref()).is_some()
                || non_blank(event.stack_trace.as_deref()).is_some())
    }

    pub fn fingerprint(&self, event: &LogEvent) -> Option<Fingerprint> {
        if !Self::is_eligible(event) {
            return None;
        }
        let parsed = event
            .stack_trace
            .as_deref()
            .map(parse_stack)
            .unwrap_or_default();

        let exception_class = non_blank(event.exception_class.as_deref())
            .map(str::to_string)
            .or(parsed.exception_class.clone());

        let primary = self.primary_frame(&parsed.frames);
        let (frame_key, location) = match primary {
            Some(frame) => (frame.key(), frame.location()),
            None if !event.location.is_empty() => {
                (location_key(&event.location), event.location.clone())
            }
            None => (String::new(), SourceLocation::default()),
        };

        let raw_message = non_blank(event.message.as_deref())
            .or(parsed.header_message.as_deref())
            .unwrap_or("");
        let pattern = normalize_message(raw_message);

        let key = fingerprint_key(exception_class.as_deref().unwrap_or(""), &frame_key, &pattern);
        Some(Fingerprint {
            key,
            candidate: ClusterCandidate {
                exception_class,
                message_pattern: Some(pattern).filter(|p| !p.is_empty()),
                location,
                sample_message: event.message.clone(),
                sample_stack_trace: event.stack_trace.clone(),
            },
        })
    }

    /// First frame in application code, else the innermost frame.
    fn primary_frame<'a>(&self, frames: &'a [Frame]) -> Option<&'a Frame> {
        frames
            .iter()
            .find(|f| !self.is_framework(f))
            .or_else(|| frames.first())
    }

    fn is_framework(&self, frame: &Frame) -> bool {
        if let Some(class) = frame.class.as_deref() {
            return self
                .framework_prefixes
                .iter()
                .any(|prefix| class.starts_with(prefix.as_str()));
        }
        frame.file.as_deref().is_some_and(|file| {
            file.contains("site-packages") || file.contains("dist-packages") || file.contains("/lib/python")
        })
    }
}

fn location_key(location: &SourceLocation) -> String {
    let owner = location
        .class
        .as_deref()
        .or(location.file.as_deref())
        .unwrap_or("");
    let line = location.line.map(|l| l.to_string()).unwrap_or_default();
    format!(
        "{}.{}:{}",
        owner,
        location.method.as_deref().unwrap_or(""),
        line
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn fingerprint_key(exception_class: &str, primary_frame: &str, normalized_message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(exception_class.as_bytes());
    hasher.update(b"|");
    hasher.update(primary_frame.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_message.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logai_types::LogLevel;
    use proptest::prelude::*;

    fn engine() -> Fingerprinter {
        Fingerprinter::new(&FingerprintConfig::default())
    }

    fn event(message: &str, stack: Option<&str>, class: Option<&str>) -> LogEvent {
        let mut e = LogEvent::new(Utc::now(), LogLevel::Error, message);
        e.stack_trace = stack.map(String::from);
        e.exception_class = class.map(String::from);
        e
    }

    const STACK: &str = "java.lang.IllegalStateException: boom
\tat org.springframework.aop.Proxy.invoke(Proxy.java:10)
\tat com.acme.orders.OrderService.place(OrderService.java:87)
\tat java.lang.Thread.run(Thread.java:833)";

    #[test]
    fn key_is_128_bit_hex() {
        let fp = engine().fingerprint(&event("boom", Some(STACK), None)).unwrap();
        assert_eq!(fp.key.len(), 32);
        assert!(fp.key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn picks_first_application_frame() {
        let fp = engine().fingerprint(&event("boom", Some(STACK), None)).unwrap();
        assert_eq!(
            fp.candidate.exception_class.as_deref(),
            Some("java.lang.IllegalStateException")
        );
        assert_eq!(
            fp.candidate.location.class.as_deref(),
            Some("com.acme.orders.OrderService")
        );
        assert_eq!(fp.candidate.location.line, Some(87));
        assert_eq!(
            fp.key,
            fingerprint_key(
                "java.lang.IllegalStateException",
                "com.acme.orders.OrderService.place:87",
                "boom"
            )
        );
    }

    #[test]
    fn falls_back_to_first_frame_when_all_are_library() {
        let stack = "java.io.IOException: closed
\tat java.io.FileInputStream.read(FileInputStream.java:1)
\tat java.lang.Thread.run(Thread.java:2)";
        let fp = engine().fingerprint(&event("closed", Some(stack), None)).unwrap();
        assert_eq!(fp.candidate.location.class.as_deref(), Some("java.io.FileInputStream"));
    }

    #[test]
    fn structured_class_wins_and_location_fills_in_for_missing_stack() {
        let mut e = event("timeout after 30s", None, Some("com.acme.TimeoutException"));
        e.location = SourceLocation {
            file: Some("Gateway.java".into()),
            class: Some("com.acme.Gateway".into()),
            method: Some("call".into()),
            line: Some(12),
        };
        let fp = engine().fingerprint(&e).unwrap();
        assert_eq!(fp.candidate.location, e.location);
        assert_eq!(fp.candidate.message_pattern.as_deref(), Some("timeout after <num>s"));
        assert_eq!(
            fp.key,
            fingerprint_key("com.acme.TimeoutException", "com.acme.Gateway.call:12", "timeout after <num>s")
        );
    }

    #[test]
    fn ineligible_events_have_no_fingerprint() {
        assert!(engine().fingerprint(&event("plain error", None, None)).is_none());
        assert!(engine().fingerprint(&event("blank", Some("  "), Some(""))).is_none());

        let mut warn = event("boom", Some(STACK), None);
        warn.level = LogLevel::Warn;
        assert!(engine().fingerprint(&warn).is_none());

        let mut fatal = event("boom", Some(STACK), None);
        fatal.level = LogLevel::Fatal;
        assert!(engine().fingerprint(&fatal).is_some());
    }

    #[test]
    fn header_message_is_used_when_message_is_empty() {
        let mut e = event("", Some(STACK), None);
        e.message = None;
        let fp = engine().fingerprint(&e).unwrap();
        assert_eq!(fp.candidate.message_pattern.as_deref(), Some("boom"));
    }

    proptest! {
        #[test]
        fn same_shape_same_fingerprint(a in 0u32..1_000_000, b in 0u32..1_000_000, line in 1i64..5000) {
            let stack = format!(
                "com.acme.PaymentException: charge failed\n\tat com.acme.Billing.charge(Billing.java:{})",
                line
            );
            let one = event(&format!("charge {} failed for 3f2b8c1e-9a4d-4f6b-8c2e-1d2f3a4b5c6d", a), Some(&stack), None);
            let two = event(&format!("charge {} failed for 00000000-1111-2222-3333-444444444444", b), Some(&stack), None);
            let e = engine();
            prop_assert_eq!(e.fingerprint(&one).unwrap().key, e.fingerprint(&two).unwrap().key);
        }

        #[test]
        fn fingerprinting_is_repeatable(msg in "[ -~]{0,60}", class in "[A-Za-z.]{1,30}") {
            let e = event(&msg, None, Some(&class));
            let engine = engine();
            prop_assert_eq!(engine.fingerprint(&e), engine.fingerprint(&e));
        }
    }
}

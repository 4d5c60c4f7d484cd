//! Stack trace parsing for JVM and Python style traces.

use std::sync::LazyLock;

use logai_types::SourceLocation;
use regex::Regex;

static JAVA_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*at\s+(?:[\w.$-]+(?:@[\w.-]+)?/)?([\w$.]+)\.([\w$<>-]+)\(([^)]*)\)")
        .expect("valid regex")
});

static PYTHON_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*File "([^"]+)", line (\d+), in (\S+)"#).expect("valid regex")
});

static EXCEPTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)(?::\s*(.*))?$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub class: Option<String>,
    pub method: String,
    pub file: Option<String>,
    pub line: Option<i64>,
}

impl Frame {
    /// `class.method:line`; Python frames use the file in place of the class.
    pub fn key(&self) -> String {
        let owner = self.class.as_deref().or(self.file.as_deref()).unwrap_or("");
        let line = self.line.map(|l| l.to_string()).unwrap_or_default();
        format!("{}.{}:{}", owner, self.method, line)
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            class: self.class.clone(),
            method: Some(self.method.clone()),
            line: self.line,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStack {
    pub exception_class: Option<String>,
    pub header_message: Option<String>,
    /// Innermost call first.
    pub frames: Vec<Frame>,
}

pub fn parse_stack(trace: &str) -> ParsedStack {
    let lines: Vec<&str> = trace.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some(first) = lines.first() else {
        return ParsedStack::default();
    };
    if first.trim_start().starts_with("Traceback") {
        parse_python(&lines)
    } else {
        parse_java(&lines)
    }
}

fn parse_java(lines: &[&str]) -> ParsedStack {
    let (exception_class, header_message) = parse_header(lines[0]);
    let mut frames = Vec::new();
    for line in &lines[1..] {
        let trimmed = line.trim_start();
        // Only the outermost exception's frames; causes follow.
        if trimmed.starts_with("Caused by:") || trimmed.starts_with("Suppressed:") {
            break;
        }
        if let Some(caps) = JAVA_FRAME.captures(line) {
            let (file, line_no) = split_source(&caps[3]);
            frames.push(Frame {
                class: Some(caps[1].to_string()),
                method: caps[2].to_string(),
                file,
                line: line_no,
            });
        }
    }
    ParsedStack {
        exception_class,
        header_message,
        frames,
    }
}

fn parse_python(lines: &[&str]) -> ParsedStack {
    let mut frames = Vec::new();
    for line in lines {
        if let Some(caps) = PYTHON_FRAME.captures(line) {
            frames.push(Frame {
                class: None,
                method: caps[3].to_string(),
                file: Some(caps[1].to_string()),
                line: caps[2].parse().ok(),
            });
        }
    }
    // Python prints the most recent call last.
    frames.reverse();

    let header = lines
        .iter()
        .rev()
        .find(|l| !l.starts_with(char::is_whitespace) && !l.starts_with("Traceback"))
        .copied();
    let (exception_class, header_message) = header.map(parse_header).unwrap_or((None, None));
    ParsedStack {
        exception_class,
        header_message,
        frames,
    }
}

fn parse_header(line: &str) -> (Option<String>, Option<String>) {
    let mut line = line.trim();
    if line.starts_with("Exception in thread ")
        && let Some(idx) = line.rfind("\" ")
    {
        line = &line[idx + 2..];
    }
    match EXCEPTION_HEADER.captures(line) {
        Some(caps) => (
            Some(caps[1].to_string()),
            caps.get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|m| !m.is_empty()),
        ),
        None => (None, None),
    }
}

fn split_source(raw: &str) -> (Option<String>, Option<i64>) {
    match raw.rsplit_once(':') {
        Some((file, line)) => match line.trim().parse() {
            Ok(n) => (Some(file.to_string()), Some(n)),
            Err(_) => (Some(raw.to_string()), None),
        },
        None if raw.is_empty() || raw == "Native Method" || raw == "Unknown Source" => (None, None),
        None => (Some(raw.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAVA: &str = "java.lang.IllegalStateException: Order 42 is closed
\tat com.acme.orders.OrderService.place(OrderService.java:87)
\tat org.springframework.web.servlet.FrameworkServlet.service(FrameworkServlet.java:897)
\tat java.base/java.lang.Thread.run(Thread.java:833)
Caused by: java.sql.SQLException: Connection reset
\tat com.zaxxer.hikari.pool.HikariPool.getConnection(HikariPool.java:181)";

    #[test]
    fn parses_java_header_and_frames() {
        let parsed = parse_stack(JAVA);
        assert_eq!(
            parsed.exception_class.as_deref(),
            Some("java.lang.IllegalStateException")
        );
        assert_eq!(parsed.header_message.as_deref(), Some("Order 42 is closed"));
        assert_eq!(parsed.frames.len(), 3);
        assert_eq!(parsed.frames[0].key(), "com.acme.orders.OrderService.place:87");
        assert_eq!(parsed.frames[0].file.as_deref(), Some("OrderService.java"));
        assert_eq!(parsed.frames[2].class.as_deref(), Some("java.lang.Thread"));
    }

    #[test]
    fn parses_python_traceback() {
        let trace = "Traceback (most recent call last):
  File \"/app/orders/views.py\", line 12, in place_order
    total = compute(order)
  File \"/app/orders/pricing.py\", line 40, in compute
    return sum(x.price for x in order.items)
AttributeError: 'NoneType' object has no attribute 'items'";
        let parsed = parse_stack(trace);
        assert_eq!(parsed.exception_class.as_deref(), Some("AttributeError"));
        assert_eq!(parsed.frames.len(), 2);
        assert_eq!(parsed.frames[0].method, "compute");
        assert_eq!(parsed.frames[0].key(), "/app/orders/pricing.py.compute:40");
    }

    #[test]
    fn thread_prefix_and_native_frames() {
        let trace = "Exception in thread \"main\" java.lang.NullPointerException
\tat sun.misc.Unsafe.park(Native Method)";
        let parsed = parse_stack(trace);
        assert_eq!(
            parsed.exception_class.as_deref(),
            Some("java.lang.NullPointerException")
        );
        assert_eq!(parsed.header_message, None);
        assert_eq!(parsed.frames[0].file, None);
        assert_eq!(parsed.frames[0].line, None);
    }

    #[test]
    fn prose_is_not_an_exception_header() {
        let parsed = parse_stack("something went wrong here");
        assert_eq!(parsed.exception_class, None);
        assert!(parsed.frames.is_empty());
        assert_eq!(parse_stack(""), ParsedStack::default());
    }
}

//! Rendering of channel events for the terminal.
//!
//! `EventSink` is what the watch loop writes to. The terminal renderer prints
//! one colored line per entry; the JSON renderer prints one serialized entry
//! per line for piping into other tools.

use crate::channel::{ChannelEvent, ChannelStatus, EventKind};
use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

const INDENT: &str = "  ";
const SECTION_BULLET: &str = "•";

/// Destination for rendered channel output.
pub trait EventSink {
    /// Render one log entry.
    fn event(&mut self, event: &ChannelEvent) -> io::Result<()>;
    /// Render a status change.
    fn status(&mut self, task_id: Option<&str>, status: ChannelStatus) -> io::Result<()>;
}

/// Human-readable, optionally colored output.
pub struct TerminalRenderer<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write> EventSink for TerminalRenderer<W> {
    fn event(&mut self, event: &ChannelEvent) -> io::Result<()> {
        writeln!(self.out, "{}", format_event_line(event, self.color))?;
        self.out.flush()
    }

    fn status(&mut self, task_id: Option<&str>, status: ChannelStatus) -> io::Result<()> {
        // Status chatter goes to stderr so stdout holds only events.
        Notices::new(self.color).status(task_id, status);
        Ok(())
    }
}

/// Status-style output on stderr: sections, fields, warnings, errors.
#[derive(Debug, Clone, Copy)]
pub struct Notices {
    color: bool,
}

impl Notices {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn section(&self, title: &str) {
        if self.color {
            eprintln!(
                "{} {}",
                SECTION_BULLET.with(Color::DarkGrey),
                title.with(Color::Cyan).bold()
            );
        } else {
            eprintln!("{title}:");
        }
    }

    pub fn field(&self, key: &str, value: &str) {
        if self.color {
            eprintln!(
                "{INDENT}{} {}",
                format!("{key}:").with(Color::DarkGrey),
                value.with(Color::White)
            );
        } else {
            eprintln!("{INDENT}{key}: {value}");
        }
    }

    pub fn detail(&self, text: &str) {
        if self.color {
            eprintln!("{INDENT}{}", text.with(Color::Grey));
        } else {
            eprintln!("{INDENT}{text}");
        }
    }

    pub fn warn(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "warning:".with(Color::Yellow).bold());
        } else {
            eprintln!("warning: {msg}");
        }
    }

    pub fn error(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "error:".with(Color::Red).bold());
        } else {
            eprintln!("error: {msg}");
        }
    }

    /// One `[status] task <id>` line.
    pub fn status(&self, task_id: Option<&str>, status: ChannelStatus) {
        eprintln!(
            "{} task {}",
            status_label(status, self.color),
            task_id.unwrap_or("-")
        );
    }
}

fn status_label(status: ChannelStatus, color: bool) -> String {
    let label = format!("[{}]", status.as_str());
    if !color {
        return label;
    }
    let tint = match status {
        ChannelStatus::Open => Color::Green,
        ChannelStatus::Error => Color::Red,
        ChannelStatus::Closed => Color::DarkGrey,
        ChannelStatus::Idle | ChannelStatus::Connecting => Color::Yellow,
    };
    label.with(tint).to_string()
}

/// One JSON object per entry.
pub struct JsonLinesRenderer<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> EventSink for JsonLinesRenderer<W> {
    fn event(&mut self, event: &ChannelEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    fn status(&mut self, _task_id: Option<&str>, _status: ChannelStatus) -> io::Result<()> {
        Ok(())
    }
}

/// `HH:MM:SS.mmm kind  text` for one entry.
pub fn format_event_line(event: &ChannelEvent, color: bool) -> String {
    let stamp = format_clock(event.ts_unix_ms);
    let kind = format!("{:<5}", kind_label(event.kind));
    let body = match event.kind {
        EventKind::Event => event
            .payload
            .as_ref()
            .map(|payload| payload.to_string())
            .unwrap_or_default(),
        EventKind::Error => match (event.failure, event.message.as_deref()) {
            (Some(failure), Some(message)) => format!("{message} ({})", failure.as_str()),
            (None, Some(message)) => message.to_string(),
            (Some(failure), None) => failure.as_str().to_string(),
            (None, None) => String::new(),
        },
        EventKind::Raw => format!(
            "binary frame, base64: {}",
            event.message.as_deref().unwrap_or_default()
        ),
        EventKind::Info => event.message.clone().unwrap_or_default(),
    };

    if !color {
        return format!("{stamp} {kind} {body}");
    }
    let kind = match event.kind {
        EventKind::Info => kind.dark_grey(),
        EventKind::Error => kind.red().bold(),
        EventKind::Event => kind.cyan(),
        EventKind::Raw => kind.magenta(),
    };
    let body = match event.kind {
        EventKind::Error => body.red().to_string(),
        EventKind::Info => body.dark_grey().to_string(),
        EventKind::Event | EventKind::Raw => body,
    };
    format!("{} {kind} {body}", stamp.dark_grey())
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Info => "info",
        EventKind::Error => "error",
        EventKind::Event => "event",
        EventKind::Raw => "raw",
    }
}

/// UTC wall-clock time of day.
fn format_clock(ts_unix_ms: u64) -> String {
    let millis = ts_unix_ms % 1_000;
    let secs_of_day = (ts_unix_ms / 1_000) % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{millis:03}",
        secs_of_day / 3_600,
        (secs_of_day % 3_600) / 60,
        secs_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Failure;
    use serde_json::json;

    fn entry(kind: EventKind) -> ChannelEvent {
        ChannelEvent {
            seq: 0,
            // 1970-01-02 03:04:05.678 UTC
            ts_unix_ms: ((24 + 3) * 3_600 + 4 * 60 + 5) * 1_000 + 678,
            kind,
            message: None,
            payload: None,
            failure: None,
        }
    }

    #[test]
    fn plain_lines_carry_clock_kind_and_body() {
        let mut info = entry(EventKind::Info);
        info.message = Some("connected to task t-1".into());
        assert_eq!(
            format_event_line(&info, false),
            "03:04:05.678 info  connected to task t-1"
        );

        let mut event = entry(EventKind::Event);
        event.payload = Some(json!({"status": "running"}));
        assert_eq!(
            format_event_line(&event, false),
            r#"03:04:05.678 event {"status":"running"}"#
        );
    }

    #[test]
    fn error_lines_name_the_failure() {
        let mut error = entry(EventKind::Error);
        error.message = Some("no access token available".into());
        error.failure = Some(Failure::NoCredential);
        assert!(format_event_line(&error, false)
            .ends_with("error no access token available (no_credential)"));
    }

    #[test]
    fn colored_lines_keep_the_text() {
        let mut info = entry(EventKind::Info);
        info.message = Some("hello".into());
        let line = format_event_line(&info, true);
        assert!(line.contains("hello"));
        assert!(line.contains('\u{1b}'));
    }

    #[test]
    fn json_renderer_writes_one_object_per_line() {
        let mut renderer = JsonLinesRenderer::new(Vec::new());
        let mut event = entry(EventKind::Event);
        event.payload = Some(json!({"n": 1}));
        renderer.event(&event).expect("render");
        renderer.event(&entry(EventKind::Info)).expect("render");

        let text = String::from_utf8(renderer.into_inner()).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["kind"], json!("event"));
        assert_eq!(first["payload"], json!({"n": 1}));
    }

    #[test]
    fn status_labels_name_the_state() {
        assert_eq!(status_label(ChannelStatus::Connecting, false), "[connecting]");
        assert!(status_label(ChannelStatus::Error, true).contains("[error]"));
    }

    #[test]
    fn terminal_renderer_writes_lines() {
        let mut renderer = TerminalRenderer::new(Vec::new(), false);
        let mut info = entry(EventKind::Info);
        info.message = Some("a".into());
        renderer.event(&info).expect("render");
        let text = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(text, "03:04:05.678 info  a\n");
    }
}

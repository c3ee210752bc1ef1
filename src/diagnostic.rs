/// Diagnostic reporting using ariadne for input files (scene snapshots,
/// batch requests, settings)
use ariadne::{Color, Label, Report, ReportKind, Source};
use std::ops::Range;

/// Byte offset of a 1-based line/column position, clamped to the source
fn line_column_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(source.len())
}

/// One-character range at `offset`, kept inside the source
fn point_range(source: &str, offset: usize) -> Range<usize> {
    let start = offset.min(source.len().saturating_sub(1));
    start..(start + 1).min(source.len().max(1))
}

fn render<'a>(
    report: Report<'_, (&'a str, Range<usize>)>,
    source_name: &'a str,
    source: &str,
    fallback: String,
) -> String {
    let mut output = Vec::new();
    match report.write((source_name, Source::from(source)), &mut output) {
        Ok(()) => String::from_utf8_lossy(&output).into_owned(),
        Err(_) => fallback,
    }
}

/// Report a JSON decoding error with the offending position highlighted
pub fn report_json_error(source_name: &str, source: &str, error: &serde_json::Error) -> String {
    let offset = line_column_offset(source, error.line(), error.column());
    let title = match error.classify() {
        serde_json::error::Category::Syntax => "Invalid JSON",
        serde_json::error::Category::Eof => "Unexpected end of file",
        serde_json::error::Category::Data => "Unexpected value",
        serde_json::error::Category::Io => "Read error",
    };

    let mut report = Report::build(ReportKind::Error, source_name, offset)
        .with_message(title)
        .with_label(
            Label::new((source_name, point_range(source, offset)))
                .with_message(error.to_string())
                .with_color(Color::Red),
        );
    if error.is_data() {
        report = report.with_help("Check field names and value types against the expected message shape");
    }

    render(report.finish(), source_name, source, format!("{}: {}\n", source_name, error))
}

/// Report a settings file error
pub fn report_settings_error(source_name: &str, source: &str, error: &toml::de::Error) -> String {
    let range = error
        .span()
        .unwrap_or_else(|| point_range(source, 0));
    let report = Report::build(ReportKind::Error, source_name, range.start)
        .with_message("Invalid settings")
        .with_label(
            Label::new((source_name, range))
                .with_message(error.message())
                .with_color(Color::Red),
        )
        .with_note("Known keys: gap, placeholder, proxy_endpoint, fetch_timeout_secs, relay_port")
        .finish();

    render(report, source_name, source, format!("{}: {}\n", source_name, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::protocol::UiMessage;

    #[test]
    fn test_line_column_offset() {
        let source = "{\n  \"a\": 1,\n  oops\n}";
        assert_eq!(line_column_offset(source, 1, 1), 0);
        assert_eq!(line_column_offset(source, 3, 3), 14);
        assert_eq!(line_column_offset(source, 99, 99), source.len());
    }

    #[test]
    fn test_json_syntax_diagnostic() {
        let source = "{\"type\": \"manual-grid\",, }";
        let error = serde_json::from_str::<UiMessage>(source).unwrap_err();
        let diagnostic = report_json_error("request.json", source, &error);
        assert!(diagnostic.contains("Invalid JSON"));
        assert!(diagnostic.contains("request.json"));
    }

    #[test]
    fn test_json_data_diagnostic() {
        let source = r#"{"type": "manual-grid", "data": [], "grids": []}"#;
        let error = serde_json::from_str::<UiMessage>(source).unwrap_err();
        let diagnostic = report_json_error("request.json", source, &error);
        assert!(diagnostic.contains("component"));
    }

    #[test]
    fn test_settings_diagnostic() {
        let source = "gap = \"wide\"\n";
        let error = match toml::from_str::<Settings>(source) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        let diagnostic = report_settings_error("gridfill.toml", source, &error);
        assert!(diagnostic.contains("Invalid settings"));
    }
}

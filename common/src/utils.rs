// Common Crate - utils.rs
use std::str::FromStr;
use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

/// Stdout subscriber at `level`. Unknown level names fall back to INFO.
pub fn fmt_subscriber(level: &str) -> FmtSubscriber {
    let level = Level::from_str(level).unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish()
}

/// Run `f` under a temporary INFO subscriber, for work that logs before the
/// global subscriber can be installed (configuration loading).
pub fn with_bootstrap_tracing<T>(f: impl FnOnce() -> T) -> T {
    tracing::subscriber::with_default(fmt_subscriber("info"), f)
}

/// Setup tracing for the gateway
pub fn setup_tracing(level: &str) -> Result<(), SetGlobalDefaultError> {
    let subscriber = fmt_subscriber(level);
    tracing::subscriber::set_global_default(subscriber)
}

/// Escape a string for use inside a double- or single-quoted HTML attribute.
pub fn escape_html_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_level() {
        use tracing::level_filters::LevelFilter;
        use tracing::Subscriber;

        assert_eq!(fmt_subscriber("debug").max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(fmt_subscriber("nonsense").max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_bootstrap_tracing_records_config_logs() {
        let (info, debug) = with_bootstrap_tracing(|| {
            (tracing::enabled!(Level::INFO), tracing::enabled!(Level::DEBUG))
        });
        assert!(info);
        assert!(!debug);
    }

    #[test]
    fn test_escape_html_attr() {
        assert_eq!(
            escape_html_attr(r#"{"a":"<b>&'c'"}"#),
            "{&quot;a&quot;:&quot;&lt;b&gt;&amp;&#39;c&#39;&quot;}"
        );
    }

    #[test]
    fn test_escape_leaves_plain_text() {
        assert_eq!(escape_html_attr("plain/text-1"), "plain/text-1");
    }
}

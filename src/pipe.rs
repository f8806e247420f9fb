//! Command chaining: `ask about rust | summarize $PIPE`.

pub const PIPE_PLACEHOLDER: &str = "$PIPE";

/// Split a line on `|` outside single or double quotes. Segments are trimmed
/// and empty ones dropped. Quotes are kept in the segment text.
pub fn parse_pipe_segments(input: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (c, quote) {
            ('"' | '\'', None) => {
                quote = Some(c);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            ('|', None) => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Feed the previous segment's output into `segment`: every `$PIPE` is
/// replaced, otherwise a non-empty output is appended after a space.
pub fn substitute_pipe(segment: &str, previous: Option<&str>) -> String {
    let Some(previous) = previous else {
        return segment.to_string();
    };
    if segment.contains(PIPE_PLACEHOLDER) {
        return segment.replace(PIPE_PLACEHOLDER, previous);
    }
    let previous = previous.trim();
    if previous.is_empty() {
        segment.to_string()
    } else {
        format!("{segment} {previous}")
    }
}

/// True when the line chains more than one command.
pub fn is_pipeline(input: &str) -> bool {
    parse_pipe_segments(input).len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims() {
        assert_eq!(parse_pipe_segments("ask a | summarize"), vec!["ask a", "summarize"]);
        assert_eq!(parse_pipe_segments("one|two|three"), vec!["one", "two", "three"]);
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(parse_pipe_segments(" | ask a || | "), vec!["ask a"]);
        assert!(parse_pipe_segments("   ").is_empty());
    }

    #[test]
    fn quoted_pipes_are_not_split() {
        assert_eq!(
            parse_pipe_segments(r#"ask "a|b" | summarize"#),
            vec![r#"ask "a|b""#, "summarize"]
        );
        assert_eq!(
            parse_pipe_segments("say 'x | y' | speak"),
            vec!["say 'x | y'", "speak"]
        );
        // A double quote inside single quotes does not open a new quote
        assert_eq!(
            parse_pipe_segments(r#"say 'it"s' | b"#),
            vec![r#"say 'it"s'"#, "b"]
        );
    }

    #[test]
    fn unterminated_quote_swallows_rest() {
        assert_eq!(parse_pipe_segments("say \"a | b"), vec!["say \"a | b"]);
        assert!(!is_pipeline("say \"a | b"));
        assert!(is_pipeline("a | b"));
    }

    #[test]
    fn substitute_replaces_placeholder() {
        assert_eq!(
            substitute_pipe("summarize $PIPE briefly", Some("long text")),
            "summarize long text briefly"
        );
        assert_eq!(substitute_pipe("$PIPE and $PIPE", Some("x")), "x and x");
    }

    #[test]
    fn substitute_appends_without_placeholder() {
        assert_eq!(substitute_pipe("summarize", Some("long text")), "summarize long text");
        assert_eq!(substitute_pipe("summarize", Some("  ")), "summarize");
        assert_eq!(substitute_pipe("ask a", None), "ask a");
    }
}

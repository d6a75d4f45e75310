//! Directive parser.
//!
//! Splits markup into literal text and include directives. Anything that does
//! not form a complete directive stays literal text so partial documents
//! still render.
//!
//! Recognized forms, for each configured tag name:
//! ```text
//! <inc src="..." />
//! <inc src="..." fallback-src="..." primary id="..." timeout-ms="500"></inc>
//! <inc src="...">inline fallback markup</inc>
//! ```

use std::borrow::Cow;
use std::time::Duration;

use url::Url;

use crate::config::TransclusionConfig;
use crate::include::descriptor::{Include, Segment};

/// Reason a directive-looking span was kept as literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseAnomaly {
    #[error("unterminated opening tag")]
    UnterminatedTag,
    #[error("unclosed attribute quote")]
    UnclosedQuote,
    #[error("missing closing tag")]
    MissingCloseTag,
    #[error("missing src attribute")]
    MissingSrc,
}

/// Tokenizes markup into [`Segment`]s.
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    tag_names: Vec<String>,
}

struct OpenTag {
    attributes: Vec<(String, String)>,
    self_closing: bool,
    end: usize,
}

/// Outcome of reading at one `<`.
enum Scan {
    /// A complete directive ending at the offset.
    Directive(Include, usize),
    /// A well-formed opening tag that was rejected. Scanning resumes past it.
    Rejected(usize),
    /// The opening tag runs to the end of the markup.
    Unterminated,
    /// Not one of the configured tags.
    Skip,
}

/// Last close-tag search per tag name. The first `</tag>` at or after an
/// offset is also the first one for any later offset up to it, so unclosed
/// directives never rescan the rest of the markup.
#[derive(Clone, Copy)]
struct CloseTagSearch {
    from: usize,
    found: Option<(usize, usize)>,
}

impl DirectiveParser {
    pub fn new<S: AsRef<str>>(tag_names: &[S]) -> Self {
        Self {
            tag_names: tag_names
                .iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &TransclusionConfig) -> Self {
        Self::new(&config.include_tag_names)
    }

    /// Parse `markup` into ordered, non-overlapping segments.
    ///
    /// Runs in time linear in the markup length. An opening tag that is
    /// never terminated turns the rest of the markup into literal text.
    pub fn parse(&self, markup: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut close_searches: Vec<Option<CloseTagSearch>> = vec![None; self.tag_names.len()];
        let mut text_start = 0;
        let mut pos = 0;

        while let Some(offset) = markup[pos..].find('<') {
            let start = pos + offset;
            match self.parse_directive(markup, start, &mut close_searches) {
                Scan::Directive(include, end) => {
                    if start > text_start {
                        segments.push(Segment::Text(markup[text_start..start].to_string()));
                    }
                    segments.push(Segment::Include(include));
                    text_start = end;
                    pos = end;
                }
                Scan::Rejected(end) => pos = end,
                Scan::Unterminated => break,
                Scan::Skip => pos = start + 1,
            }
        }

        if text_start < markup.len() {
            segments.push(Segment::Text(markup[text_start..].to_string()));
        }
        segments
    }

    /// Try to read a directive starting at the `<` at `start`.
    fn parse_directive(
        &self,
        markup: &str,
        start: usize,
        close_searches: &mut [Option<CloseTagSearch>],
    ) -> Scan {
        let bytes = markup.as_bytes();
        let name_start = start + 1;
        let name_len = bytes[name_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || matches!(**b, b'-' | b'_' | b':'))
            .count();
        let name_end = name_start + name_len;
        let name = &markup[name_start..name_end];
        let Some(tag_index) = self
            .tag_names
            .iter()
            .position(|t| t.eq_ignore_ascii_case(name))
        else {
            return Scan::Skip;
        };

        match bytes.get(name_end) {
            Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
            Some(_) => return Scan::Skip,
            None => {
                anomaly(start, ParseAnomaly::UnterminatedTag);
                return Scan::Unterminated;
            }
        }

        let open = match scan_open_tag(markup, name_end) {
            Ok(open) => open,
            Err(kind) => {
                anomaly(start, kind);
                return Scan::Unterminated;
            }
        };

        let (content, end) = if open.self_closing {
            (None, open.end)
        } else {
            let tag = &self.tag_names[tag_index];
            match find_close_tag_from(markup, open.end, tag, &mut close_searches[tag_index]) {
                Some((content_end, close_end)) => {
                    (Some(&markup[open.end..content_end]), close_end)
                }
                None => {
                    anomaly(start, ParseAnomaly::MissingCloseTag);
                    return Scan::Rejected(open.end);
                }
            }
        };

        match build_include(open.attributes, content) {
            Some(include) => Scan::Directive(include, end),
            None => {
                anomaly(start, ParseAnomaly::MissingSrc);
                Scan::Rejected(open.end)
            }
        }
    }
}

fn anomaly(offset: usize, kind: ParseAnomaly) {
    tracing::debug!(offset, anomaly = %kind, "Directive kept as literal text");
}

fn scan_open_tag(markup: &str, mut i: usize) -> Result<OpenTag, ParseAnomaly> {
    let bytes = markup.as_bytes();
    let mut attributes: Vec<(String, String)> = Vec::new();

    loop {
        while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }

        match bytes.get(i) {
            None => return Err(ParseAnomaly::UnterminatedTag),
            Some(b'>') => {
                return Ok(OpenTag {
                    attributes,
                    self_closing: false,
                    end: i + 1,
                })
            }
            Some(b'/') => {
                if bytes.get(i + 1) == Some(&b'>') {
                    return Ok(OpenTag {
                        attributes,
                        self_closing: true,
                        end: i + 2,
                    });
                }
                i += 1;
            }
            Some(_) => {
                let name_start = i;
                while let Some(b) = bytes.get(i) {
                    if b.is_ascii_whitespace() || matches!(*b, b'=' | b'>' | b'/') {
                        break;
                    }
                    i += 1;
                }
                let name = markup[name_start..i].to_ascii_lowercase();

                let mut j = i;
                while bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
                    j += 1;
                }

                let mut value = "";
                if bytes.get(j) == Some(&b'=') {
                    i = j + 1;
                    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
                        i += 1;
                    }
                    match bytes.get(i) {
                        None => return Err(ParseAnomaly::UnterminatedTag),
                        Some(&quote) if quote == b'"' || quote == b'\'' => {
                            let close = markup[i + 1..]
                                .find(quote as char)
                                .ok_or(ParseAnomaly::UnclosedQuote)?;
                            value = &markup[i + 1..i + 1 + close];
                            i += close + 2;
                        }
                        Some(_) => {
                            let value_start = i;
                            while let Some(b) = bytes.get(i) {
                                if b.is_ascii_whitespace() || *b == b'>' {
                                    break;
                                }
                                i += 1;
                            }
                            value = &markup[value_start..i];
                        }
                    }
                }

                // first occurrence wins
                if !attributes.iter().any(|(n, _)| *n == name) {
                    attributes.push((name, decode_entities(value).into_owned()));
                }
            }
        }
    }
}

fn find_close_tag_from(
    markup: &str,
    from: usize,
    tag: &str,
    last: &mut Option<CloseTagSearch>,
) -> Option<(usize, usize)> {
    if let Some(prev) = *last {
        if from >= prev.from {
            match prev.found {
                None => return None,
                Some((at, _)) if at >= from => return prev.found,
                Some(_) => {}
            }
        }
    }
    let found = find_close_tag(markup, from, tag);
    *last = Some(CloseTagSearch { from, found });
    found
}

/// Find `</tag>` after `from`. Returns (content end, offset past the close tag).
fn find_close_tag(markup: &str, from: usize, tag: &str) -> Option<(usize, usize)> {
    let bytes = markup.as_bytes();
    for (offset, _) in markup[from..].match_indices("</") {
        let at = from + offset;
        let name_start = at + 2;
        let name_end = name_start + tag.len();
        let name_matches = bytes
            .get(name_start..name_end)
            .is_some_and(|n| n.eq_ignore_ascii_case(tag.as_bytes()));
        if !name_matches {
            continue;
        }
        let mut i = name_end;
        while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        if bytes.get(i) == Some(&b'>') {
            return Some((at, i + 1));
        }
    }
    None
}

fn build_include(attributes: Vec<(String, String)>, content: Option<&str>) -> Option<Include> {
    let mut include = Include::new(String::new());
    let mut inline_fallback_attr = None;

    for (name, value) in attributes {
        match name.as_str() {
            "src" => include.src = value.trim().to_string(),
            "id" if !value.is_empty() => include.id = Some(value),
            "fallback-src" => {
                let value = value.trim();
                if is_http_url(value) {
                    include.fallback_src = Some(value.to_string());
                } else if !value.is_empty() {
                    inline_fallback_attr = Some(value.to_string());
                }
            }
            "primary" => include.primary = !value.eq_ignore_ascii_case("false"),
            "timeout-ms" => {
                include.timeout_override = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis);
            }
            _ => {}
        }
    }

    if include.src.is_empty() {
        return None;
    }

    include.fallback_content = content
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .or(inline_fallback_attr);

    Some(include)
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DirectiveParser {
        DirectiveParser::new(&["inc", "include"])
    }

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    #[test]
    fn splits_self_closing_directive() {
        let segments = parser().parse(r#"<p>A</p><inc src="http://f/1"/><p>B</p>"#);
        assert_eq!(
            segments,
            vec![
                text("<p>A</p>"),
                Segment::Include(Include::new("http://f/1")),
                text("<p>B</p>"),
            ]
        );
    }

    #[test]
    fn reads_all_attributes() {
        let segments = parser().parse(
            r#"<INC id="nav" src='http://f/nav?a=1&amp;b=2' fallback-src=http://f/fallback primary timeout-ms="250" data-x="y"></INC>"#,
        );
        let expected = Include::new("http://f/nav?a=1&b=2")
            .with_id("nav")
            .with_fallback_src("http://f/fallback")
            .primary()
            .with_timeout(Duration::from_millis(250));
        assert_eq!(segments, vec![Segment::Include(expected)]);
    }

    #[test]
    fn content_between_tags_is_inline_fallback() {
        let segments =
            parser().parse(r#"x<include src="http://f/1" fallback-src="plain"><b>fb</b></include>y"#);
        let include = segments[1].as_include().unwrap();
        assert_eq!(include.fallback_content.as_deref(), Some("<b>fb</b>"));
        assert_eq!(include.fallback_src, None);
        assert_eq!(segments[2], text("y"));
    }

    #[test]
    fn non_url_fallback_src_is_inline_markup() {
        let segments = parser().parse(r#"<inc src="http://f/1" fallback-src="<i>offline</i>"/>"#);
        let include = segments[0].as_include().unwrap();
        assert_eq!(include.fallback_src, None);
        assert_eq!(include.fallback_content.as_deref(), Some("<i>offline</i>"));
    }

    #[test]
    fn tag_markers_inside_attribute_values_are_not_directives() {
        let markup = r#"<inc src="http://f/1" fallback-src="<inc src='http://f/2'/> >"/>tail"#;
        let segments = parser().parse(markup);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].as_include().unwrap().src, "http://f/1");
        assert_eq!(segments[1], text("tail"));
    }

    #[test]
    fn unterminated_tag_stays_literal() {
        let markup = r#"<p>A</p><inc src="http://f/1""#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);

        let markup = r#"<inc src="http://f/1/>rest"#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);
    }

    #[test]
    fn missing_close_tag_stays_literal_but_later_directives_parse() {
        let markup = r#"<inc src="http://f/1">never closed <inc src="http://f/2"/>"#;
        let segments = parser().parse(markup);
        assert_eq!(
            segments,
            vec![
                text(r#"<inc src="http://f/1">never closed "#),
                Segment::Include(Include::new("http://f/2")),
            ]
        );
    }

    #[test]
    fn rejected_directive_does_not_expose_attribute_values() {
        let markup = r#"<inc src="http://f/1" fallback-src="<inc src='http://f/2'/>">no close"#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);

        let markup = r#"<inc id="<inc src='http://f/2'/>"/>tail"#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);
    }

    #[test]
    fn unclosed_quote_keeps_remaining_markup_literal() {
        let markup = r#"<inc src='it"s/> <inc src="http://f/2"/>"#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);
    }

    #[test]
    fn many_unclosed_directives_parse_in_linear_time() {
        let started = std::time::Instant::now();
        for unit in ["<inc src=a>", "<inc>", "<inc src='a' ", "<inc a "] {
            let markup = unit.repeat(1024 * 1024 / unit.len());
            assert_eq!(parser().parse(&markup), vec![text(&markup)]);
        }
        assert!(
            started.elapsed() < std::time::Duration::from_secs(20),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn missing_src_stays_literal() {
        let markup = r#"<inc id="x"/><inc src=""/>"#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);
    }

    #[test]
    fn unknown_and_prefixed_tags_are_ignored() {
        let markup = r#"<div src="http://f/1"/><include-foo src="http://f/1"/><incx src="a"/>"#;
        assert_eq!(parser().parse(markup), vec![text(markup)]);
    }

    #[test]
    fn primary_false_and_bad_timeout() {
        let segments = parser().parse(r#"<inc src="http://f/1" primary="false" timeout-ms="soon"/>"#);
        let include = segments[0].as_include().unwrap();
        assert!(!include.primary);
        assert_eq!(include.timeout_override, None);
    }

    #[test]
    fn literal_bytes_are_preserved() {
        let markup = "héllo <b>wörld</b> < not a tag <inc src=\"http://f/1\"/> ünd <3";
        let segments = parser().parse(markup);
        let literal: String = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                Segment::Include(_) => None,
            })
            .collect();
        assert_eq!(literal, markup.replace(r#"<inc src="http://f/1"/>"#, ""));
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn adjacent_directives_produce_no_empty_text() {
        let segments = parser().parse(r#"<inc src="http://f/1"/><inc src="http://f/2"/>"#);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.as_include().is_some()));
    }
}

/// Text processing utilities
pub mod text {
    /// Truncate text to at most `max_chars` characters, preferring to cut at
    /// a sentence end, then at a word boundary.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let cut = text
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        let truncated = &text[..cut];

        if let Some(last_sentence) = truncated.rfind(". ") {
            truncated[..last_sentence + 1].to_string()
        } else if let Some(last_space) = truncated.rfind(' ') {
            format!("{}...", &truncated[..last_space])
        } else {
            format!("{}...", truncated)
        }
    }

    /// Collapse runs of whitespace into single spaces.
    pub fn squash_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.domain().map(|d| d.trim_start_matches("www.").to_string()))
    }

    pub fn is_http_url(url_str: &str) -> bool {
        Url::parse(url_str)
            .map(|url| url.scheme() == "http" || url.scheme() == "https")
            .unwrap_or(false)
    }
}

/// Feed content helpers
pub mod feed {
    /// Strip tags and decode the handful of entities feeds actually use.
    pub fn extract_text_from_html(html: &str) -> String {
        let stripped = html
            .chars()
            .fold((String::new(), false), |(mut text, in_tag), c| match c {
                '<' => (text, true),
                '>' => {
                    text.push(' ');
                    (text, false)
                }
                _ if !in_tag => {
                    text.push(c);
                    (text, in_tag)
                }
                _ => (text, in_tag),
            })
            .0;

        let decoded = stripped
            .replace("&nbsp;", " ")
            .replace("&#8217;", "'")
            .replace("&#8220;", "\"")
            .replace("&#8221;", "\"")
            .replace("&#39;", "'")
            .replace("&quot;", "\"")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&");

        super::text::squash_whitespace(&decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_flattened_to_text() {
        let html = "<p>Bricktown&nbsp;gets a <b>new</b> brewery &amp; taproom</p><p>Opening soon</p>";
        assert_eq!(
            feed::extract_text_from_html(html),
            "Bricktown gets a new brewery & taproom Opening soon"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "Café opens on Film Row. Second sentence follows here";
        assert_eq!(text::smart_truncate(text, 30), "Café opens on Film Row.");
        assert_eq!(text::smart_truncate("short", 30), "short");
        assert_eq!(text::smart_truncate("ééééééééééé", 4), "éééé...");
    }

    #[test]
    fn domain_drops_www() {
        assert_eq!(
            url::extract_domain("https://www.okc.gov/news"),
            Some("okc.gov".to_string())
        );
        assert!(!url::is_http_url("ftp://example.com"));
    }
}

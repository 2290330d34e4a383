//! Attribute value escaping.
//!
//! Line breaks, quotes and angle brackets become numeric character
//! references, so every value fits on one line inside a double-quoted
//! attribute. `&` is escaped too, which keeps literal marker text intact
//! through a round trip.

/// Encode order matters: CRLF must be replaced before a lone LF or CR.
const TABLE: &[(&str, &str)] = &[
    ("&", "&#038;"),
    ("\r\n", "&#xD;&#xA;"),
    ("\n", "&#xA;"),
    ("\r", "&#xD;"),
    ("\"", "&#034;"),
    ("<", "&#060;"),
    (">", "&#062;"),
];

/// Markers accepted on decode, longest first.
const MARKERS: &[(&str, &str)] = &[
    ("&#xD;&#xA;", "\r\n"),
    ("&#038;", "&"),
    ("&#034;", "\""),
    ("&#060;", "<"),
    ("&#062;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#xA;", "\n"),
    ("&#xD;", "\r"),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
];

pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    'outer: while let Some(c) = rest.chars().next() {
        for (literal, marker) in TABLE {
            if let Some(tail) = rest.strip_prefix(literal) {
                out.push_str(marker);
                rest = tail;
                continue 'outer;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Inverse of [`encode`]. A single left-to-right scan, so decoded text is
/// never rescanned. Unknown `&` sequences pass through untouched.
pub fn decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match MARKERS.iter().find(|(marker, _)| rest.starts_with(marker)) {
            Some((marker, literal)) => {
                out.push_str(literal);
                rest = &rest[marker.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_table_characters() {
        assert_eq!(encode("a\r\nb\nc\"<d>"), "a&#xD;&#xA;b&#xA;c&#034;&#060;d&#062;");
    }

    #[test]
    fn crlf_decodes_before_lone_lf() {
        assert_eq!(decode("x&#xD;&#xA;y&#xA;z"), "x\r\ny\nz");
    }

    #[test]
    fn literal_markers_survive_round_trip() {
        for s in ["&#xA;", "&#xD;&#xA;", "&#034;&amp;", "&", "a && b", "&#060;tag&#062;"] {
            assert_eq!(decode(&encode(s)), s, "input {s:?}");
        }
    }

    #[test]
    fn arbitrary_text_round_trips() {
        let samples = [
            "",
            "plain",
            "multi\nline\r\ntext\r",
            "quote \" and 'apostrophe'",
            "<geocraft version=\"1\">",
            "unicode: \u{00e9}\u{4e2d}\u{1f600} & more",
            "<!-- Start of state for window: 1 -->",
        ];
        for s in samples {
            assert_eq!(decode(&encode(s)), s, "input {s:?}");
        }
    }

    #[test]
    fn encoded_text_is_single_line_and_quote_free() {
        let encoded = encode("a\"b\nc\r\nd");
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('"'));
    }

    #[test]
    fn decode_accepts_predefined_entities() {
        assert_eq!(decode("&lt;a&gt; &amp; &quot;b&quot; &apos;c&apos;"), "<a> & \"b\" 'c'");
    }

    #[test]
    fn unknown_ampersand_passes_through() {
        assert_eq!(decode("AT&T &#999;"), "AT&T &#999;");
    }
}

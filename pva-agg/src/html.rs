//! Minimal HTML helpers for portal scraping
//!
//! Portals are scraped best-effort: these functions never fail, they return
//! empty collections when the markup is not what we expect.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Phrases portals use to say the search found nothing
const NO_RESULTS_PHRASES: &[&str] = &[
    "no results",
    "no records found",
    "no citations found",
    "no violations found",
    "no tickets found",
    "no outstanding",
    "no matching",
    "0 results",
    "did not return any",
    "could not find any",
];

fn input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<input\b[^>]*>").expect("static regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("static regex")
    })
}

fn meta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("static regex"))
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:citation|ticket|notice|violation)\s*(?:no\.?|number|#)?\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{5,19})")
            .expect("static regex")
    })
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</(?:p|div|li|tr|h[1-6]|header|footer|section|article)\s*>|<br\s*/?>")
            .expect("static regex")
    })
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\s?([0-9](?:[0-9]|,[0-9])*(?:\.[0-9]{2})?)").expect("static regex"))
}

pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Content between the end of the first `open_pat` tag and the next `close_pat`
pub fn slice_between_ci<'a>(s: &'a str, open_pat: &str, close_pat: &str) -> Option<&'a str> {
    let lc = to_lower(s);
    let o = lc.find(&to_lower(open_pat))?;
    let after = s[o..].find('>')? + o + 1;
    let cr = lc[after..].find(&to_lower(close_pat))?;
    Some(&s[after..after + cr])
}

/// Byte span of the next `<o ...> ... c` block starting at `from`
pub fn next_tag_block_ci(s: &str, o: &str, c: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let start = lc.get(from..)?.find(&to_lower(o))? + from;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(&to_lower(c))?;
    Some((start, open_end + end_rel + c.len()))
}

/// All `<o ...> ... c` blocks in order
pub fn tag_blocks_ci<'a>(s: &'a str, o: &str, c: &str) -> Vec<&'a str> {
    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some((start, end)) = next_tag_block_ci(s, o, c, pos) {
        blocks.push(&s[start..end]);
        pos = end;
    }
    blocks
}

pub fn inner_after_open_tag(block: &str) -> String {
    if let (Some(oe), Some(cs)) = (block.find('>'), block.rfind('<')) {
        if cs > oe {
            return block[oe + 1..cs].to_string();
        }
    }
    String::new()
}

/// Drop tags, decode common entities, collapse whitespace
pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&decode_entities(&out))
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#36;", "$")
}

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Attributes of a single opening tag, names lower-cased
pub fn tag_attributes(tag: &str) -> HashMap<String, String> {
    attr_re()
        .captures_iter(tag)
        .map(|cap| {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (to_lower(&cap[1]), value)
        })
        .collect()
}

/// Name/value pairs of every `<input type="hidden">`
///
/// Covers ASP.NET view state and anti-forgery tokens.
pub fn hidden_inputs(html: &str) -> Vec<(String, String)> {
    input_re()
        .find_iter(html)
        .filter_map(|m| {
            let attrs = tag_attributes(m.as_str());
            let is_hidden = attrs
                .get("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
            match (is_hidden, attrs.get("name")) {
                (true, Some(name)) if !name.is_empty() => Some((
                    name.clone(),
                    attrs.get("value").cloned().unwrap_or_default(),
                )),
                _ => None,
            }
        })
        .collect()
}

/// Token from `<meta name="csrf-token" content="...">`
pub fn csrf_meta_token(html: &str) -> Option<String> {
    meta_re().find_iter(html).find_map(|m| {
        let attrs = tag_attributes(m.as_str());
        let name = attrs.get("name")?;
        if name.eq_ignore_ascii_case("csrf-token") || name.eq_ignore_ascii_case("_csrf") {
            attrs.get("content").cloned()
        } else {
            None
        }
    })
}

/// Does the page say "nothing found" in one of the usual wordings?
pub fn contains_no_results(html: &str) -> bool {
    let text = to_lower(&strip_tags(html));
    NO_RESULTS_PHRASES.iter().any(|p| text.contains(p))
}

/// Parsed `<table>`: header texts plus body rows of cell texts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn parse(table_html: &str) -> Self {
        let mut headers = Vec::new();
        let mut rows = Vec::new();

        for row in tag_blocks_ci(table_html, "<tr", "</tr>") {
            let header_cells: Vec<String> = tag_blocks_ci(row, "<th", "</th>")
                .into_iter()
                .map(|c| strip_tags(inner_after_open_tag(c)))
                .collect();
            if headers.is_empty() && !header_cells.is_empty() {
                headers = header_cells;
                continue;
            }

            let cells: Vec<String> = tag_blocks_ci(row, "<td", "</td>")
                .into_iter()
                .map(|c| strip_tags(inner_after_open_tag(c)))
                .collect();
            if cells.iter().any(|c| !c.is_empty()) {
                rows.push(cells);
            }
        }

        Self { headers, rows }
    }

    /// Index of the first header containing any keyword (case-insensitive)
    pub fn column(&self, keywords: &[&str]) -> Option<usize> {
        self.headers.iter().position(|h| {
            let h = to_lower(h);
            keywords.iter().any(|k| h.contains(k))
        })
    }

    /// Like [`column`](Self::column), skipping headers containing any of `excluded`
    pub fn column_excluding(&self, keywords: &[&str], excluded: &[&str]) -> Option<usize> {
        self.headers.iter().position(|h| {
            let h = to_lower(h);
            keywords.iter().any(|k| h.contains(k)) && !excluded.iter().any(|x| h.contains(x))
        })
    }

    /// Cell text at (`row`, column matching `keywords`), blank as `None`
    pub fn cell<'a>(&self, row: &'a [String], keywords: &[&str]) -> Option<&'a str> {
        self.column(keywords)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// First table whose headers mention a citation/ticket/notice column
pub fn find_results_table(html: &str) -> Option<Table> {
    tag_blocks_ci(html, "<table", "</table>")
        .into_iter()
        .map(Table::parse)
        .find(|t| {
            t.column(&["citation", "ticket", "notice", "violation"]).is_some() && !t.rows.is_empty()
        })
}

/// Citation-looking identifiers in page text, in order, without repeats
pub fn extract_citation_numbers(html: &str) -> Vec<String> {
    citation_contexts(html)
        .into_iter()
        .map(|(number, _)| number)
        .collect()
}

/// Longest text window kept after a citation label
const CONTEXT_CHARS: usize = 160;

/// Citation numbers with the text that follows each one
///
/// The page is split at block-level tags first. A window runs from the
/// citation label to the next label or the end of its block, capped at
/// `CONTEXT_CHARS`.
pub fn citation_contexts(html: &str) -> Vec<(String, String)> {
    let mut contexts: Vec<(String, String)> = Vec::new();

    for block in block_break_re().split(html) {
        let text = strip_tags(block);
        let hits: Vec<(usize, String)> = citation_re()
            .captures_iter(&text)
            .filter_map(|cap| Some((cap.get(0)?.start(), cap[1].to_uppercase())))
            .filter(|(_, number)| number.chars().any(|c| c.is_ascii_digit()))
            .collect();

        for (i, (start, number)) in hits.iter().enumerate() {
            if contexts.iter().any(|(seen, _)| seen == number) {
                continue;
            }
            let end = hits.get(i + 1).map_or(text.len(), |(next, _)| *next);
            let window: String = text[*start..end].chars().take(CONTEXT_CHARS).collect();
            contexts.push((number.clone(), window));
        }
    }
    contexts
}

/// Dollar amounts (`$12.50`, `$1,200`) in page text, in order
pub fn extract_dollar_amounts(html: &str) -> Vec<String> {
    let text = strip_tags(html);
    amount_re()
        .captures_iter(&text)
        .map(|cap| cap[1].to_string())
        .collect()
}

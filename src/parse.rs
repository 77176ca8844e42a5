//! Page → records.
//!
//! The archive's markup has drifted over the years, so the parser works on
//! the raw text with a few tolerant steps instead of a DOM:
//!
//! 1. cut the page footer, probing an ordered list of [`BoundaryStrategy`]s,
//! 2. rewrite relative links against the archive base URL,
//! 3. split on the fragment separator and drop the leading page chrome,
//! 4. read a `M.D.YY H:MM am|pm` date from every fragment,
//! 5. apply the oversize policy and hash the stored bytes into an identity.
//!
//! A fragment without a readable date fails the whole page.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use url::Url;

use crate::config::{OversizePolicy, ParserConfig};
use crate::error::ParseError;
use crate::models::{Record, YearMonth};

/// Appended to fragments cut by [`OversizePolicy::Truncate`].
pub const TRUNCATION_MARKER: &str =
    "<span style='color: red'>... (too big for the search engine behind this site)</span>";

/// Upstream data-entry slip: day 12 was typed as 32 on some entries.
pub const DAY_TYPO_SENTINEL: u32 = 32;

static BOTTOM_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\s+name\s*=\s*["']?bottom["']?\s*>"#).unwrap());

static LINE_BREAK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:</?br\s*/?>\s*)+").unwrap());

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"'\s]*)["']"#).unwrap());

static SPACE_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&(?:nbsp|ensp|emsp|thinsp|numsp|#160|#xa0|#8194|#8195|#8199|#8201|#x2007);")
        .unwrap()
});

static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})\.(\d{1,2})\.(\d{4}|\d{2})(?:\s|<[^>]*>)+(\d{1,2}):(\d{2})\s*(am|pm|om)\b",
    )
    .unwrap()
});

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#).unwrap()
});

static YEAR_MONTH_IN_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{1,2})\b").unwrap());

/// Ways of finding where the record list ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStrategy {
    /// The `<A NAME="bottom">` anchor in front of the footer.
    BottomAnchor,
    /// Start of the last run of `<br>` markers, for pages without the anchor.
    TrailingLineBreaks,
}

/// Probe order for [`find_content_end`].
pub const BOUNDARY_STRATEGIES: [BoundaryStrategy; 2] = [
    BoundaryStrategy::BottomAnchor,
    BoundaryStrategy::TrailingLineBreaks,
];

impl BoundaryStrategy {
    pub fn locate(self, html: &str) -> Option<usize> {
        match self {
            BoundaryStrategy::BottomAnchor => BOTTOM_ANCHOR.find(html).map(|m| m.start()),
            BoundaryStrategy::TrailingLineBreaks => {
                LINE_BREAK_RUN.find_iter(html).last().map(|m| m.start())
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BoundaryStrategy::BottomAnchor => "bottom-anchor",
            BoundaryStrategy::TrailingLineBreaks => "trailing-line-breaks",
        }
    }
}

/// Byte offset where the page's content ends, and the strategy that found it.
pub fn find_content_end(html: &str) -> Option<(BoundaryStrategy, usize)> {
    BOUNDARY_STRATEGIES
        .iter()
        .find_map(|s| s.locate(html).map(|pos| (*s, pos)))
}

/// Rewrites relative `href` values to absolute URLs under `base`.
pub fn absolutize_links(html: &str, base: &Url) -> String {
    HREF.replace_all(html, |caps: &Captures| {
        let value = &caps[1];
        if Url::parse(value).is_ok() {
            return caps[0].to_string();
        }
        match base.join(value) {
            Ok(abs) => format!("href=\"{}\"", abs),
            Err(_) => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Splits on `separator`, drops the page head, and makes every fragment
/// start with the separator again.
pub fn split_fragments(html: &str, separator: &str) -> Vec<String> {
    html.split(separator)
        .skip(1)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| {
            if f.starts_with(separator) {
                f.to_string()
            } else {
                format!("{}{}", separator, f)
            }
        })
        .collect()
}

fn excerpt(text: &str) -> String {
    let end = floor_char_boundary(text, 120);
    text[..end].to_string()
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Reads the first `M.D.YY H:MM am|pm` timestamp out of a fragment.
pub fn extract_date(fragment: &str, max_year: i32) -> Result<NaiveDateTime, ParseError> {
    let unparsable = || ParseError::UnparsableDate {
        excerpt: excerpt(fragment),
    };

    let text = SPACE_ENTITY.replace_all(fragment, " ");
    let caps = DATE_TIME.captures(&text).ok_or_else(unparsable)?;

    let num = |i: usize| caps[i].parse::<u32>().map_err(|_| unparsable());
    let month = num(1)?;
    let mut day = num(2)?;
    let year_digits = &caps[3];
    let hour12 = num(4)?;
    let minute = num(5)?;
    let suffix = caps[6].to_ascii_lowercase();

    if day == DAY_TYPO_SENTINEL {
        day %= 20;
    }

    let year: i32 = year_digits.parse().map_err(|_| unparsable())?;
    let year = if year_digits.len() == 2 { 2000 + year } else { year };
    if year > max_year {
        return Err(unparsable());
    }

    if !(1..=12).contains(&hour12) {
        return Err(unparsable());
    }
    let hour = match (suffix.as_str(), hour12) {
        ("am", 12) => 0,
        ("am", h) => h,
        // "om" is a recurring typo for "pm"
        (_, 12) => 12,
        (_, h) => h + 12,
    };

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unparsable)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(unparsable)?;
    Ok(NaiveDateTime::new(date, time))
}

/// Month named by the latest page's "previous questions" link.
pub fn previous_month_link(html: &str) -> Result<YearMonth, ParseError> {
    ANCHOR
        .captures_iter(html)
        .filter(|caps| caps[2].to_ascii_lowercase().contains("previous"))
        .find_map(|caps| {
            let href = &caps[1];
            let ym = YEAR_MONTH_IN_HREF.captures_iter(href).last()?;
            YearMonth::new(ym[1].parse().ok()?, ym[2].parse().ok()?)
        })
        .ok_or(ParseError::PreviousLinkNotFound)
}

pub struct PageParser {
    base: Url,
    separator: String,
    max_fragment_bytes: usize,
    oversize: OversizePolicy,
    max_year: i32,
}

impl PageParser {
    pub fn new(config: &ParserConfig, base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
            separator: config.fragment_separator.clone(),
            max_fragment_bytes: config.max_fragment_bytes,
            oversize: config.oversize,
            max_year: config.effective_max_year(),
        })
    }

    pub fn parse(&self, html: &str) -> Result<Vec<Record>, ParseError> {
        let (strategy, end) = find_content_end(html).ok_or(ParseError::BoundaryNotFound)?;
        if strategy != BoundaryStrategy::BottomAnchor {
            tracing::warn!(strategy = strategy.name(), "primary end marker missing; using fallback");
        }

        let body = absolutize_links(&html[..end], &self.base);

        split_fragments(&body, &self.separator)
            .into_iter()
            .map(|fragment| {
                let date = extract_date(&fragment, self.max_year)?;
                let stored = self.apply_oversize(fragment);
                Ok(Record::new(stored, date))
            })
            .collect()
    }

    fn apply_oversize(&self, fragment: String) -> String {
        if fragment.len() <= self.max_fragment_bytes {
            return fragment;
        }
        match self.oversize {
            OversizePolicy::Passthrough => {
                tracing::debug!(bytes = fragment.len(), "oversized fragment kept as-is");
                fragment
            }
            OversizePolicy::Truncate => {
                tracing::warn!(bytes = fragment.len(), "truncating a big record");
                let end = floor_char_boundary(&fragment, self.max_fragment_bytes);
                format!("{}{}", &fragment[..end], TRUNCATION_MARKER)
            }
        }
    }
}

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::index::{open_index, SearchRequest};

/// Largest page `qah search` will ask for.
const MAX_PAGE_SIZE: usize = 100;

/// CLI entry point for `qah search`.
pub async fn run_search(config: &Config, term: &str, size: usize, from: usize) -> Result<()> {
    if size == 0 || size > MAX_PAGE_SIZE {
        bail!("--size must be between 1 and {}", MAX_PAGE_SIZE);
    }

    let index = open_index(config).await?;
    // A never-synced index has no schema yet; create it empty.
    index
        .ensure(false)
        .await
        .with_context(|| format!("Failed to open {} index", index.name()))?;
    let request = SearchRequest {
        term: term.trim().to_string(),
        size,
        from,
    };
    let hits = index.query(&request).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let date = hit
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let excerpt = hit
            .highlight
            .clone()
            .unwrap_or_else(|| crate::index::html_to_text(&hit.content_html));

        println!("{}. [{:.2}] {}", from + i + 1, hit.score, date);
        println!("    excerpt: \"{}\"", truncate_chars(excerpt.trim(), 200));
        println!("    id: {}", hit.id);
        println!();
    }

    Ok(())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}

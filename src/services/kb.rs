//! Knowledge base helpers: slugs and keyword relevance.

use std::collections::BTreeSet;

use crate::models::kb::KbArticle;

const MAX_SLUG_LEN: usize = 80;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "for", "how", "i", "in", "is", "it", "my", "not", "of",
    "on", "or", "the", "to", "with",
];

/// URL slug from a title: lowercase ASCII alphanumerics joined by `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_end_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    if slug.is_empty() {
        slug.push_str("article");
    }
    slug
}

/// First free slug among `base`, `base-2`, `base-3`, … given the slugs
/// already taken in the workspace.
pub fn next_free_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.iter().any(|s| s == candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Lowercase search terms with stopwords and single characters removed.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 1 && !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Relevance of an article for `query_terms`: each title occurrence of a
/// term counts 3, each body occurrence counts 1.
pub fn score(article: &KbArticle, query_terms: &[String]) -> u32 {
    let distinct: BTreeSet<&String> = query_terms.iter().collect();
    let title = terms(&article.title);
    let body = terms(&article.body);

    distinct
        .into_iter()
        .map(|term| {
            let in_title = title.iter().filter(|w| *w == term).count() as u32;
            let in_body = body.iter().filter(|w| *w == term).count() as u32;
            in_title * 3 + in_body
        })
        .sum()
}

/// Articles with a positive score for `query`, best first (ties by title).
pub fn rank<'a>(articles: &'a [KbArticle], query: &str, limit: usize) -> Vec<(&'a KbArticle, u32)> {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(&KbArticle, u32)> = articles
        .iter()
        .map(|article| (article, score(article, &query_terms)))
        .filter(|(_, score)| *score > 0)
        .collect();
    ranked.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then_with(|| a.title.cmp(&b.title)));
    ranked.truncate(limit);
    ranked
}

/// The first `max_chars` characters of `text`, cut at a word boundary when
/// possible, with an ellipsis when truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kb::ArticleStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn article(title: &str, body: &str) -> KbArticle {
        let now = Utc::now();
        KbArticle {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            title: title.to_string(),
            slug: slugify(title),
            body: body.to_string(),
            status: ArticleStatus::Published,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("How do I reset my password?"), "how-do-i-reset-my-password");
        assert_eq!(slugify("  --Billing & Invoices--  "), "billing-invoices");
        assert_eq!(slugify("¿¡!!"), "article");
    }

    #[test]
    fn slugify_caps_length_without_trailing_dash() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn next_free_slug_appends_counter() {
        let taken = vec!["reset".to_string(), "reset-2".to_string()];
        assert_eq!(next_free_slug("reset", &taken), "reset-3");
        assert_eq!(next_free_slug("billing", &taken), "billing");
    }

    #[test]
    fn terms_drop_stopwords() {
        assert_eq!(terms("How do I reset my Password?"), vec!["reset", "password"]);
    }

    #[test]
    fn title_matches_outweigh_body_matches() {
        let reset = article("Reset your password", "Use the forgot link.");
        let billing = article("Billing", "If you need to reset your password for billing...");
        let articles = [billing, reset];
        let ranked = rank(&articles, "password reset", 5);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.title, "Reset your password");
        assert_eq!(ranked[0].1, 6);
        assert_eq!(ranked[1].1, 2);
    }

    #[test]
    fn no_overlap_means_no_results() {
        let articles = [article("Shipping", "We ship worldwide")];
        assert!(rank(&articles, "password", 5).is_empty());
        assert!(rank(&[article("Shipping", "x")], "the and", 5).is_empty());
    }

    #[test]
    fn excerpt_cuts_on_word_boundary() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("one two three four", 9), "one two…");
    }
}

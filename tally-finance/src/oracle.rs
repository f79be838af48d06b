//! Categorization oracle seam and the prompt it is asked with.

use tally_core::CategoryCatalog;

/// External text classifier (an LLM completion endpoint in practice).
///
/// Errors of any kind (transport, timeout, quota, malformed body) are treated
/// by the resolver as "no answer".
pub trait CategoryOracle {
    fn classify(&self, system: &str, query: &str) -> anyhow::Result<String>;
}

impl<T: CategoryOracle + ?Sized> CategoryOracle for Box<T> {
    fn classify(&self, system: &str, query: &str) -> anyhow::Result<String> {
        (**self).classify(system, query)
    }
}

const PREAMBLE: &str = "You are an experienced business analyst who speaks every language and can \
find businesses using descriptions from credit card transactions. Use provided business \
descriptions to categorize transactions based on the name a business provides to the \
transaction. If you can't decide between one or more, pick the category that is more specific. \
If no category fits, return 'no category'. This list contains the category along with a \
description in parenthesis: ";

/// System instruction listing every approved category with its description.
pub fn instruction_prompt(catalog: &CategoryCatalog) -> String {
    let listing: Vec<String> = catalog
        .entries()
        .iter()
        .map(|e| format!("{} ({})", e.category, e.description.as_deref().unwrap_or("")))
        .collect();
    format!("{PREAMBLE}{}.", listing.join(", "))
}

/// Per-transaction question. Uses the raw counterparty text, digits included.
pub fn user_query(counterparty_original: &str) -> String {
    format!("What is the category for '{counterparty_original}'? Please only respond with the category.")
}

/// Strip quoting and punctuation models like to add, and lower-case.
pub fn clean_response(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '\'' | '"' | '`' | '.') || c.is_whitespace())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::CategoryEntry;

    #[test]
    fn test_instruction_lists_categories_with_descriptions() {
        let catalog = CategoryCatalog::new(vec![
            CategoryEntry::new("groceries", None),
            CategoryEntry::new("home", Some("Any home improvements or furniture")),
        ]);
        let prompt = instruction_prompt(&catalog);
        assert!(prompt.starts_with("You are an experienced business analyst"));
        assert!(prompt.ends_with("groceries (), home (Any home improvements or furniture)."));
        assert!(prompt.contains("return 'no category'"));
    }

    #[test]
    fn test_user_query_keeps_raw_text() {
        assert_eq!(
            user_query("coffee shop #2"),
            "What is the category for 'coffee shop #2'? Please only respond with the category."
        );
    }

    #[test]
    fn test_clean_response() {
        assert_eq!(clean_response("  'No Category'.\n"), "no category");
        assert_eq!(clean_response("Dining"), "dining");
        assert_eq!(clean_response("\"car/bike/metro\""), "car/bike/metro");
    }
}

use crate::pubmed::ABSTRACT_DELIMITER;

const MARKER_OPEN: &str = "(PMID:";

/// One abstract of a combined block, split into its identifier marker and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit<'a> {
    /// The unit as it appeared in the block.
    pub original: &'a str,
    /// Leading `(PMID: n)` token, closing parenthesis included.
    pub marker: Option<&'a str>,
    pub body: &'a str,
}

impl<'a> Unit<'a> {
    fn parse(original: &'a str) -> Self {
        let trimmed = original.trim();
        if trimmed.starts_with(MARKER_OPEN)
            && let Some(close) = trimmed.find(')')
        {
            return Self {
                original,
                marker: Some(&trimmed[..=close]),
                body: trimmed[close + 1..].trim(),
            };
        }
        Self {
            original,
            marker: None,
            body: trimmed,
        }
    }
}

/// Splits a combined block on the abstract delimiter, skipping blank units.
pub fn split_units(combined: &str) -> Vec<Unit<'_>> {
    combined
        .split(ABSTRACT_DELIMITER)
        .filter(|u| !u.trim().is_empty())
        .map(Unit::parse)
        .collect()
}

//! Whole-word matching against user-configured term lists.
//!
//! Every configured list (proxy terms, geographic disaggregation terms, UK synonyms) is compiled
//! into a single `TermMatcher`, which can be applied to plain strings or, as a polars expression,
//! to a whole column.

use nonempty::NonEmpty;
use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::{NamedFrom, Series};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdmxPrepError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    Insensitive,
    #[default]
    Sensitive,
}

/// A compiled alternation of terms, each anchored at word boundaries.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    terms: NonEmpty<String>,
    case_sensitivity: CaseSensitivity,
    pattern: String,
    regex: Regex,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Anchors a term so it only matches as a separate word. A boundary is only required on a side
/// where the term itself starts or ends with a word character, so terms such as "U.K." still match.
fn anchor(term: &str) -> String {
    let escaped = regex::escape(term);
    let start = match term.chars().next() {
        Some(c) if is_word_char(c) => r"\b",
        _ => "",
    };
    let end = match term.chars().last() {
        Some(c) if is_word_char(c) => r"\b",
        _ => "",
    };
    format!("{start}{escaped}{end}")
}

impl TermMatcher {
    /// Compiles `terms`, in order, into one matcher. Fails if the list or any term is empty.
    pub fn build(terms: &[String], case_sensitivity: CaseSensitivity) -> Result<Self> {
        let terms = NonEmpty::from_slice(terms)
            .ok_or_else(|| SdmxPrepError::config("term list must not be empty"))?;
        if let Some(blank) = terms.iter().find(|t| t.trim().is_empty()) {
            return Err(SdmxPrepError::config(format!(
                "term list must not contain blank terms: {blank:?}"
            )));
        }
        let alternation = terms
            .iter()
            .map(|term| anchor(term))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = match case_sensitivity {
            CaseSensitivity::Insensitive => format!("(?i)(?:{alternation})"),
            CaseSensitivity::Sensitive => format!("(?:{alternation})"),
        };
        let regex = Regex::new(&pattern)
            .map_err(|e| SdmxPrepError::config(format!("invalid term pattern {pattern}: {e}")))?;
        Ok(Self {
            terms,
            case_sensitivity,
            pattern,
            regex,
        })
    }

    pub fn terms(&self) -> &NonEmpty<String> {
        &self.terms
    }

    /// The regular expression the matcher compiles to.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Missing text never matches.
    pub fn matches(&self, text: Option<&str>) -> bool {
        text.map(|t| self.regex.is_match(t)).unwrap_or(false)
    }

    pub fn replace_all(&self, text: Option<&str>, replacement: &str) -> Option<String> {
        text.map(|t| {
            self.regex
                .replace_all(t, regex::NoExpand(replacement))
                .into_owned()
        })
    }

    /// Boolean expression over a string column; nulls evaluate to `false`.
    pub fn contains_expr(&self, column: &str) -> Expr {
        col(column)
            .str()
            .contains(lit(self.pattern.clone()), false)
            .fill_null(lit(false))
    }

    /// Boolean expression that is `true` where the whole cell equals one of the terms, under the
    /// same case rule as the pattern. Nulls evaluate to `false`.
    pub fn equals_any_expr(&self, column: &str) -> Expr {
        let (cell, terms): (Expr, Vec<String>) = match self.case_sensitivity {
            CaseSensitivity::Sensitive => (col(column), self.terms.iter().cloned().collect()),
            CaseSensitivity::Insensitive => (
                col(column).str().to_lowercase(),
                self.terms.iter().map(|t| t.to_lowercase()).collect(),
            ),
        };
        cell.is_in(lit(Series::new("terms", terms)))
            .fill_null(lit(false))
    }

    /// Replaces every match in a string column with `replacement`; nulls stay null.
    pub fn replace_expr(&self, column: &str, replacement: &str) -> Expr {
        col(column).str().replace_all(
            lit(self.pattern.clone()),
            lit(replacement.replace('$', "$$")),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use polars::df;
    use polars::prelude::{DataFrame, IntoLazy};

    use super::*;

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn empty_term_list_should_fail() {
        let result = TermMatcher::build(&[], CaseSensitivity::Sensitive);
        assert!(matches!(result, Err(SdmxPrepError::Config(_))));
    }

    #[test]
    fn short_term_should_not_match_inside_longer_word() {
        let matcher = TermMatcher::build(&terms(&["UK"]), CaseSensitivity::Sensitive).unwrap();
        assert!(!matcher.matches(Some("UKRAINE")));
        assert!(!matcher.matches(Some("Data for UKRAINE only")));
        assert!(matcher.matches(Some("UK")));
        assert!(matcher.matches(Some("Figures cover the UK, excluding Scotland")));
    }

    #[test]
    fn missing_text_does_not_match() {
        let matcher = TermMatcher::build(&terms(&["proxy"]), CaseSensitivity::Sensitive).unwrap();
        assert!(!matcher.matches(None));
        assert_eq!(matcher.replace_all(None, "x"), None);
    }

    #[test]
    fn multi_word_and_punctuated_terms() {
        let matcher = TermMatcher::build(
            &terms(&["Local authority", "U.K."]),
            CaseSensitivity::Sensitive,
        )
        .unwrap();
        assert!(matcher.matches(Some("Sex, Local authority")));
        assert!(!matcher.matches(Some("Local authorityX")));
        assert!(matcher.matches(Some("Covers the U.K.")));
        // Escaped: the dots are literal
        assert!(!matcher.matches(Some("UAKA")));
    }

    #[test]
    fn case_sensitivity_is_respected() {
        let sensitive =
            TermMatcher::build(&terms(&["Proxy"]), CaseSensitivity::Sensitive).unwrap();
        let insensitive =
            TermMatcher::build(&terms(&["Proxy"]), CaseSensitivity::Insensitive).unwrap();
        assert!(!sensitive.matches(Some("a proxy measure")));
        assert!(insensitive.matches(Some("a proxy measure")));
    }

    #[test]
    fn replace_all_normalizes_synonyms() {
        let matcher = TermMatcher::build(
            &terms(&["UK", "Great Britain and Northern Ireland"]),
            CaseSensitivity::Sensitive,
        )
        .unwrap();
        assert_eq!(
            matcher.replace_all(Some("UK"), "United Kingdom"),
            Some("United Kingdom".to_string())
        );
        assert_eq!(
            matcher.replace_all(Some("UKRAINE"), "United Kingdom"),
            Some("UKRAINE".to_string())
        );
    }

    #[test]
    fn column_expressions_agree_with_string_matching() -> anyhow::Result<()> {
        let matcher = TermMatcher::build(&terms(&["Region"]), CaseSensitivity::Sensitive)?;
        let df: DataFrame = df!(
            "text" => &[Some("Sex, Age, UK Region"), Some("Regional"), None, Some("Region")]
        )?;
        let out = df
            .lazy()
            .select([
                matcher.contains_expr("text").alias("matched"),
                matcher.replace_expr("text", "GEO").alias("replaced"),
            ])
            .collect()?;
        let matched: Vec<Option<bool>> = out.column("matched")?.bool()?.into_iter().collect();
        assert_eq!(matched, vec![Some(true), Some(false), Some(false), Some(true)]);
        let replaced: Vec<Option<&str>> = out.column("replaced")?.str()?.into_iter().collect();
        assert_eq!(
            replaced,
            vec![Some("Sex, Age, UK GEO"), Some("Regional"), None, Some("GEO")]
        );
        Ok(())
    }

    #[test]
    fn whole_cell_equality_follows_case_rule() -> anyhow::Result<()> {
        let df: DataFrame = df!(
            "text" => &[Some("UK"), Some("uk"), Some("UK, excluding Wales"), None]
        )?;
        let equal = |case_sensitivity| -> anyhow::Result<Vec<Option<bool>>> {
            let matcher = TermMatcher::build(&terms(&["UK"]), case_sensitivity)?;
            let out = df
                .clone()
                .lazy()
                .select([matcher.equals_any_expr("text").alias("equal")])
                .collect()?;
            Ok(out.column("equal")?.bool()?.into_iter().collect())
        };
        assert_eq!(
            equal(CaseSensitivity::Sensitive)?,
            vec![Some(true), Some(false), Some(false), Some(false)]
        );
        assert_eq!(
            equal(CaseSensitivity::Insensitive)?,
            vec![Some(true), Some(true), Some(false), Some(false)]
        );
        Ok(())
    }
}

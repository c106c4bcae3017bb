//! The per-indicator metadata table and the rules that classify it.

use log::{debug, info, warn};
use polars::lazy::dsl::{col, lit, when};
use polars::prelude::*;

use crate::error::{DataQualityWarning, Result};
use crate::source::{fetch_bytes, read_index_json};
use crate::terms::TermMatcher;
use crate::COL;

/// Marker identifying indicators that have been archived upstream.
pub const ARCHIVED_MARKER: &str = "archived";

/// Value used for coverage that is missing or recorded as `nan`.
pub const NO_COVERAGE: &str = "None";

/// The indicator record set, one row per indicator keyed by `indicator_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorStore(pub DataFrame);

fn ids_series(name: &str, ids: &[String]) -> Series {
    Series::new(name, ids)
}

impl IndicatorStore {
    /// Loads the indicator document at `location`, keeping `columns` only.
    pub async fn load(location: &str, columns: &[String]) -> Result<Self> {
        let bytes = fetch_bytes(location).await?;
        let df = read_index_json(location, &bytes, columns)?;
        info!("Loaded {} indicators from {location}", df.height());
        Ok(Self(df).clean()?)
    }

    pub fn as_df(&self) -> &DataFrame {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.height() == 0
    }

    /// Indicator IDs in the current row order.
    pub fn ids(&self) -> Result<Vec<String>> {
        Ok(self
            .0
            .column(COL::INDICATOR_ID)?
            .str()?
            .into_iter()
            .flatten()
            .map(|id| id.to_string())
            .collect())
    }

    /// `other_info` recorded as the literal "None" is treated as missing.
    fn clean(self) -> Result<Self> {
        let other_info = col(COL::OTHER_INFO);
        let df = self
            .0
            .lazy()
            .with_column(
                when(other_info.clone().eq(lit("None")))
                    .then(lit(NULL).cast(DataType::String))
                    .otherwise(other_info)
                    .alias(COL::OTHER_INFO),
            )
            .collect()?;
        Ok(Self(df))
    }

    /// Sets `proxy_indicator` from a whole-word match of `other_info` against the proxy terms,
    /// then forces every ID in `override_false_ids` to `false`. Returns the records that
    /// contradict the official-compliance sentence after classification.
    pub fn classify_proxy(
        &mut self,
        matcher: &TermMatcher,
        official_sentence: &str,
        override_false_ids: &[String],
    ) -> Result<Vec<DataQualityWarning>> {
        let overridden = col(COL::INDICATOR_ID)
            .is_in(lit(ids_series("override_ids", override_false_ids)))
            .fill_null(lit(false));
        self.0 = self
            .0
            .clone()
            .lazy()
            .with_column(
                when(overridden)
                    .then(lit(false))
                    .otherwise(matcher.contains_expr(COL::OTHER_INFO))
                    .alias(COL::PROXY_INDICATOR),
            )
            .collect()?;
        debug!("Proxy overrides applied: {override_false_ids:?}");

        let warnings = self
            .quality_check_contradictions(official_sentence)?
            .into_iter()
            .map(|indicator_id| DataQualityWarning {
                indicator_id,
                message: "flagged as a proxy but states it is the official data".into(),
            })
            .collect::<Vec<_>>();
        for warning in &warnings {
            warn!("Data quality: {warning}");
        }
        Ok(warnings)
    }

    /// IDs of proxy indicators whose `other_info` also contains the official sentence.
    pub fn quality_check_contradictions(&self, official_sentence: &str) -> Result<Vec<String>> {
        let contradictions = self
            .0
            .clone()
            .lazy()
            .filter(
                col(COL::PROXY_INDICATOR).and(
                    col(COL::OTHER_INFO)
                        .str()
                        .contains_literal(lit(official_sentence.to_string()))
                        .fill_null(lit(false)),
                ),
            )
            .select([col(COL::INDICATOR_ID)])
            .collect()?;
        IndicatorStore(contradictions).ids()
    }

    /// Replaces missing coverage and the literal `nan` with `None`.
    pub fn normalize_coverage_text(&mut self) -> Result<()> {
        let coverage = col(COL::NATIONAL_GEOGRAPHICAL_COVERAGE);
        self.0 = self
            .0
            .clone()
            .lazy()
            .with_column(
                when(coverage.clone().is_null().or(coverage.clone().eq(lit("nan"))))
                    .then(lit(NO_COVERAGE))
                    .otherwise(coverage)
                    .alias(COL::NATIONAL_GEOGRAPHICAL_COVERAGE),
            )
            .collect()?;
        Ok(())
    }

    /// Drops every record whose ID contains the archived marker.
    pub fn remove_archived(&mut self) -> Result<()> {
        let before = self.len();
        self.0 = self
            .0
            .clone()
            .lazy()
            .filter(
                col(COL::INDICATOR_ID)
                    .str()
                    .contains_literal(lit(ARCHIVED_MARKER))
                    .not(),
            )
            .collect()?;
        info!("Removed {} archived indicators", before - self.len());
        Ok(())
    }

    /// Sets `only_uk_data` where the coverage is exactly one of the UK terms and the indicator has
    /// no geographic disaggregation, then rewrites UK synonyms in the coverage to `uk_label`.
    ///
    /// Requires `geo_disag` to have been joined in.
    pub fn classify_uk(&mut self, matcher: &TermMatcher, uk_label: &str) -> Result<()> {
        let is_uk = matcher.equals_any_expr(COL::NATIONAL_GEOGRAPHICAL_COVERAGE);
        self.0 = self
            .0
            .clone()
            .lazy()
            .with_column(
                is_uk
                    .and(col(COL::GEO_DISAG).not())
                    .alias(COL::ONLY_UK_DATA),
            )
            // Text replacement runs after classification
            .with_column(
                matcher
                    .replace_expr(COL::NATIONAL_GEOGRAPHICAL_COVERAGE, uk_label)
                    .alias(COL::NATIONAL_GEOGRAPHICAL_COVERAGE),
            )
            .collect()?;
        Ok(())
    }

    /// Counts of `true` values in a boolean column.
    pub fn count_true(&self, column: &str) -> Result<usize> {
        Ok(self
            .0
            .column(column)?
            .bool()?
            .into_iter()
            .filter(|flag| *flag == Some(true))
            .count())
    }
}

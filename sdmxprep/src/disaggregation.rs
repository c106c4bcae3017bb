//! The disaggregation report and its reconciliation with the indicator record set.

use log::{debug, info, warn};
use polars::lazy::dsl::{col, lit};
use polars::prelude::*;

use crate::config::DisaggregationColumns;
use crate::error::{Result, SdmxPrepError};
use crate::indicators::IndicatorStore;
use crate::source::fetch_table;
use crate::terms::TermMatcher;
use crate::COL;

/// One row per indicator in the disaggregation report, with canonical column names.
#[derive(Debug, Clone, PartialEq)]
pub struct DisaggregationReport(pub DataFrame);

impl DisaggregationReport {
    /// Loads the report, keeps the configured columns and strips `id_marker` from the keys.
    pub async fn load(
        location: &str,
        columns: &DisaggregationColumns,
        id_marker: &str,
    ) -> Result<Self> {
        let df = fetch_table(location).await?;
        info!("Loaded disaggregation report {location} with shape {:?}", df.shape());
        Self::from_df(location, df, columns, id_marker)
    }

    pub fn from_df(
        location: &str,
        df: DataFrame,
        columns: &DisaggregationColumns,
        id_marker: &str,
    ) -> Result<Self> {
        let present = df.get_column_names();
        for required in [&columns.indicator, &columns.disaggregations] {
            if !present.contains(&required.as_str()) {
                return Err(SdmxPrepError::source(
                    location,
                    format!("required column `{required}` is absent"),
                ));
            }
        }
        let mut selection = vec![
            col(&columns.indicator)
                .cast(DataType::String)
                .str()
                .strip_prefix(lit(id_marker.to_string()))
                .str()
                .strip_chars(lit(" "))
                .alias(COL::INDICATOR_ID),
            col(&columns.disaggregations)
                .cast(DataType::String)
                .alias(COL::DISAGGREGATIONS),
        ];
        if present.contains(&columns.count.as_str()) {
            selection.push(
                col(&columns.count)
                    .cast(DataType::String)
                    .alias(COL::DISAGGREGATION_COUNT),
            );
        } else {
            debug!("No `{}` column in {location}", columns.count);
        }
        let df = df.lazy().select(selection).collect()?;
        Ok(Self(df))
    }

    /// Sets `geo_disag` from a whole-word match of the disaggregation list against the geo terms.
    pub fn classify_geo(&mut self, matcher: &TermMatcher) -> Result<()> {
        self.0 = self
            .0
            .clone()
            .lazy()
            .with_column(matcher.contains_expr(COL::DISAGGREGATIONS).alias(COL::GEO_DISAG))
            .collect()?;
        Ok(())
    }

    /// Left-joins the report onto `indicators` by indicator ID. Indicators without a report entry
    /// get `geo_disag = false`.
    pub fn join(&self, indicators: &IndicatorStore) -> Result<IndicatorStore> {
        let report = if self.0.get_column_names().contains(&COL::GEO_DISAG) {
            self.0.clone()
        } else {
            self.0
                .clone()
                .lazy()
                .with_column(lit(false).alias(COL::GEO_DISAG))
                .collect()?
        };

        let known: Vec<String> = indicators.ids()?;
        let unmatched = report
            .column(COL::INDICATOR_ID)?
            .str()?
            .into_iter()
            .flatten()
            .filter(|id| !known.iter().any(|k| k == id))
            .count();
        if unmatched > 0 {
            warn!("{unmatched} disaggregation report entries match no indicator");
        }

        let joined = indicators
            .0
            .clone()
            .lazy()
            .join(
                report.lazy(),
                [col(COL::INDICATOR_ID)],
                [col(COL::INDICATOR_ID)],
                JoinArgs::new(JoinType::Left),
            )
            .with_column(
                col(COL::GEO_DISAG)
                    .fill_null(lit(false))
                    .alias(COL::GEO_DISAG),
            )
            .collect()?;
        debug!("Joined indicators with shape {:?}", joined.shape());
        Ok(IndicatorStore(joined))
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::terms::CaseSensitivity;

    fn report() -> DisaggregationReport {
        let df = df!(
            "Indicator" => &["#1-1-1", "#8-1-1", "#99-9-9", "2-10-1"],
            "Disaggregations" => &["Sex, Age, UK Region", "Sex", "Local authority", "Age"],
            "Number of disaggregations" => &["3", "1", "1", "1"],
            "Extra" => &["a", "b", "c", "d"]
        )
        .unwrap();
        DisaggregationReport::from_df("report", df, &DisaggregationColumns::default(), "#")
            .unwrap()
    }

    fn geo_matcher() -> TermMatcher {
        TermMatcher::build(
            &["Region".to_string(), "Local authority".to_string()],
            CaseSensitivity::Sensitive,
        )
        .unwrap()
    }

    #[test]
    fn marker_is_stripped_from_keys() -> anyhow::Result<()> {
        let report = report();
        assert_eq!(report.0.shape(), (4, 3));
        let ids: Vec<Option<&str>> = report
            .0
            .column(COL::INDICATOR_ID)?
            .str()?
            .into_iter()
            .collect();
        assert_eq!(
            ids,
            vec![Some("1-1-1"), Some("8-1-1"), Some("99-9-9"), Some("2-10-1")]
        );
        Ok(())
    }

    #[test]
    fn missing_required_column_is_a_source_error() {
        let df = df!("Indicator" => &["#1-1-1"]).unwrap();
        let result =
            DisaggregationReport::from_df("report", df, &DisaggregationColumns::default(), "#");
        assert!(matches!(result, Err(SdmxPrepError::Source { .. })));
    }

    #[test]
    fn geo_disaggregation_uses_whole_words() -> anyhow::Result<()> {
        let mut report = report();
        report.classify_geo(&geo_matcher())?;
        let geo: Vec<Option<bool>> = report.0.column(COL::GEO_DISAG)?.bool()?.into_iter().collect();
        assert_eq!(geo, vec![Some(true), Some(false), Some(true), Some(false)]);
        Ok(())
    }

    #[test]
    fn join_leaves_no_missing_geo_flags() -> anyhow::Result<()> {
        let mut report = report();
        report.classify_geo(&geo_matcher())?;
        let indicators = IndicatorStore(df!(
            COL::INDICATOR_ID => &["1-1-1", "3-2-2", "8-1-1"],
            COL::OTHER_INFO => &[Some("x"), None, Some("y")]
        )?);
        let joined = report.join(&indicators)?;
        assert_eq!(joined.len(), 3);
        let geo = joined.0.column(COL::GEO_DISAG)?;
        assert_eq!(geo.null_count(), 0);
        let geo: Vec<Option<bool>> = geo.bool()?.into_iter().collect();
        assert_eq!(geo, vec![Some(true), Some(false), Some(false)]);
        let disaggregations: Vec<Option<&str>> = joined
            .0
            .column(COL::DISAGGREGATIONS)?
            .str()?
            .into_iter()
            .collect();
        assert_eq!(disaggregations, vec![Some("Sex, Age, UK Region"), None, Some("Sex")]);
        Ok(())
    }
}

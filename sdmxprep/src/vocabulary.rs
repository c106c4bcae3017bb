//! Vocabulary extraction: the disaggregation dimensions used by the included indicators, the
//! curated mapping of those dimensions onto exchange concepts, and the values observed for each.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;

use itertools::Itertools;
use log::{info, warn};
use polars::df;
use polars::prelude::*;

use crate::config::{ValueSourceConfig, SLUG_PLACEHOLDER};
use crate::error::{Result, SdmxPrepError};
use crate::indicators::IndicatorStore;
use crate::source::{fetch_table, read_manual_table, text_column};
use crate::COL;

/// Distinct dimension names across the `disaggregations` lists of `included`.
pub fn extract_dimension_names(
    included: &IndicatorStore,
    delimiter: &str,
) -> Result<BTreeSet<String>> {
    let df = included.as_df();
    if !df.get_column_names().contains(&COL::DISAGGREGATIONS) {
        return Ok(BTreeSet::new());
    }
    Ok(df
        .column(COL::DISAGGREGATIONS)?
        .str()?
        .into_iter()
        .flatten()
        .flat_map(|list| list.split(delimiter))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

/// Candidate table for curation: every dimension name with an empty exchange concept.
pub fn dimension_candidates_df(names: &BTreeSet<String>) -> Result<DataFrame> {
    let names = names.iter().map(|n| n.as_str()).collect_vec();
    let concepts = vec![""; names.len()];
    Ok(df!(
        COL::DIMENSION_NAME => names,
        COL::EXCHANGE_CONCEPT => concepts
    )?)
}

/// Lowercases and replaces spaces with hyphens, e.g. `Income quantile` → `income-quantile`.
pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// One curated `dimension name → exchange concept name` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMapping {
    pub dimension_name: String,
    pub exchange_concept: String,
}

/// The curated column mapping. Entries without an exchange concept are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping(pub Vec<DimensionMapping>);

impl ColumnMapping {
    pub async fn load(path: &str) -> Result<Self> {
        let df = read_manual_table(path).await?;
        Self::from_df(path, &df)
    }

    pub fn from_df(location: &str, df: &DataFrame) -> Result<Self> {
        let names = text_column(location, df, COL::DIMENSION_NAME)?;
        let concepts = text_column(location, df, COL::EXCHANGE_CONCEPT)?;
        let entries = names
            .into_iter()
            .zip(concepts.into_iter())
            .filter_map(|(name, concept)| {
                let name = name?.trim();
                let concept = concept?.trim();
                (!name.is_empty() && !concept.is_empty()).then(|| DimensionMapping {
                    dimension_name: name.to_string(),
                    exchange_concept: concept.to_string(),
                })
            })
            .collect_vec();
        info!("Column mapping has {} mapped dimensions", entries.len());
        Ok(Self(entries))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DimensionMapping> {
        self.0.iter()
    }

    pub fn concept_for(&self, dimension_name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|m| m.dimension_name == dimension_name)
            .map(|m| m.exchange_concept.as_str())
    }
}

/// One observed value of a dimension, with its resolution once the DSD has been consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePair {
    pub dimension_name: String,
    pub exchange_dimension: String,
    pub value: String,
    pub exchange_code: Option<String>,
    pub comment: Option<String>,
}

impl ValuePair {
    pub fn new(dimension_name: &str, exchange_dimension: &str, value: &str) -> Self {
        Self {
            dimension_name: dimension_name.to_string(),
            exchange_dimension: exchange_dimension.to_string(),
            value: value.to_string(),
            exchange_code: None,
            comment: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.exchange_code.is_some()
    }
}

/// Keeps the first pair for each `(exchange_dimension, value)`.
pub fn dedupe_value_pairs(pairs: Vec<ValuePair>) -> Vec<ValuePair> {
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(|p| seen.insert((p.exchange_dimension.clone(), p.value.clone())))
        .collect()
}

pub fn value_pairs_df(pairs: &[ValuePair]) -> Result<DataFrame> {
    Ok(df!(
        COL::DIMENSION_NAME => pairs.iter().map(|p| p.dimension_name.as_str()).collect_vec(),
        COL::EXCHANGE_DIMENSION => pairs.iter().map(|p| p.exchange_dimension.as_str()).collect_vec(),
        COL::VALUE => pairs.iter().map(|p| p.value.as_str()).collect_vec(),
        COL::EXCHANGE_CODE => pairs.iter().map(|p| p.exchange_code.as_deref()).collect_vec(),
        COL::COMMENT => pairs.iter().map(|p| p.comment.as_deref()).collect_vec()
    )?)
}

pub fn value_pairs_from_df(location: &str, df: &DataFrame) -> Result<Vec<ValuePair>> {
    let names = text_column(location, df, COL::DIMENSION_NAME)?;
    let dimensions = text_column(location, df, COL::EXCHANGE_DIMENSION)?;
    let values = text_column(location, df, COL::VALUE)?;
    let codes = text_column(location, df, COL::EXCHANGE_CODE)?;
    let comments = text_column(location, df, COL::COMMENT)?;
    Ok(itertools::izip!(
        names.into_iter(),
        dimensions.into_iter(),
        values.into_iter(),
        codes.into_iter(),
        comments.into_iter()
    )
    .filter_map(|(name, dimension, value, code, comment)| {
        Some(ValuePair {
            dimension_name: name?.to_string(),
            exchange_dimension: dimension?.to_string(),
            value: value?.to_string(),
            exchange_code: code.filter(|c| !c.is_empty()).map(str::to_string),
            comment: comment.filter(|c| !c.is_empty()).map(str::to_string),
        })
    })
    .collect())
}

/// Supplies the observed values of a dimension.
pub trait ValueSource {
    fn fetch_values(&self, dimension_name: &str) -> impl Future<Output = Result<Vec<String>>>;
}

/// Reads per-dimension value tables from a URL or path template containing `{slug}`.
#[derive(Debug, Clone)]
pub struct UrlTemplateValueSource {
    config: ValueSourceConfig,
}

impl UrlTemplateValueSource {
    pub fn new(config: ValueSourceConfig) -> Self {
        Self { config }
    }

    pub fn location(&self, dimension_name: &str) -> String {
        self.config
            .url_template
            .replace(SLUG_PLACEHOLDER, &slugify(dimension_name))
    }
}

impl ValueSource for UrlTemplateValueSource {
    async fn fetch_values(&self, dimension_name: &str) -> Result<Vec<String>> {
        let location = self.location(dimension_name);
        let df = fetch_table(&location).await?;
        let values = text_column(&location, &df, &self.config.value_column)?;
        Ok(values
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// A dimension left out of the value pairs, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDimension {
    pub dimension_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuePairExtraction {
    pub pairs: Vec<ValuePair>,
    pub skipped: Vec<SkippedDimension>,
}

/// One value pair per observed value of every mapped dimension. A dimension whose values cannot
/// be fetched is skipped and reported; the others are still extracted.
pub async fn extract_value_pairs<V: ValueSource>(
    mapping: &ColumnMapping,
    source: &V,
) -> Result<ValuePairExtraction> {
    let mut extraction = ValuePairExtraction::default();
    for entry in mapping.iter() {
        match source.fetch_values(&entry.dimension_name).await {
            Ok(values) => {
                info!(
                    "Found {} values for dimension `{}`",
                    values.len(),
                    entry.dimension_name
                );
                extraction.pairs.extend(values.iter().map(|value| {
                    ValuePair::new(&entry.dimension_name, &entry.exchange_concept, value)
                }));
            }
            Err(err @ SdmxPrepError::Source { .. }) => {
                warn!("Skipping dimension `{}`: {err}", entry.dimension_name);
                extraction.skipped.push(SkippedDimension {
                    dimension_name: entry.dimension_name.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    let before = extraction.pairs.len();
    extraction.pairs = dedupe_value_pairs(extraction.pairs);
    if before > extraction.pairs.len() {
        info!(
            "Dropped {} duplicate value pairs",
            before - extraction.pairs.len()
        );
    }
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use httpmock::prelude::*;
    use polars::df;

    use super::*;
    use crate::config::ValueSourceConfig;

    /// Serves values from memory; dimensions not in the map are unreachable.
    struct StaticValues(HashMap<String, Vec<String>>);

    impl ValueSource for StaticValues {
        async fn fetch_values(&self, dimension_name: &str) -> Result<Vec<String>> {
            self.0
                .get(dimension_name)
                .cloned()
                .ok_or_else(|| SdmxPrepError::source(slugify(dimension_name), "unreachable"))
        }
    }

    fn mapping(entries: &[(&str, &str)]) -> ColumnMapping {
        ColumnMapping(
            entries
                .iter()
                .map(|(name, concept)| DimensionMapping {
                    dimension_name: name.to_string(),
                    exchange_concept: concept.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn dimension_names_are_split_trimmed_and_distinct() -> anyhow::Result<()> {
        let included = IndicatorStore(df!(
            COL::INDICATOR_ID => &["1-1-1", "2-1-1", "3-1-1"],
            COL::DISAGGREGATIONS => &[Some("Sex, Age, UK Region"), None, Some("Age,Sex")]
        )?);
        let names = extract_dimension_names(&included, ",")?;
        assert_eq!(
            names.into_iter().collect_vec(),
            vec!["Age", "Sex", "UK Region"]
        );
        Ok(())
    }

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Income quantile"), "income-quantile");
        assert_eq!(slugify("Sex"), "sex");
    }

    #[test]
    fn column_mapping_drops_unmapped_rows() -> anyhow::Result<()> {
        let df = df!(
            COL::DIMENSION_NAME => &["Sex", "Age", "Colour"],
            COL::EXCHANGE_CONCEPT => &[Some("Sex"), Some(" "), None]
        )?;
        let mapping = ColumnMapping::from_df("mapping.csv", &df)?;
        assert_eq!(mapping.0.len(), 1);
        assert_eq!(mapping.concept_for("Sex"), Some("Sex"));
        assert_eq!(mapping.concept_for("Age"), None);
        Ok(())
    }

    #[test]
    fn candidate_table_has_blank_concepts() -> anyhow::Result<()> {
        let names = BTreeSet::from(["Age".to_string(), "Sex".to_string()]);
        let df = dimension_candidates_df(&names)?;
        assert_eq!(df.shape(), (2, 2));
        // A curated copy of the candidate table with nothing filled in maps nothing
        assert!(ColumnMapping::from_df("candidates", &df)?.0.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_dimensions_are_skipped() -> anyhow::Result<()> {
        let source = StaticValues(HashMap::from([(
            "Sex".to_string(),
            vec!["Female".to_string(), "Male".to_string()],
        )]));
        let extraction = extract_value_pairs(
            &mapping(&[("Sex", "Sex"), ("Income quantile", "Income")]),
            &source,
        )
        .await?;
        assert_eq!(extraction.pairs.len(), 2);
        assert_eq!(extraction.skipped.len(), 1);
        assert_eq!(extraction.skipped[0].dimension_name, "Income quantile");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_pairs_after_mapping_collapse() -> anyhow::Result<()> {
        let source = StaticValues(HashMap::from([
            ("Sex".to_string(), vec!["Female".to_string()]),
            ("Gender".to_string(), vec!["Female".to_string()]),
        ]));
        let extraction = extract_value_pairs(
            &mapping(&[("Sex", "Sex"), ("Gender", "Sex")]),
            &source,
        )
        .await?;
        assert_eq!(
            extraction.pairs,
            vec![ValuePair::new("Sex", "Sex", "Female")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn url_template_source_fetches_by_slug() -> anyhow::Result<()> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/disaggregation--income-quantile.csv");
            then.status(200)
                .body("Value,Number of indicators\nLowest quintile,3\nHighest quintile,2\n");
        });
        let source = UrlTemplateValueSource::new(ValueSourceConfig {
            url_template: server.url("/disaggregation--{slug}.csv"),
            ..Default::default()
        });
        let values = source.fetch_values("Income quantile").await?;
        mock.assert();
        assert_eq!(values, vec!["Lowest quintile", "Highest quintile"]);
        Ok(())
    }

    #[test]
    fn value_pairs_survive_a_table_round_trip() -> anyhow::Result<()> {
        let mut resolved = ValuePair::new("Sex", "Sex", "Female");
        resolved.exchange_code = Some("F".into());
        resolved.comment = Some("exact match".into());
        let pairs = vec![resolved, ValuePair::new("Age", "Age", "16 to 24")];
        let df = value_pairs_df(&pairs)?;
        assert_eq!(value_pairs_from_df("pairs.csv", &df)?, pairs);
        Ok(())
    }
}

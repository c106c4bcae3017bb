use std::collections::BTreeSet;

use config::Config;
use disaggregation::DisaggregationReport;
use dsd::{open_sheets, Dsd};
use error::{DataQualityWarning, Result};
use indicators::IndicatorStore;
use log::{debug, info};
use resolver::{CodeSelector, DeferSelector, DsdResolver, ManualCodes, ResolutionReport};
use source::read_manual_table;
use terms::TermMatcher;
use vocabulary::{
    extract_dimension_names, extract_value_pairs, value_pairs_from_df, ColumnMapping,
    UrlTemplateValueSource, ValuePair, ValuePairExtraction,
};

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod config;
pub mod disaggregation;
pub mod dsd;
pub mod error;
pub mod formatters;
pub mod fuzzy;
pub mod indicators;
pub mod resolver;
pub mod source;
pub mod suitability;
pub mod terms;
pub mod vocabulary;

/// Classified indicator records and the subset that proceeds to SDMX mapping
#[derive(Debug, Clone)]
pub struct Classification {
    pub indicators: IndicatorStore,
    pub included: IndicatorStore,
    pub warnings: Vec<DataQualityWarning>,
}

/// Counts reported once classification has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub indicators: usize,
    pub proxies: usize,
    pub only_uk: usize,
    pub geo_disaggregated: usize,
    pub included: usize,
    pub warnings: usize,
}

impl Classification {
    pub fn summary(&self) -> Result<ClassificationSummary> {
        Ok(ClassificationSummary {
            indicators: self.indicators.len(),
            proxies: self.indicators.count_true(COL::PROXY_INDICATOR)?,
            only_uk: self.indicators.count_true(COL::ONLY_UK_DATA)?,
            geo_disaggregated: self.indicators.count_true(COL::GEO_DISAG)?,
            included: self.included.len(),
            warnings: self.warnings.len(),
        })
    }
}

/// Type for the preparation pipeline, one stage per method
pub struct SdmxPrep {
    pub config: Config,
}

impl SdmxPrep {
    /// Setup the pipeline, failing on any missing configuration before a source is read
    pub fn new(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        config.validate()?;
        Ok(Self { config })
    }

    fn matcher(&self, terms: &[String]) -> Result<TermMatcher> {
        TermMatcher::build(terms, self.config.case_sensitivity)
    }

    /// Loads both sources, applies every classification rule and selects the included records
    pub async fn classify(&self) -> Result<Classification> {
        let config = &self.config;
        let proxy = self.matcher(&config.proxy_terms)?;
        let geo = self.matcher(&config.geo_terms)?;
        let uk = self.matcher(&config.uk_terms)?;

        let mut indicators =
            IndicatorStore::load(&config.indicator_source, &config.indicator_columns).await?;
        indicators.remove_archived()?;
        let warnings = indicators.classify_proxy(
            &proxy,
            &config.official_sentence,
            &config.proxy_override_ids,
        )?;
        indicators.normalize_coverage_text()?;

        let mut report = DisaggregationReport::load(
            &config.disaggregation_source,
            &config.disaggregation_columns,
            &config.id_marker,
        )
        .await?;
        report.classify_geo(&geo)?;
        let mut indicators = report.join(&indicators)?;
        indicators.classify_uk(&uk, &config.uk_label)?;

        let included = indicators.included(
            &config.suitability,
            &config.superseded_ids,
            &config.sort_hierarchy,
        )?;
        info!(
            "{} of {} indicators are suitable for mapping",
            included.len(),
            indicators.len()
        );
        Ok(Classification {
            indicators,
            included,
            warnings,
        })
    }

    /// Distinct dimension names used by the included indicators
    pub fn dimension_candidates(&self, classification: &Classification) -> Result<BTreeSet<String>> {
        extract_dimension_names(
            &classification.included,
            &self.config.disaggregation_delimiter,
        )
    }

    /// The curated column mapping named in the configuration
    pub async fn column_mapping(&self) -> Result<ColumnMapping> {
        ColumnMapping::load(&self.config.manual.column_mapping).await
    }

    pub async fn value_pairs(&self, mapping: &ColumnMapping) -> Result<ValuePairExtraction> {
        let source = UrlTemplateValueSource::new(self.config.value_source.clone());
        extract_value_pairs(mapping, &source).await
    }

    /// Codes recorded by an earlier run, when replaying them is enabled
    pub async fn manual_codes(&self) -> Result<Option<ManualCodes>> {
        let manual = &self.config.manual;
        if !manual.map_manual_names_to_codes {
            return Ok(None);
        }
        let path = manual
            .code_mapping
            .as_deref()
            .unwrap_or(&self.config.outputs.value_pairs);
        let df = read_manual_table(path).await?;
        Ok(Some(ManualCodes::from_pairs(&value_pairs_from_df(path, &df)?)))
    }

    /// Resolves `pairs` against the DSD. `selector` is consulted only when manual choice is
    /// enabled; otherwise ambiguous pairs are left for a later run.
    pub async fn resolve<C: CodeSelector>(
        &self,
        pairs: Vec<ValuePair>,
        selector: &mut C,
    ) -> Result<ResolutionReport> {
        let dsd = Dsd::new(
            open_sheets(&self.config.dsd.location).await?,
            self.config.dsd.clone(),
        );
        let mut resolver = DsdResolver::new(dsd, self.config.manual.candidate_limit);
        if let Some(manual) = self.manual_codes().await? {
            resolver = resolver.with_manual_codes(manual);
        }
        if self.config.manual.manually_choose_code_mapping {
            resolver.resolve(pairs, selector)
        } else {
            resolver.resolve(pairs, &mut DeferSelector)
        }
    }
}

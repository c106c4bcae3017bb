use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdmxPrepError};
use crate::suitability::PredicateValue;
use crate::terms::CaseSensitivity;
use crate::COL;

/// Placeholder substituted with the slugified dimension name in `ValueSourceConfig::url_template`.
pub const SLUG_PLACEHOLDER: &str = "{slug}";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// URL or path of the indicator metadata document (an object keyed by indicator ID).
    pub indicator_source: String,
    /// Columns kept from the indicator metadata.
    pub indicator_columns: Vec<String>,
    /// URL or path of the disaggregation report.
    pub disaggregation_source: String,
    pub disaggregation_columns: DisaggregationColumns,
    /// Marker prefixed to indicator keys in the disaggregation report.
    pub id_marker: String,
    pub proxy_terms: Vec<String>,
    /// Indicators forced to `proxy_indicator = false` whatever their text says.
    pub proxy_override_ids: Vec<String>,
    pub geo_terms: Vec<String>,
    pub uk_terms: Vec<String>,
    pub uk_label: String,
    pub official_sentence: String,
    pub case_sensitivity: CaseSensitivity,
    pub suitability: BTreeMap<String, PredicateValue>,
    pub superseded_ids: Vec<String>,
    /// Names of the components of an indicator ID, in sort priority order.
    pub sort_hierarchy: Vec<String>,
    pub disaggregation_delimiter: String,
    pub value_source: ValueSourceConfig,
    pub dsd: DsdConfig,
    pub manual: ManualConfig,
    pub outputs: OutputPaths,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            indicator_source: String::new(),
            indicator_columns: vec![
                COL::OTHER_INFO.into(),
                COL::NATIONAL_GEOGRAPHICAL_COVERAGE.into(),
            ],
            disaggregation_source: String::new(),
            disaggregation_columns: DisaggregationColumns::default(),
            id_marker: "#".into(),
            proxy_terms: vec![],
            proxy_override_ids: vec![],
            geo_terms: vec![],
            uk_terms: vec![],
            uk_label: "United Kingdom".into(),
            official_sentence: String::new(),
            case_sensitivity: CaseSensitivity::Sensitive,
            suitability: BTreeMap::new(),
            superseded_ids: vec![],
            sort_hierarchy: vec!["goal".into(), "target".into(), "indicator".into()],
            disaggregation_delimiter: ",".into(),
            value_source: ValueSourceConfig::default(),
            dsd: DsdConfig::default(),
            manual: ManualConfig::default(),
            outputs: OutputPaths::default(),
            verbose: false,
        }
    }
}

/// Column names in the disaggregation report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DisaggregationColumns {
    pub indicator: String,
    pub disaggregations: String,
    pub count: String,
}

impl Default for DisaggregationColumns {
    fn default() -> Self {
        Self {
            indicator: "Indicator".into(),
            disaggregations: "Disaggregations".into(),
            count: "Number of disaggregations".into(),
        }
    }
}

/// Where the observed values of each disaggregation dimension are published.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ValueSourceConfig {
    /// URL or path containing `{slug}`, e.g. `https://example.org/disaggregation--{slug}.csv`.
    pub url_template: String,
    pub value_column: String,
}

impl Default for ValueSourceConfig {
    fn default() -> Self {
        Self {
            url_template: String::new(),
            value_column: "Value".into(),
        }
    }
}

/// Location and sheet layout of the Data Structure Definition workbook.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DsdConfig {
    /// A workbook (`.xlsx`, `.xls`, `.ods`) or a directory of `<SHEET>.csv` exports.
    pub location: String,
    pub concept_scheme_sheet: String,
    pub concept_skip_rows: usize,
    pub concept_id_column: usize,
    pub concept_name_column: usize,
    pub concept_code_list_column: usize,
    pub code_list_skip_rows: usize,
    pub code_column: usize,
    pub code_name_column: usize,
}

impl Default for DsdConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            concept_scheme_sheet: "CONCEPTS".into(),
            concept_skip_rows: 11,
            concept_id_column: 1,
            concept_name_column: 2,
            concept_code_list_column: 7,
            code_list_skip_rows: 12,
            code_column: 0,
            code_name_column: 4,
        }
    }
}

/// Human-curated inputs and the toggles controlling how they are used.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ManualConfig {
    /// Curated `dimension_name,exchange_concept` table.
    pub column_mapping: String,
    /// Previously resolved value-pair table reused as manual code choices.
    pub code_mapping: Option<String>,
    pub map_manual_names_to_codes: bool,
    pub manually_choose_code_mapping: bool,
    pub candidate_limit: usize,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            column_mapping: "column_mapping.csv".into(),
            code_mapping: None,
            map_manual_names_to_codes: false,
            manually_choose_code_mapping: true,
            candidate_limit: 8,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputPaths {
    pub indicators: String,
    pub dimension_candidates: String,
    pub value_pairs: String,
    pub code_mapping: String,
    pub column_mapping: String,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            indicators: "output/indicators.csv".into(),
            dimension_candidates: "output/dimension_candidates.csv".into(),
            value_pairs: "output/value_pairs.csv".into(),
            code_mapping: "output/code_mapping.tsv".into(),
            column_mapping: "output/column_mapping.tsv".into(),
        }
    }
}

fn require_text(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SdmxPrepError::config(format!(
            "required key `{key}` is missing or empty"
        )));
    }
    Ok(())
}

fn require_list<T>(key: &str, value: &[T]) -> Result<()> {
    if value.is_empty() {
        return Err(SdmxPrepError::config(format!(
            "required key `{key}` is missing or empty"
        )));
    }
    Ok(())
}

impl Config {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| SdmxPrepError::config(format!("invalid YAML in config: {e}")))
    }

    /// Checks every key the pipeline cannot run without. Called before any source is read.
    pub fn validate(&self) -> Result<()> {
        require_text("indicator_source", &self.indicator_source)?;
        require_list("indicator_columns", &self.indicator_columns)?;
        for column in [COL::OTHER_INFO, COL::NATIONAL_GEOGRAPHICAL_COVERAGE] {
            if !self.indicator_columns.iter().any(|c| c == column) {
                return Err(SdmxPrepError::config(format!(
                    "`indicator_columns` must include `{column}`"
                )));
            }
        }
        require_text("disaggregation_source", &self.disaggregation_source)?;
        require_text(
            "disaggregation_columns.indicator",
            &self.disaggregation_columns.indicator,
        )?;
        require_text(
            "disaggregation_columns.disaggregations",
            &self.disaggregation_columns.disaggregations,
        )?;
        require_list("proxy_terms", &self.proxy_terms)?;
        require_list("geo_terms", &self.geo_terms)?;
        require_list("uk_terms", &self.uk_terms)?;
        require_text("official_sentence", &self.official_sentence)?;
        require_list(
            "suitability",
            &self.suitability.keys().collect::<Vec<_>>(),
        )?;
        require_list("sort_hierarchy", &self.sort_hierarchy)?;
        require_text("disaggregation_delimiter", &self.disaggregation_delimiter)?;
        require_text("value_source.url_template", &self.value_source.url_template)?;
        if !self.value_source.url_template.contains(SLUG_PLACEHOLDER) {
            return Err(SdmxPrepError::config(format!(
                "`value_source.url_template` must contain `{SLUG_PLACEHOLDER}`: {}",
                self.value_source.url_template
            )));
        }
        require_text("dsd.location", &self.dsd.location)?;
        if self.manual.candidate_limit == 0 {
            return Err(SdmxPrepError::config(
                "`manual.candidate_limit` must be at least 1",
            ));
        }
        Ok(())
    }
}

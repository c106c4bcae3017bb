//! This module stores the column names of the record sets passed between pipeline stages. Columns
//! read from the indicator metadata keep their upstream names so that they survive the projection
//! onto the configured required columns.

pub const INDICATOR_ID: &str = "indicator_id";
pub const OTHER_INFO: &str = "other_info";
pub const NATIONAL_GEOGRAPHICAL_COVERAGE: &str = "national_geographical_coverage";

pub const PROXY_INDICATOR: &str = "proxy_indicator";
pub const GEO_DISAG: &str = "geo_disag";
pub const ONLY_UK_DATA: &str = "only_uk_data";

pub const DISAGGREGATIONS: &str = "disaggregations";
pub const DISAGGREGATION_COUNT: &str = "disaggregation_count";

pub const DIMENSION_NAME: &str = "dimension_name";
pub const EXCHANGE_CONCEPT: &str = "exchange_concept";
pub const EXCHANGE_DIMENSION: &str = "exchange_dimension";
pub const VALUE: &str = "value";
pub const EXCHANGE_CODE: &str = "exchange_code";
pub const COMMENT: &str = "comment";

/// Headers of the two final mapping tables.
pub mod mapping {
    pub const TEXT: &str = "Text";
    pub const DIMENSION: &str = "Dimension";
    pub const VALUE: &str = "Value";
}

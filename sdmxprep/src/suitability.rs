//! Selecting the indicators that proceed to SDMX mapping, and ordering them.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, info};
use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdmxPrepError};
use crate::indicators::IndicatorStore;
use crate::COL;

/// Required value of one column in the suitability predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Bool(bool),
    Text(String),
}

impl From<&PredicateValue> for Expr {
    fn from(value: &PredicateValue) -> Self {
        match value {
            PredicateValue::Bool(b) => lit(*b),
            PredicateValue::Text(s) => lit(s.clone()),
        }
    }
}

/// Combine multiple queries with AND. If there are no queries in the input list, returns None.
fn combine_exprs_with_and(exprs: Vec<Expr>) -> Option<Expr> {
    let mut query: Option<Expr> = None;
    for expr in exprs {
        query = if let Some(partial_query) = query {
            Some(partial_query.and(expr))
        } else {
            Some(expr)
        };
    }
    query
}

/// One component of an indicator ID. Numeric components order before alphabetic ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyComponent {
    Numeric(u64),
    Text(String),
}

impl From<&str> for KeyComponent {
    fn from(value: &str) -> Self {
        value
            .parse::<u64>()
            .map(KeyComponent::Numeric)
            .unwrap_or_else(|_| KeyComponent::Text(value.to_string()))
    }
}

/// Splits `id` on `-` into `levels` components; any remainder stays in the last component.
fn split_key(id: &str, levels: usize) -> Vec<KeyComponent> {
    id.splitn(levels, '-').map(KeyComponent::from).collect()
}

fn compare_keys(a: &[KeyComponent], b: &[KeyComponent]) -> Ordering {
    // Missing trailing components sort first
    a.iter().cmp(b.iter())
}

impl IndicatorStore {
    /// Keeps the records satisfying every `column == value` clause of `predicate`.
    pub fn filter(&self, predicate: &BTreeMap<String, PredicateValue>) -> Result<IndicatorStore> {
        let columns = self.0.get_column_names();
        let mut clauses = vec![];
        for (column, value) in predicate {
            if !columns.contains(&column.as_str()) {
                return Err(SdmxPrepError::config(format!(
                    "suitability predicate refers to unknown column `{column}`"
                )));
            }
            clauses.push(col(column).eq(Expr::from(value)).fill_null(lit(false)));
        }
        let expr = combine_exprs_with_and(clauses)
            .ok_or_else(|| SdmxPrepError::config("suitability predicate must not be empty"))?;
        debug!("Suitability expression: {expr:?}");
        let df = self.0.clone().lazy().filter(expr).collect()?;
        info!("{} of {} indicators are suitable", df.height(), self.len());
        Ok(IndicatorStore(df))
    }

    /// Removes the given indicator IDs.
    pub fn exclude(&self, ids: &[String]) -> Result<IndicatorStore> {
        let df = self
            .0
            .clone()
            .lazy()
            .filter(
                col(COL::INDICATOR_ID)
                    .is_in(lit(Series::new("excluded_ids", ids)))
                    .fill_null(lit(false))
                    .not(),
            )
            .collect()?;
        Ok(IndicatorStore(df))
    }

    /// Sorts by the components of the indicator ID, split on `-` into one component per entry
    /// of `hierarchy_keys`. Numeric components compare numerically, so `2-9-1` precedes `2-10-1`.
    pub fn sort(&self, hierarchy_keys: &[String]) -> Result<IndicatorStore> {
        if hierarchy_keys.is_empty() {
            return Err(SdmxPrepError::config("sort hierarchy must not be empty"));
        }
        let keys: Vec<Vec<KeyComponent>> = self
            .0
            .column(COL::INDICATOR_ID)?
            .str()?
            .into_iter()
            .map(|id| split_key(id.unwrap_or_default(), hierarchy_keys.len()))
            .collect();
        let mut order: Vec<IdxSize> = (0..keys.len() as IdxSize).collect();
        // Stable, so records with equal keys keep their relative order
        order.sort_by(|a, b| compare_keys(&keys[*a as usize], &keys[*b as usize]));
        debug!("Sorting by {hierarchy_keys:?}");
        let idx = IdxCa::from_vec("idx", order);
        Ok(IndicatorStore(self.0.take(&idx)?))
    }

    /// Filters by `predicate`, drops `superseded` and sorts by `hierarchy_keys`.
    pub fn included(
        &self,
        predicate: &BTreeMap<String, PredicateValue>,
        superseded: &[String],
        hierarchy_keys: &[String],
    ) -> Result<IndicatorStore> {
        self.filter(predicate)?
            .exclude(superseded)?
            .sort(hierarchy_keys)
    }
}

//! Resolution of observed dimension values to DSD codes.
//!
//! Each value pair is resolved in order by: a code recorded in the manual code file (when
//! enabled), an exact match on a code-list name, and finally a selection among fuzzy-ranked
//! candidates made by a `CodeSelector`. Candidate generation is pure; selection is injected.

use std::collections::{HashMap, HashSet, VecDeque};

use itertools::Itertools;
use log::{debug, info, warn};
use polars::df;
use polars::prelude::*;
use strum_macros::{Display, EnumString};

use crate::dsd::{CodeList, ConceptScheme, Dsd, SheetSource};
use crate::error::{Result, SdmxPrepError};
use crate::fuzzy::partial_token_sort_ratio;
use crate::vocabulary::{dedupe_value_pairs, ColumnMapping, SkippedDimension, ValuePair};
use crate::COL;

/// Code assigned when no code-list entry corresponds to a value.
pub const NO_MATCH_CODE: &str = "None";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ResolutionComment {
    #[strum(serialize = "exact match")]
    ExactMatch,
    #[strum(serialize = "manually chosen")]
    ManuallyChosen,
    #[strum(serialize = "manually declined")]
    ManuallyDeclined,
    #[strum(serialize = "no candidates found")]
    NoCandidates,
    #[strum(serialize = "awaiting manual choice")]
    AwaitingChoice,
    #[strum(serialize = "from manual mapping")]
    FromManualMapping,
    #[strum(serialize = "dimension not in concept scheme")]
    UnknownDimension,
}

/// A code-list entry ranked against a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    pub score: f64,
}

/// Every code-list entry scored against `value`, best first, at most `limit` of them. Entries
/// with equal scores keep their code-list order.
pub fn score_candidates(value: &str, code_list: &CodeList, limit: usize) -> Vec<Candidate> {
    code_list
        .codes
        .iter()
        .map(|c| Candidate {
            code: c.code.clone(),
            name: c.name.clone(),
            score: partial_token_sort_ratio(value, &c.name),
        })
        .filter(|c| c.score > 0.0)
        .sorted_by(|a, b| b.score.total_cmp(&a.score))
        .take(limit)
        .collect()
}

/// Outcome of presenting candidates for one value pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based index into the presented candidates.
    Candidate(usize),
    NoMatch,
    /// Leave the pair unresolved for now.
    Defer,
}

/// Chooses among the candidates for a value pair.
pub trait CodeSelector {
    fn select(&mut self, pair: &ValuePair, candidates: &[Candidate]) -> Result<Selection>;
}

/// Parses a one-based menu choice where `shown + 1` is "no match".
pub fn parse_selection(input: &str, shown: usize) -> Result<Selection> {
    let input = input.trim();
    let choice: usize = input.parse().map_err(|_| SdmxPrepError::InputValidation {
        input: input.to_string(),
        reason: format!("enter a whole number between 1 and {}", shown + 1),
    })?;
    match choice {
        n if n >= 1 && n <= shown => Ok(Selection::Candidate(n - 1)),
        n if n == shown + 1 => Ok(Selection::NoMatch),
        _ => Err(SdmxPrepError::InputValidation {
            input: input.to_string(),
            reason: format!("choice must be between 1 and {}", shown + 1),
        }),
    }
}

/// Replays selections made ahead of time, deferring once they run out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSelector(pub VecDeque<Selection>);

impl CodeSelector for ScriptedSelector {
    fn select(&mut self, _pair: &ValuePair, _candidates: &[Candidate]) -> Result<Selection> {
        Ok(self.0.pop_front().unwrap_or(Selection::Defer))
    }
}

/// Never chooses; every pair without an exact or recorded code stays unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferSelector;

impl CodeSelector for DeferSelector {
    fn select(&mut self, pair: &ValuePair, _candidates: &[Candidate]) -> Result<Selection> {
        debug!(
            "Deferring `{}` in dimension `{}`",
            pair.value, pair.exchange_dimension
        );
        Ok(Selection::Defer)
    }
}

/// Codes recorded in an earlier run's value-pair table, keyed by `(exchange_dimension, value)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualCodes(HashMap<(String, String), (String, Option<String>)>);

impl ManualCodes {
    pub fn from_pairs(pairs: &[ValuePair]) -> Self {
        Self(
            pairs
                .iter()
                .filter_map(|p| {
                    let code = p.exchange_code.clone()?;
                    Some((
                        (p.exchange_dimension.clone(), p.value.clone()),
                        (code, p.comment.clone()),
                    ))
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get(&self, pair: &ValuePair) -> Option<&(String, Option<String>)> {
        self.0
            .get(&(pair.exchange_dimension.clone(), pair.value.clone()))
    }
}

fn set(pair: &mut ValuePair, code: &str, comment: ResolutionComment) {
    pair.exchange_code = Some(code.to_string());
    pair.comment = Some(comment.to_string());
}

/// Assigns the code whose name equals the value exactly. Returns whether it did.
pub fn resolve_exact(pair: &mut ValuePair, code_list: &CodeList) -> bool {
    match code_list.code_for(&pair.value) {
        Some(code) => {
            set(pair, code, ResolutionComment::ExactMatch);
            true
        }
        None => false,
    }
}

/// Ranks the code list against the value and lets `selector` choose.
pub fn resolve_fuzzy<C: CodeSelector>(
    pair: &mut ValuePair,
    code_list: &CodeList,
    candidate_limit: usize,
    selector: &mut C,
) -> Result<()> {
    let candidates = score_candidates(&pair.value, code_list, candidate_limit);
    if candidates.is_empty() {
        set(pair, NO_MATCH_CODE, ResolutionComment::NoCandidates);
        return Ok(());
    }
    match selector.select(pair, &candidates)? {
        Selection::Candidate(i) => {
            let candidate = candidates.get(i).ok_or_else(|| SdmxPrepError::InputValidation {
                input: (i + 1).to_string(),
                reason: format!("only {} candidates were offered", candidates.len()),
            })?;
            set(pair, &candidate.code, ResolutionComment::ManuallyChosen);
        }
        Selection::NoMatch => set(pair, NO_MATCH_CODE, ResolutionComment::ManuallyDeclined),
        Selection::Defer => {
            pair.exchange_code = None;
            pair.comment = Some(ResolutionComment::AwaitingChoice.to_string());
        }
    }
    Ok(())
}

/// Code lists read during one run, each read at most once.
#[derive(Debug, Default)]
pub struct CodeIndexCache {
    lists: HashMap<String, CodeList>,
    reads: usize,
}

impl CodeIndexCache {
    pub fn get_or_load<S: SheetSource>(
        &mut self,
        dsd: &mut Dsd<S>,
        code_list_id: &str,
    ) -> Result<&CodeList> {
        if !self.lists.contains_key(code_list_id) {
            let list = dsd.code_list(code_list_id)?;
            self.reads += 1;
            self.lists.insert(code_list_id.to_string(), list);
        }
        self.lists
            .get(code_list_id)
            .ok_or_else(|| SdmxPrepError::source(code_list_id, "code list missing from cache"))
    }

    /// Number of code-list sheets actually read.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

/// Resolved value pairs together with what is needed to assemble the mapping tables.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub pairs: Vec<ValuePair>,
    pub skipped: Vec<SkippedDimension>,
    pub concept_scheme: ConceptScheme,
}

impl ResolutionReport {
    pub fn count_with_comment(&self, comment: ResolutionComment) -> usize {
        let comment = comment.to_string();
        self.pairs
            .iter()
            .filter(|p| p.comment.as_deref() == Some(comment.as_str()))
            .count()
    }

    /// `Text, Dimension, Value`: raw value, concept ID, code. Pairs without a usable code or
    /// concept are dropped.
    pub fn code_mapping_df(&self) -> Result<DataFrame> {
        let mut seen = HashSet::new();
        let rows = self
            .pairs
            .iter()
            .filter_map(|p| {
                let code = p.exchange_code.as_deref().filter(|c| *c != NO_MATCH_CODE)?;
                let concept = self.concept_scheme.concept(&p.exchange_dimension)?;
                (!p.value.is_empty()).then_some((p.value.as_str(), concept.id.as_str(), code))
            })
            .filter(|(text, dimension, _)| seen.insert((*dimension, *text)))
            .collect_vec();
        Ok(df!(
            COL::mapping::TEXT => rows.iter().map(|r| r.0).collect_vec(),
            COL::mapping::DIMENSION => rows.iter().map(|r| r.1).collect_vec(),
            COL::mapping::VALUE => rows.iter().map(|r| r.2).collect_vec()
        )?)
    }

    /// `Text, Value`: national dimension name, concept ID. Unmapped dimensions are dropped.
    pub fn column_mapping_df(&self, mapping: &ColumnMapping) -> Result<DataFrame> {
        let rows = mapping
            .iter()
            .filter_map(|m| {
                let concept = self.concept_scheme.concept(&m.exchange_concept)?;
                Some((m.dimension_name.as_str(), concept.id.as_str()))
            })
            .collect_vec();
        Ok(df!(
            COL::mapping::TEXT => rows.iter().map(|r| r.0).collect_vec(),
            COL::mapping::VALUE => rows.iter().map(|r| r.1).collect_vec()
        )?)
    }
}

/// Resolves value pairs against one DSD. Create one per run; its code-list cache lives with it.
pub struct DsdResolver<S: SheetSource> {
    dsd: Dsd<S>,
    cache: CodeIndexCache,
    concept_scheme: Option<ConceptScheme>,
    manual: Option<ManualCodes>,
    candidate_limit: usize,
}

impl<S: SheetSource> DsdResolver<S> {
    pub fn new(dsd: Dsd<S>, candidate_limit: usize) -> Self {
        Self {
            dsd,
            cache: CodeIndexCache::default(),
            concept_scheme: None,
            manual: None,
            candidate_limit,
        }
    }

    /// Applies previously recorded codes before any other resolution step.
    pub fn with_manual_codes(mut self, manual: ManualCodes) -> Self {
        info!("Using {} manually recorded codes", manual.len());
        self.manual = Some(manual);
        self
    }

    pub fn cache(&self) -> &CodeIndexCache {
        &self.cache
    }

    pub fn concept_scheme(&mut self) -> Result<&ConceptScheme> {
        if self.concept_scheme.is_none() {
            self.concept_scheme = Some(self.dsd.concept_scheme()?);
        }
        self.concept_scheme
            .as_ref()
            .ok_or_else(|| SdmxPrepError::source("concept scheme", "not loaded"))
    }

    /// Code-list identifier for an exchange concept name, if the concept scheme has one.
    pub fn lookup_tab(&mut self, exchange_dimension: &str) -> Result<Option<String>> {
        Ok(self
            .concept_scheme()?
            .lookup_tab(exchange_dimension)
            .map(str::to_string))
    }

    pub fn resolve<C: CodeSelector>(
        &mut self,
        pairs: Vec<ValuePair>,
        selector: &mut C,
    ) -> Result<ResolutionReport> {
        let mut pairs = dedupe_value_pairs(pairs);
        let mut skipped = vec![];
        let dimensions = pairs
            .iter()
            .map(|p| p.exchange_dimension.clone())
            .unique()
            .collect_vec();

        for dimension in dimensions {
            let Some(code_list_id) = self.lookup_tab(&dimension)? else {
                let reason = format!("`{dimension}` has no code list in the concept scheme");
                warn!("Skipping dimension: {reason}");
                for pair in pairs.iter_mut().filter(|p| p.exchange_dimension == dimension) {
                    pair.exchange_code = None;
                    pair.comment = Some(ResolutionComment::UnknownDimension.to_string());
                }
                skipped.push(SkippedDimension {
                    dimension_name: dimension,
                    reason,
                });
                continue;
            };
            let code_list = self.cache.get_or_load(&mut self.dsd, &code_list_id)?;
            info!("Resolving `{dimension}` against code list {code_list_id}");

            for pair in pairs.iter_mut().filter(|p| p.exchange_dimension == dimension) {
                let recorded = self.manual.as_ref().and_then(|m| m.get(pair)).cloned();
                if let Some((code, comment)) = recorded {
                    pair.exchange_code = Some(code);
                    pair.comment = Some(
                        comment.unwrap_or_else(|| ResolutionComment::FromManualMapping.to_string()),
                    );
                    continue;
                }
                if resolve_exact(pair, code_list) {
                    continue;
                }
                resolve_fuzzy(pair, code_list, self.candidate_limit, selector)?;
            }
        }

        let concept_scheme = self.concept_scheme()?.clone();
        let report = ResolutionReport {
            pairs,
            skipped,
            concept_scheme,
        };
        info!(
            "Resolved {} value pairs ({} exact, {} chosen, {} without a match)",
            report.pairs.iter().filter(|p| p.is_resolved()).count(),
            report.count_with_comment(ResolutionComment::ExactMatch),
            report.count_with_comment(ResolutionComment::ManuallyChosen),
            report.count_with_comment(ResolutionComment::ManuallyDeclined)
                + report.count_with_comment(ResolutionComment::NoCandidates),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::config::DsdConfig;
    use crate::dsd::tests::{test_sheets, MemorySheets};
    use crate::dsd::Code;
    use crate::vocabulary::DimensionMapping;

    fn resolver() -> DsdResolver<MemorySheets> {
        DsdResolver::new(Dsd::new(test_sheets(), DsdConfig::default()), 8)
    }

    fn sex_codes() -> CodeList {
        CodeList {
            id: "CL_SEX".into(),
            codes: vec![
                Code {
                    code: "F".into(),
                    name: "Female".into(),
                },
                Code {
                    code: "M".into(),
                    name: "Male".into(),
                },
                Code {
                    code: "_T".into(),
                    name: "Total".into(),
                },
            ],
        }
    }

    fn comment(pair: &ValuePair) -> ResolutionComment {
        ResolutionComment::from_str(pair.comment.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn candidates_are_ranked_best_first_and_limited() {
        let candidates = score_candidates("Females", &sex_codes(), 2);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].code, "F");
        assert!(candidates[0].score >= candidates[1].score);
    }

    #[test]
    fn selection_input_is_validated() {
        assert_eq!(parse_selection("1", 8).unwrap(), Selection::Candidate(0));
        assert_eq!(parse_selection(" 8 ", 8).unwrap(), Selection::Candidate(7));
        assert_eq!(parse_selection("9", 8).unwrap(), Selection::NoMatch);
        for bad in ["0", "10", "two", "", "-1", "1.5"] {
            assert!(
                matches!(
                    parse_selection(bad, 8),
                    Err(SdmxPrepError::InputValidation { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn exact_names_resolve_without_selection() {
        let mut pair = ValuePair::new("Sex", "Sex", "Male");
        assert!(resolve_exact(&mut pair, &sex_codes()));
        assert_eq!(pair.exchange_code.as_deref(), Some("M"));
        assert_eq!(comment(&pair), ResolutionComment::ExactMatch);
    }

    #[test]
    fn declining_resolves_to_the_sentinel() -> anyhow::Result<()> {
        let mut pair = ValuePair::new("Sex", "Sex", "Females");
        let mut selector = ScriptedSelector(VecDeque::from([Selection::NoMatch]));
        resolve_fuzzy(&mut pair, &sex_codes(), 8, &mut selector)?;
        assert_eq!(pair.exchange_code.as_deref(), Some(NO_MATCH_CODE));
        assert_eq!(comment(&pair), ResolutionComment::ManuallyDeclined);
        Ok(())
    }

    #[test]
    fn no_candidates_resolves_to_the_sentinel() -> anyhow::Result<()> {
        let mut pair = ValuePair::new("Sex", "Sex", "???");
        resolve_fuzzy(&mut pair, &sex_codes(), 8, &mut DeferSelector)?;
        assert_eq!(pair.exchange_code.as_deref(), Some(NO_MATCH_CODE));
        assert_eq!(comment(&pair), ResolutionComment::NoCandidates);
        Ok(())
    }

    #[test]
    fn unknown_dimension_is_skipped_and_left_out_of_the_mapping() -> anyhow::Result<()> {
        let mut resolver = resolver();
        let pairs = vec![
            ValuePair::new("Sex", "Sex", "Female"),
            ValuePair::new("Income quantile", "Income quantile", "Lowest quintile"),
        ];
        let report = resolver.resolve(pairs, &mut DeferSelector)?;
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].dimension_name, "Income quantile");
        assert_eq!(comment(&report.pairs[1]), ResolutionComment::UnknownDimension);

        let mapping = report.code_mapping_df()?;
        assert_eq!(mapping.height(), 1);
        let texts: Vec<Option<&str>> = mapping
            .column(COL::mapping::TEXT)?
            .str()?
            .into_iter()
            .collect();
        assert_eq!(texts, vec![Some("Female")]);
        let dimensions: Vec<Option<&str>> = mapping
            .column(COL::mapping::DIMENSION)?
            .str()?
            .into_iter()
            .collect();
        assert_eq!(dimensions, vec![Some("SEX")]);
        Ok(())
    }

    #[test]
    fn code_lists_are_read_once_per_run() -> anyhow::Result<()> {
        let mut resolver = resolver();
        let pairs = vec![
            ValuePair::new("Sex", "Sex", "Female"),
            ValuePair::new("Gender", "Sex", "Male"),
            ValuePair::new("Age", "Age", "16 to 24 years old"),
        ];
        resolver.resolve(pairs.clone(), &mut DeferSelector)?;
        resolver.resolve(pairs, &mut DeferSelector)?;
        assert_eq!(resolver.cache().reads(), 2);
        assert_eq!(resolver.dsd.sheets().reads.get("CL_SEX"), Some(&1));
        assert_eq!(resolver.dsd.sheets().reads.get("CONCEPTS"), Some(&1));
        Ok(())
    }

    #[test]
    fn scripted_choices_and_deferral() -> anyhow::Result<()> {
        let mut resolver = resolver();
        let pairs = vec![
            ValuePair::new("Age", "Age", "16 to 24"),
            ValuePair::new("Age", "Age", "65 and over"),
            ValuePair::new("Age", "Age", "25 to 64"),
        ];
        let mut selector =
            ScriptedSelector(VecDeque::from([Selection::Candidate(0), Selection::NoMatch]));
        let report = resolver.resolve(pairs, &mut selector)?;
        assert_eq!(report.pairs[0].exchange_code.as_deref(), Some("Y16T24"));
        assert_eq!(comment(&report.pairs[0]), ResolutionComment::ManuallyChosen);
        assert_eq!(report.pairs[1].exchange_code.as_deref(), Some(NO_MATCH_CODE));
        assert_eq!(report.pairs[2].exchange_code, None);
        assert_eq!(comment(&report.pairs[2]), ResolutionComment::AwaitingChoice);

        // Only the chosen code reaches the mapping table
        assert_eq!(report.code_mapping_df()?.height(), 1);
        Ok(())
    }

    #[test]
    fn manual_codes_replay_earlier_choices() -> anyhow::Result<()> {
        let mut earlier = ValuePair::new("Age", "Age", "16 to 24");
        earlier.exchange_code = Some("Y16T24".into());
        earlier.comment = Some(ResolutionComment::ManuallyChosen.to_string());
        let manual = ManualCodes::from_pairs(&[earlier, ValuePair::new("Age", "Age", "x")]);
        assert_eq!(manual.len(), 1);

        let mut resolver = resolver().with_manual_codes(manual);
        let report = resolver.resolve(
            vec![ValuePair::new("Age", "Age", "16 to 24")],
            &mut ScriptedSelector::default(),
        )?;
        assert_eq!(report.pairs[0].exchange_code.as_deref(), Some("Y16T24"));
        assert_eq!(comment(&report.pairs[0]), ResolutionComment::ManuallyChosen);
        Ok(())
    }

    #[test]
    fn duplicate_pairs_collapse_in_the_mapping() -> anyhow::Result<()> {
        let mut resolver = resolver();
        let pairs = vec![
            ValuePair::new("Sex", "Sex", "Female"),
            ValuePair::new("Gender", "Sex", "Female"),
        ];
        let report = resolver.resolve(pairs, &mut DeferSelector)?;
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.code_mapping_df()?.height(), 1);
        Ok(())
    }

    #[test]
    fn column_mapping_table_drops_unmapped_concepts() -> anyhow::Result<()> {
        let mut resolver = resolver();
        let report = resolver.resolve(vec![], &mut DeferSelector)?;
        let mapping = ColumnMapping(vec![
            DimensionMapping {
                dimension_name: "Sex".into(),
                exchange_concept: "Sex".into(),
            },
            DimensionMapping {
                dimension_name: "Income quantile".into(),
                exchange_concept: "Income".into(),
            },
        ]);
        let df = report.column_mapping_df(&mapping)?;
        assert_eq!(df.get_column_names(), vec!["Text", "Value"]);
        let values: Vec<Option<&str>> = df.column(COL::mapping::VALUE)?.str()?.into_iter().collect();
        assert_eq!(values, vec![Some("SEX")]);
        Ok(())
    }
}

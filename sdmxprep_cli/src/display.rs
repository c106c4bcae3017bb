use comfy_table::{presets::NOTHING, *};

use sdmxprep::resolver::{Candidate, ResolutionComment, ResolutionReport};
use sdmxprep::vocabulary::{SkippedDimension, ValuePair};
use sdmxprep::ClassificationSummary;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

fn counts_table(rows: &[(&str, usize)]) -> Table {
    let mut table = new_table();
    for (label, count) in rows {
        table.add_row(vec![bold(label), Cell::new(count)]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}

pub fn display_summary(summary: &ClassificationSummary) {
    let table = counts_table(&[
        ("Indicators", summary.indicators),
        ("Proxy indicators", summary.proxies),
        ("Only UK data", summary.only_uk),
        ("Geographically disaggregated", summary.geo_disaggregated),
        ("Included for mapping", summary.included),
        ("Data quality warnings", summary.warnings),
    ]);
    println!("\n{}", table);
}

pub fn display_skipped(skipped: &[SkippedDimension]) {
    if skipped.is_empty() {
        return;
    }
    let mut table = new_table();
    table.set_header(vec![bold("Skipped dimension"), bold("Reason")]);
    for dimension in skipped {
        table.add_row(vec![dimension.dimension_name.as_str(), dimension.reason.as_str()]);
    }
    println!("\n{}", table);
}

pub fn display_resolution(report: &ResolutionReport) {
    let table = counts_table(&[
        ("Value pairs", report.pairs.len()),
        (
            "Exact matches",
            report.count_with_comment(ResolutionComment::ExactMatch),
        ),
        (
            "Manually chosen",
            report.count_with_comment(ResolutionComment::ManuallyChosen),
        ),
        (
            "Manually declined",
            report.count_with_comment(ResolutionComment::ManuallyDeclined),
        ),
        (
            "No candidates found",
            report.count_with_comment(ResolutionComment::NoCandidates),
        ),
        (
            "Awaiting manual choice",
            report.count_with_comment(ResolutionComment::AwaitingChoice),
        ),
    ]);
    println!("\n{}", table);
    display_skipped(&report.skipped);
}

/// Numbered candidate menu; the final entry is "no match".
pub fn candidates_table(pair: &ValuePair, candidates: &[Candidate]) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        bold("#"),
        bold("Code"),
        bold(&format!("Name (for `{}`)", pair.value)),
        bold("Score"),
    ]);
    for (idx, candidate) in candidates.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&candidate.code),
            Cell::new(&candidate.name),
            Cell::new(format!("{:.0}", candidate.score)),
        ]);
    }
    table.add_row(vec![
        Cell::new(candidates.len() + 1),
        Cell::new(""),
        Cell::new("No match"),
        Cell::new(""),
    ]);
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_menu_ends_with_no_match() {
        let pair = ValuePair::new("Sex", "Sex", "Females");
        let candidates = vec![Candidate {
            code: "F".into(),
            name: "Female".into(),
            score: 100.0,
        }];
        let rendered = candidates_table(&pair, &candidates).to_string();
        assert!(rendered.contains("Female"));
        assert!(rendered.contains("No match"));
        assert!(rendered.contains("Females"));
    }
}

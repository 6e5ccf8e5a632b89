use super::{AbstractsReport, AskReport, TranslateReport};
use crate::translate::UnitOutcome;

fn cache_note(cached: bool) -> &'static str {
    if cached { " (from cache)" } else { "" }
}

fn push_abstracts(out: &mut String, report: &AbstractsReport) {
    out.push_str(&format!(
        "## Abstracts{}\n\n",
        cache_note(report.abstracts_cached)
    ));
    if report.abstracts.is_empty() {
        out.push_str("(no abstracts found)\n");
    } else {
        out.push_str(&report.abstracts);
        out.push('\n');
    }
    if !report.missing.is_empty() {
        out.push_str(&format!(
            "\n> No abstract found for PMID {}\n",
            report.missing.join(", ")
        ));
    }
}

pub fn format_abstracts(report: &AbstractsReport) -> String {
    let mut out = String::new();
    push_abstracts(&mut out, report);
    out
}

pub fn format_answer(report: &AskReport) -> String {
    let mut out = String::new();
    push_abstracts(&mut out, &report.abstracts);
    out.push_str(&format!(
        "\n## Question\n\n{}\n\n## Answer{}\n\n{}\n",
        report.question,
        cache_note(report.cached),
        report.answer
    ));
    out
}

pub fn format_translation(report: &TranslateReport) -> String {
    let mut out = String::new();
    push_abstracts(&mut out, &report.abstracts);
    out.push_str(&format!(
        "\n## Translation{}\n\n{}\n",
        cache_note(report.translation.cached),
        report.translation.text
    ));

    let failed: Vec<usize> = report
        .translation
        .units
        .iter()
        .enumerate()
        .filter(|(_, u)| matches!(u, UnitOutcome::Failed { .. }))
        .map(|(i, _)| i + 1)
        .collect();
    if !failed.is_empty() {
        let list: Vec<String> = failed.iter().map(ToString::to_string).collect();
        out.push_str(&format!(
            "\n> Translation failed for abstract {}\n",
            list.join(", ")
        ));
    }
    out
}

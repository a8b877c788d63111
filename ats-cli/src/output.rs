use std::fmt::Write;

use ats_rag::MatchReport;

/// Human-readable report: score, summary, then one block per requirement.
pub fn render_text(report: &MatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Score: {}/100", report.overall_score());
    let _ = writeln!(out, "{}", report.summary().text);

    for verdict in report.verdicts() {
        let text = report
            .requirement_text(&verdict.requirement_id)
            .unwrap_or(verdict.requirement_id.as_str());
        let _ = writeln!(out, "\n[{}] {}", verdict.match_level, text);
        if !verdict.rationale.is_empty() {
            let _ = writeln!(out, "    {}", verdict.rationale);
        }
        if !verdict.cited_chunk_ids.is_empty() {
            let _ = writeln!(out, "    evidence: {}", verdict.cited_chunk_ids.join(", "));
        }
    }
    out.trim_end().to_string()
}

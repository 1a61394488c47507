//! Markdown report for a single decision.

use reconcile_core::data::ProviderPayload;
use reconcile_core::domain::{Decision, ProviderId};

/// Render `decision` as a Markdown document.
pub fn render_markdown(decision: &Decision) -> String {
    let request = &decision.request;
    let window = request
        .window
        .map(|w| format!("{} .. {}", w.start, w.end))
        .unwrap_or_else(|| "latest".to_string());

    let mut report = format!(
        "# Reconciliation Report\n\n\
Request: `{}` ({})\n\n\
- Window: {}\n\
- Fingerprint: `{}`\n\
- Decided at: {}\n\
- Chosen source: **{}**\n",
        request.symbol,
        request.kind,
        window,
        decision.fingerprint,
        decision.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        decision.chosen_source,
    );
    if let Some(s) = decision.chosen_score() {
        report.push_str(&format!(
            "- Score: {:.3} ({}/{} agreeing samples), completeness {:.1}%\n",
            s.score,
            s.hits,
            s.comparable,
            s.completeness * 100.0
        ));
    }

    // Ranking
    report.push_str("\n## Ranking\n\n");
    report.push_str("| # | Provider | Score | Hits | Comparable | Completeness | Priority |\n");
    report.push_str("|---|----------|-------|------|------------|--------------|----------|\n");
    for (i, provider) in decision.ranking.iter().enumerate() {
        if let Some(s) = decision.scores.get(provider) {
            report.push_str(&format!(
                "| {} | {} | {:.3} | {} | {} | {:.1}% | {} |\n",
                i + 1,
                provider,
                s.score,
                s.hits,
                s.comparable,
                s.completeness * 100.0,
                s.priority_rank
            ));
        }
    }
    if !decision.excluded.is_empty() {
        report.push_str("\nExcluded (no usable data):\n");
        for provider in &decision.excluded {
            let reason = decision
                .raw_snapshot
                .get(provider)
                .and_then(|p| match p {
                    ProviderPayload::Empty { reason } => reason.clone(),
                    _ => None,
                })
                .unwrap_or_else(|| "empty after normalization".to_string());
            report.push_str(&format!("- {provider}: {reason}\n"));
        }
    }

    // Record counts
    let counts: Vec<(&ProviderId, usize)> = decision
        .raw_snapshot
        .keys()
        .map(|p| (p, decision.scores.get(p).map_or(0, |s| s.observations)))
        .collect();
    let scored: Vec<usize> = counts
        .iter()
        .filter(|(p, _)| decision.scores.contains_key(*p))
        .map(|(_, n)| *n)
        .collect();
    let consistent = scored.windows(2).all(|w| w[0] == w[1]);
    report.push_str("\n## Record Count Check\n\n");
    report.push_str("| Provider | Records |\n");
    report.push_str("|----------|---------|\n");
    for (provider, n) in &counts {
        report.push_str(&format!("| {provider} | {n} |\n"));
    }
    report.push_str(&format!(
        "\nStatus: {}\n",
        if consistent {
            "consistent"
        } else {
            "MISMATCH across scored providers"
        }
    ));

    // Pairwise agreement
    if !decision.pairs.is_empty() {
        report.push_str("\n## Pairwise Agreement\n\n");
        report.push_str("| Pair | Hits | Comparable | Ratio | Weakest key |\n");
        report.push_str("|------|------|------------|-------|-------------|\n");
        for pair in &decision.pairs {
            let weakest = pair
                .per_key
                .iter()
                .filter(|(_, t)| t.comparable > 0)
                .min_by(|a, b| a.1.ratio().total_cmp(&b.1.ratio()))
                .map(|(k, t)| format!("{k} ({:.0}%)", t.ratio() * 100.0))
                .unwrap_or_else(|| "-".to_string());
            let ratio = if pair.is_degenerate() {
                "n/a".to_string()
            } else {
                format!("{:.3}", pair.ratio())
            };
            report.push_str(&format!(
                "| {} / {} | {} | {} | {} | {} |\n",
                pair.left, pair.right, pair.hits, pair.comparable, ratio, weakest
            ));
        }
    }

    // Chosen data
    if let Some((date, obs)) = decision.final_payload.latest() {
        report.push_str(&format!("\n## Chosen Data ({date})\n\n"));
        report.push_str("| Key | Value |\n");
        report.push_str("|-----|-------|\n");
        for key in &request.keys {
            let value = obs
                .get(key)
                .copied()
                .flatten()
                .map(|v| format!("{v:.4}"))
                .unwrap_or_else(|| "-".to_string());
            report.push_str(&format!("| {key} | {value} |\n"));
        }
    }

    report
}

//! Markdown renderer for results documents.
//!
//! Rendering is pure and deterministic: the same document always yields the
//! same text. Filtering already happened on export, so only what the
//! document carries is shown.

use ovaleval_types::{DefinitionDoc, ResultsDocument, Verdict};

const MAX_LISTED: usize = 10;

pub fn render_markdown(doc: &ResultsDocument) -> String {
    let mut out = String::new();
    let status = overall(doc);
    out.push_str(&format!("## ovaleval: {}\n\n", status));
    out.push_str(&format!("- Systems: {}\n", doc.systems.len()));
    out.push_str(&format!(
        "- Generator: `{} {}`\n",
        doc.generator.name, doc.generator.version
    ));
    if let Some(host) = &doc.generator.host {
        let name = host.hostname.as_deref().unwrap_or("unknown host");
        out.push_str(&format!("- Host: {} ({}/{})\n", name, host.os, host.arch));
    }

    for sys in &doc.systems {
        out.push_str(&format!("\n### System `{}`\n\n", sys.snapshot_id));
        let counts: Vec<String> = Verdict::ALL
            .into_iter()
            .filter_map(|v| {
                let n = sys.definitions.iter().filter(|d| d.result == v).count();
                (n > 0).then(|| format!("{} {}", n, v))
            })
            .collect();
        if counts.is_empty() {
            out.push_str("_No definitions reported._\n");
            continue;
        }
        out.push_str(&format!("- Definitions: {}\n", counts.join(", ")));

        let mut flagged: Vec<&DefinitionDoc> = sys
            .definitions
            .iter()
            .filter(|d| d.result != Verdict::True)
            .collect();
        flagged.sort_by(|a, b| {
            severity(a.result)
                .cmp(&severity(b.result))
                .reverse()
                .then(a.id.cmp(&b.id))
        });
        if flagged.is_empty() {
            continue;
        }
        out.push('\n');
        for d in flagged.iter().take(MAX_LISTED) {
            out.push_str(&format!("- **{}** `{}`", d.result, d.id));
            if let Some(m) = d.messages.first() {
                out.push_str(&format!(": {}", m.text));
            }
            out.push('\n');
        }
        if flagged.len() > MAX_LISTED {
            out.push_str(&format!("- ... and {} more\n", flagged.len() - MAX_LISTED));
        }
    }

    out
}

// Higher is more urgent.
fn severity(v: Verdict) -> u8 {
    match v {
        Verdict::Error => 5,
        Verdict::False => 4,
        Verdict::Unknown => 3,
        Verdict::NotEvaluated => 2,
        Verdict::NotApplicable => 1,
        Verdict::Invalid | Verdict::True => 0,
    }
}

fn overall(doc: &ResultsDocument) -> &'static str {
    let all = doc.systems.iter().flat_map(|s| s.definitions.iter());
    match all.map(|d| severity(d.result)).max() {
        None => "EMPTY",
        Some(5) => "ERROR",
        Some(4) => "FAIL",
        Some(3) => "UNKNOWN",
        _ => "PASS",
    }
}

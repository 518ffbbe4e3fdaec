use onionctl_core::orchestrator::StepRecord;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn pad_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:w$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Widths count characters, not bytes.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut lines = vec![pad_row(headers.iter().copied(), &widths)];
    lines.push(
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    lines.extend(rows.iter().map(|row| pad_row(row.iter().map(String::as_str), &widths)));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn step_rows(steps: &[StepRecord]) -> Vec<Vec<String>> {
    steps
        .iter()
        .map(|s| {
            let notes: Vec<String> = s
                .unmet
                .iter()
                .map(|dep| format!("'{dep}' was skipped"))
                .chain(s.warnings.iter().cloned())
                .collect();
            vec![s.id.clone(), s.state.to_string(), notes.join("; ")]
        })
        .collect()
}

/// One row per step: id, final state and what went wrong, if anything.
pub fn print_steps(steps: &[StepRecord]) {
    print!("{}", render_table(&["STEP", "STATE", "NOTES"], &step_rows(steps)));
}

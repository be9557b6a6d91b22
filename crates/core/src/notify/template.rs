use super::ChangeAlert;
use std::fmt::Write;

/// Plain-text email body, one line per changed ticker.
pub fn render_text(alert: &ChangeAlert) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Analyst recommendation counts changed since the last run ({}):",
        alert.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    out.push('\n');

    for c in &alert.changes {
        let _ = writeln!(
            out,
            "{:<8} buy {} -> {}, hold {} -> {}, sell {} -> {}",
            c.ticker.as_str(),
            c.previous.buy,
            c.current.buy,
            c.previous.hold,
            c.current.hold,
            c.previous.sell,
            c.current.sell,
        );
    }
    out
}

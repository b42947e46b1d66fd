//! Terminal display for one-shot lookups.
//!
//! Colored verdict lines, extracted fields and a spinner while the WHOIS
//! command runs. Uses only the `console` crate.

use console::{pad_str, style, Alignment, Term};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use whois_bot_lib::Verdict;

use crate::LookupReport;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner if stderr is a terminal.
    pub fn start_if_tty(message: String) -> Option<Self> {
        if Term::stderr().is_term() {
            Some(Self::start(message))
        } else {
            None
        }
    }

    /// Start a new spinner with the given message (e.g. "Looking up example.com...").
    pub fn start(message: String) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

fn verdict_label(verdict: Verdict) -> String {
    match verdict {
        Verdict::Available => style("AVAILABLE").green().bold().to_string(),
        Verdict::Registered => style("REGISTERED").red().bold().to_string(),
        Verdict::Unknown => style("UNKNOWN").yellow().to_string(),
    }
}

/// Print a lookup report: verdict line, deciding rule, then extracted fields.
pub fn print_report(report: &LookupReport) {
    let padded_domain = pad_str(&report.domain, 30, Alignment::Left, Some(".."));
    println!(
        "  {}  {}",
        style(&padded_domain).white(),
        verdict_label(report.verdict)
    );
    println!("  {} {}", style("└─").dim(), style(&report.rule).dim());

    if report.lookup_failed {
        println!();
        println!(
            "  {} {}",
            style("⚠").yellow(),
            style("The WHOIS command did not succeed; the verdict is based on its error text.")
                .yellow()
        );
    }

    print_section("Expiry", &report.expiry);
    print_section("Name servers", &report.name_servers);
}

fn print_section(title: &str, lines: &[String]) {
    println!();
    println!("{}", style(format!("── {} ", title)).bold());
    if lines.is_empty() {
        println!("    {}", style("(none found)").dim());
    }
    for line in lines {
        println!("    {}", line);
    }
}

/// Print the raw WHOIS text below the report.
pub fn print_raw(text: &str) {
    println!();
    println!("{}", style("── Raw WHOIS ").bold());
    for line in text.lines() {
        println!("    {}", style(line).dim());
    }
}

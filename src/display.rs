use crate::enrichment::EnrichmentSummary;
use crate::mapper::RuleTable;
use crate::types::{Confidence, NormalizedDocument};
use colored::*;

/// Single-line, optionally colored terminal output for the CLI.
pub struct DisplayManager {
    use_colors: bool,
    quiet_mode: bool,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::with_quiet(false)
    }

    pub fn with_quiet(quiet: bool) -> Self {
        let use_colors = std::env::var("NO_COLOR").is_err()
            && std::env::var("TERM").map_or(true, |term| term != "dumb");

        Self {
            use_colors,
            quiet_mode: quiet,
        }
    }

    pub fn print_section_header(&self, title: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("{}", title.bright_cyan().bold());
            println!("{}", "─".repeat(title.chars().count()).bright_cyan());
        } else {
            println!("{}", title);
            println!("{}", "=".repeat(title.chars().count()));
        }
    }

    pub fn print_info(&self, message: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("{} {}", "[info]".bright_blue().bold(), message);
        } else {
            println!("[info] {}", message);
        }
    }

    pub fn print_success(&self, message: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("{} {}", "[info]".bright_green().bold(), message.green());
        } else {
            println!("[info] {}", message);
        }
    }

    /// Warnings go to stderr so they never mix with piped output.
    pub fn print_warning(&self, message: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            eprintln!("{} {}", "[warn]".bright_yellow().bold(), message.yellow());
        } else {
            eprintln!("[warn] {}", message);
        }
    }

    /// Errors are printed even in quiet mode.
    pub fn print_error(&self, message: &str) {
        if self.use_colors {
            eprintln!("{} {}", "[error]".bright_red().bold(), message.red());
        } else {
            eprintln!("[error] {}", message);
        }
    }

    pub fn print_banner(&self, title: &str, subtitle: Option<&str>) {
        if self.quiet_mode { return; }

        let width = title.chars().count();
        if self.use_colors {
            println!("{}", format!("┌─{}─┐", "─".repeat(width)).bright_cyan());
            println!("{} {} {}", "│".bright_cyan(), title.bright_white().bold(), "│".bright_cyan());
            if let Some(sub) = subtitle {
                println!(
                    "{} {} {}",
                    "│".bright_cyan(),
                    format!("{:^width$}", sub, width = width).bright_black(),
                    "│".bright_cyan()
                );
            }
            println!("{}", format!("└─{}─┘", "─".repeat(width)).bright_cyan());
        } else {
            let border = "=".repeat(width + 4);
            println!("{}", border);
            println!("  {}", title);
            if let Some(sub) = subtitle {
                println!("  {}", sub);
            }
            println!("{}", border);
        }
    }

    /// One line per discovery with its candidates, highest confidence colored.
    pub fn print_candidates(&self, doc: &NormalizedDocument) {
        if self.quiet_mode { return; }

        for discovery in &doc.discoveries {
            let service = discovery.service.as_deref().unwrap_or("unknown");
            if discovery.vuln_candidates.is_empty() {
                let line = format!("  {}/{} {} - no candidates", discovery.port, discovery.proto, service);
                if self.use_colors {
                    println!("{}", line.bright_black());
                } else {
                    println!("{}", line);
                }
                continue;
            }

            println!("  {}/{} {}", discovery.port, discovery.proto, service);
            for candidate in &discovery.vuln_candidates {
                let cve = if candidate.cve.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", candidate.cve.join(", "))
                };
                if self.use_colors {
                    println!(
                        "    {} {}{}",
                        format!("{:<6}", candidate.confidence.as_str()).color(confidence_color(candidate.confidence)),
                        candidate.pattern.bright_white(),
                        cve.cyan()
                    );
                } else {
                    println!("    {:<6} {}{}", candidate.confidence.as_str(), candidate.pattern, cve);
                }
            }
        }
    }

    pub fn print_enrichment_summary(&self, summary: &EnrichmentSummary) {
        self.print_info(&format!(
            "enriched {}/{} discoveries ({})",
            summary.updated,
            summary.records,
            summary.describe()
        ));
    }

    pub fn print_rule_table(&self, rules: &RuleTable) {
        if self.quiet_mode { return; }

        for (i, rule) in rules.rules.iter().enumerate() {
            let cve = if rule.cve.is_empty() { "-".to_string() } else { rule.cve.join(", ") };
            if self.use_colors {
                println!(
                    "{:>3}. {} {} {}",
                    i + 1,
                    format!("{:<24}", rule.pattern).bright_white().bold(),
                    format!("{:<6}", rule.confidence.as_str()).color(confidence_color(rule.confidence)),
                    cve.cyan()
                );
            } else {
                println!("{:>3}. {:<24} {:<6} {}", i + 1, rule.pattern, rule.confidence.as_str(), cve);
            }
        }
    }
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

fn confidence_color(confidence: Confidence) -> Color {
    match confidence {
        Confidence::High => Color::Red,
        Confidence::Medium => Color::Yellow,
        Confidence::Low => Color::Green,
    }
}

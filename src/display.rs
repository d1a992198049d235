//! Output Formatting
//!
//! Renders run results either as colored terminal text or as JSON.
//!
//! ### JSON Output
//! ```json
//! {
//!   "targetAppId": 374,
//!   "totalLicenses": 3,
//!   "users": 2,
//!   "records": 5,
//!   "linesScanned": 6,
//!   "rowsSkipped": 0,
//!   "duplicates": 0,
//!   "appIdColumn": 4,
//!   "headerFallback": false,
//!   "elapsedMs": 12
//! }
//! ```

use crate::models::LicenseReport;
use crate::progress::{format_elapsed, ProgressSnapshot};
use colored::Colorize;

pub struct DisplayManager {
    json_output: bool,
    json_pretty: bool,
}

impl DisplayManager {
    pub fn new(json_output: bool, json_pretty: bool) -> Self {
        Self {
            json_output,
            json_pretty,
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_output
    }

    /// Status line shown while a run is busy.
    pub fn progress_line(snapshot: &ProgressSnapshot) -> String {
        format!("Busy Processing: {}", snapshot.elapsed_hms())
    }

    pub fn result_line(report: &LicenseReport) -> String {
        format!("Total license needed: {}", report.total_licenses)
    }

    pub fn render_report(&self, report: &LicenseReport) -> String {
        if self.json_output {
            return self.render_json(report);
        }

        let mut out = String::new();
        out.push_str(&format!(
            "{}\n",
            Self::result_line(report).bold().green()
        ));
        out.push_str(&format!(
            "{} {} users, {} installs of application {}\n",
            "📊".dimmed(),
            report.users,
            report.records,
            report.target_app_id
        ));
        out.push_str(&format!(
            "   {} lines scanned, {} malformed rows skipped, {} duplicates ignored in {}\n",
            report.lines_scanned,
            report.rows_skipped,
            report.duplicates,
            format_elapsed(report.elapsed)
        ));

        if report.header_fallback {
            out.push_str(&format!(
                "{}\n",
                format!(
                    "⚠️  No application id column in header, used column {}",
                    report.app_id_column
                )
                .yellow()
            ));
        }

        if let Some(users) = &report.per_user {
            out.push('\n');
            out.push_str(&format!(
                "{}\n",
                format!(
                    "{:>10} {:>10} {:>10} {:>10}",
                    "User", "Computers", "Laptops", "Licenses"
                )
                .bold()
            ));
            for user in users {
                out.push_str(&format!(
                    "{:>10} {:>10} {:>10} {:>10}\n",
                    user.user_id,
                    user.computers,
                    user.laptops,
                    user.licenses.to_string().cyan()
                ));
            }
        }

        out
    }

    pub fn render_error(&self, message: &str) -> String {
        if self.json_output {
            serde_json::json!({ "error": message }).to_string()
        } else {
            format!("{} {}", "Error:".red().bold(), message)
        }
    }

    fn render_json(&self, report: &LicenseReport) -> String {
        let rendered = if self.json_pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        };
        rendered.unwrap_or_else(|e| self.render_error(&e.to_string()))
    }
}

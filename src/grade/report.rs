#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::{self, Display};

use itertools::Itertools;

use super::results::GradingResult;

/// Width of the report's rule lines.
const RULE_WIDTH: usize = 60;

/// Renders a plain-text report.
///
/// Sections always appear in this order: header, student, score, rubric
/// breakdown, strengths, improvements, overall feedback, footer.
pub fn render_text_report(result: &GradingResult) -> String {
    result.to_string()
}

impl Display for GradingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);

        writeln!(f, "{heavy}\nGRADING REPORT\n{heavy}")?;
        writeln!(f, "Student: {}", self.student_name)?;
        writeln!(
            f,
            "Score: {}/{} ({}%)\n",
            self.total_score, self.max_score, self.percentage
        )?;

        writeln!(f, "RUBRIC BREAKDOWN\n{light}")?;
        if self.rubric_breakdown.is_empty() {
            writeln!(f, "(no rubric breakdown provided)")?;
        }
        for (name, criterion) in &self.rubric_breakdown {
            writeln!(f, "{name}: {}/{}", criterion.score, criterion.max_points)?;
            if !criterion.feedback.trim().is_empty() {
                writeln!(f, "  {}", criterion.feedback.trim())?;
            }
        }

        writeln!(f, "\nSTRENGTHS\n{light}\n{}", bullets(&self.strengths))?;
        writeln!(f, "\nAREAS FOR IMPROVEMENT\n{light}\n{}", bullets(&self.improvements))?;
        writeln!(f, "\nOVERALL FEEDBACK\n{light}\n{}", self.overall_feedback.trim())?;
        write!(f, "\n{heavy}\nEND OF REPORT\n{heavy}\n")
    }
}

/// Formats a list as `- item` lines, or `(none)` when empty.
fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items.iter().map(|item| format!("- {}", item.trim())).join("\n")
}

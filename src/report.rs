use std::fmt::Write;

use crate::attendance;
use crate::grade;
use crate::leaderboard::{self, PlatformFilter};
use crate::models::{DashboardStats, PLATFORMS};
use crate::store::Snapshot;

pub const RECENT_STUDENTS: usize = 3;
const RECENT_ATTENDANCE: usize = 10;

pub fn dashboard(snapshot: &Snapshot) -> DashboardStats {
    DashboardStats {
        students: snapshot.students.len(),
        courses: snapshot.courses.len(),
        attendance: snapshot.attendance.len(),
        exams: snapshot.exams.len(),
        results: snapshot.results.len(),
        recent_students: snapshot
            .students
            .iter()
            .rev()
            .take(RECENT_STUDENTS)
            .cloned()
            .collect(),
    }
}

fn date_label(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "undated".to_string())
}

pub fn build_report(snapshot: &Snapshot, filter: &PlatformFilter) -> String {
    let stats = dashboard(snapshot);
    let summaries = attendance::summarize_attendance(&snapshot.attendance, &snapshot.students);
    let log = attendance::attendance_log(&snapshot.attendance, &snapshot.students, &snapshot.courses);
    let results = grade::result_rows(&snapshot.results, &snapshot.students, &snapshot.exams);
    let board = leaderboard::rank_students(&snapshot.students, &snapshot.achievements, filter);
    let recent = leaderboard::recent_achievements(
        &snapshot.achievements,
        &snapshot.students,
        leaderboard::RECENT_ACHIEVEMENTS,
    );

    let mut output = String::new();

    let _ = writeln!(output, "# Student Records Report");
    let _ = writeln!(
        output,
        "{} students, {} courses, {} attendance records, {} exams, {} results",
        stats.students, stats.courses, stats.attendance, stats.exams, stats.results
    );
    if !stats.recent_students.is_empty() {
        let names: Vec<String> = stats.recent_students.iter().map(|s| s.full_name()).collect();
        let _ = writeln!(output, "Recently added: {}", names.join(", "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students enrolled.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {} ({}): {}% ({}/{} present, {})",
                summary.student_name,
                summary.student_id,
                summary.percentage,
                summary.present,
                summary.total,
                summary.band
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Attendance");

    if log.is_empty() {
        let _ = writeln!(output, "No attendance recorded yet.");
    } else {
        for row in log.iter().take(RECENT_ATTENDANCE) {
            let _ = writeln!(
                output,
                "- {} {} in {} on {}",
                row.student_name,
                row.status,
                row.course_name,
                date_label(row.date)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Exam Results");

    if results.is_empty() {
        let _ = writeln!(output, "No results recorded yet.");
    } else {
        let _ = writeln!(output, "| Result | Student | Exam | Marks | Total | % | Grade |");
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for row in &results {
            let total = row
                .total_marks
                .map(|t| t.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {:.2}% | {} |",
                row.result_id,
                row.student_name,
                row.exam_name,
                row.marks_obtained,
                total,
                row.percentage,
                row.grade
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboard ({filter})");

    if board.iter().all(|entry| entry.achievement_count == 0) {
        let _ = writeln!(output, "No achievements recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "| Rank | Student | Total | Solved | Avg | {} |",
            PLATFORMS.join(" | ")
        );
        let _ = writeln!(output, "|---|---|---|---|---|{}", "---|".repeat(PLATFORMS.len()));
        for entry in &board {
            let columns: Vec<String> = PLATFORMS
                .iter()
                .map(|p| entry.platform_scores.get(*p).copied().unwrap_or(0).to_string())
                .collect();
            let _ = writeln!(
                output,
                "| {} | {} ({}) | {} | {} | {} | {} |",
                leaderboard::rank_label(entry.rank),
                entry.student_name,
                entry.student_id,
                entry.total_score,
                entry.problems_solved,
                entry.average_score,
                columns.join(" | ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Achievements");

    if recent.is_empty() {
        let _ = writeln!(output, "No achievements recorded yet.");
    } else {
        for card in &recent {
            let _ = writeln!(
                output,
                "- {} on {}: {} ({}, {} pts) {}",
                card.student_name,
                card.platform_name,
                card.problem_name,
                card.achievement_type,
                card.score,
                date_label(card.date_achieved)
            );
        }
    }

    output
}

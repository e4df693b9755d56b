use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PLATFORMS: [&str; 4] = ["LeetCode", "HackerRank", "CodeChef", "Codeforces"];

pub const ACHIEVEMENT_TYPES: [&str; 4] =
    ["Problem Solved", "Contest Win", "Milestone", "Badge Earned"];

pub const PROBLEM_SOLVED: &str = "Problem Solved";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_section: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => f.write_str("Present"),
            AttendanceStatus::Absent => f.write_str("Absent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub attendance_id: String,
    pub student_id: String,
    pub course_id: String,
    pub date: Option<NaiveDate>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub exam_id: String,
    pub exam_name: String,
    pub exam_date: Option<NaiveDate>,
    pub exam_type: String,
    pub total_marks: f64,
    pub course_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub result_id: String,
    pub student_id: String,
    pub exam_id: String,
    pub marks_obtained: f64,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub achievement_id: String,
    pub student_id: String,
    pub problem_name: Option<String>,
    pub platform_name: Option<String>,
    pub date_achieved: Option<NaiveDate>,
    pub score: i64,
    pub achievement_type: Option<String>,
    /// Solved-problem counters reported per platform, keyed by platform name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub solved_counts: BTreeMap<String, i64>,
}

impl Achievement {
    pub fn is_on(&self, platform: &str) -> bool {
        self.platform_name.as_deref() == Some(platform)
    }

    pub fn is_problem_solved(&self) -> bool {
        self.achievement_type.as_deref() == Some(PROBLEM_SOLVED)
    }
}

/// Letter grade bands, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "A+" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            other => anyhow::bail!("unknown grade {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GradeResult {
    pub grade: Grade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceBand {
    Good,
    Average,
    Poor,
}

impl fmt::Display for AttendanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceBand::Good => f.write_str("good"),
            AttendanceBand::Average => f.write_str("average"),
            AttendanceBand::Poor => f.write_str("poor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AttendanceCount {
    pub present: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub student_id: String,
    pub student_name: String,
    pub percentage: u32,
    pub present: usize,
    pub total: usize,
    pub band: AttendanceBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub attendance_id: String,
    pub student_name: String,
    pub course_name: String,
    pub date: Option<NaiveDate>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub result_id: String,
    pub student_name: String,
    pub exam_name: String,
    pub marks_obtained: f64,
    pub total_marks: Option<f64>,
    pub percentage: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRow {
    pub exam_id: String,
    pub exam_name: String,
    pub exam_date: Option<NaiveDate>,
    pub exam_type: String,
    pub total_marks: f64,
    pub course_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub student_id: String,
    pub student_name: String,
    pub total_score: i64,
    pub problems_solved: usize,
    pub achievement_count: usize,
    pub average_score: i64,
    pub platform_scores: BTreeMap<String, i64>,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleEntry {
    pub student_id: String,
    pub student_name: String,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementCard {
    pub student_name: String,
    pub platform_name: String,
    pub problem_name: String,
    pub achievement_type: String,
    pub score: i64,
    pub date_achieved: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DashboardStats {
    pub students: usize,
    pub courses: usize,
    pub attendance: usize,
    pub exams: usize,
    pub results: usize,
    pub recent_students: Vec<Student>,
}

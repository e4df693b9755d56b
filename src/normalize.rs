//! Adapter between loosely-shaped store records and the canonical entity types.
//!
//! Upstream records drift in naming (`studentId` vs `student_id`) and in value
//! types (numbers sent as strings, timestamps where dates are expected). All of
//! that is absorbed here so the aggregation modules only see canonical structs.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{
    Achievement, AttendanceRecord, AttendanceStatus, Course, Exam, ExamResult, Grade, Student,
    PLATFORMS,
};

pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    Camel,
    Snake,
}

fn fold(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn lookup<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a Value> {
    if let Some(value) = raw.get(field) {
        return Some(value);
    }
    let wanted = fold(field);
    raw.iter()
        .find(|(key, _)| fold(key) == wanted)
        .map(|(_, value)| value)
}

pub fn text(raw: &RawRecord, field: &str) -> Option<String> {
    match lookup(raw, field)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Missing or non-numeric values coerce to 0.
pub fn number(raw: &RawRecord, field: &str) -> f64 {
    lookup(raw, field).map(coerce).unwrap_or(0.0)
}

pub fn integer(raw: &RawRecord, field: &str) -> i64 {
    crate::grade::round_half_up(number(raw, field))
}

pub fn date(raw: &RawRecord, field: &str) -> Option<NaiveDate> {
    let value = text(raw, field)?;
    let prefix = value.get(..10).unwrap_or(&value);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn required_key(raw: &RawRecord, field: &str, kind: &str) -> Option<String> {
    let key = text(raw, field);
    if key.is_none() {
        warn!(kind, field, "dropping record without primary key");
    }
    key
}

pub fn student(raw: &RawRecord) -> Option<Student> {
    Some(Student {
        student_id: required_key(raw, "studentId", "student")?,
        first_name: text(raw, "firstName").unwrap_or_default(),
        last_name: text(raw, "lastName").unwrap_or_default(),
        email: text(raw, "email"),
        phone_number: text(raw, "phoneNumber"),
        department: text(raw, "department"),
        class_section: text(raw, "classSection"),
    })
}

pub fn course(raw: &RawRecord) -> Option<Course> {
    Some(Course {
        course_id: required_key(raw, "courseId", "course")?,
        course_code: text(raw, "courseCode").unwrap_or_default(),
        course_name: text(raw, "courseName").unwrap_or_default(),
    })
}

pub fn status(value: Option<&str>) -> AttendanceStatus {
    match value {
        Some(s) if s.trim().eq_ignore_ascii_case("present") => AttendanceStatus::Present,
        _ => AttendanceStatus::Absent,
    }
}

pub fn attendance(raw: &RawRecord) -> Option<AttendanceRecord> {
    Some(AttendanceRecord {
        attendance_id: required_key(raw, "attendanceId", "attendance")?,
        student_id: text(raw, "studentId").unwrap_or_default(),
        course_id: text(raw, "courseId").unwrap_or_default(),
        date: date(raw, "date"),
        status: status(text(raw, "status").as_deref()),
    })
}

pub fn exam(raw: &RawRecord) -> Option<Exam> {
    Some(Exam {
        exam_id: required_key(raw, "examId", "exam")?,
        exam_name: text(raw, "examName").unwrap_or_default(),
        exam_date: date(raw, "examDate"),
        exam_type: text(raw, "examType").unwrap_or_else(|| "Written".to_string()),
        total_marks: number(raw, "totalMarks"),
        course_id: text(raw, "courseId").unwrap_or_default(),
    })
}

pub fn exam_result(raw: &RawRecord) -> Option<ExamResult> {
    Some(ExamResult {
        result_id: required_key(raw, "resultId", "result")?,
        student_id: text(raw, "studentId").unwrap_or_default(),
        exam_id: text(raw, "examId").unwrap_or_default(),
        marks_obtained: number(raw, "marksObtained"),
        grade: text(raw, "grade").and_then(|g| g.parse::<Grade>().ok()),
    })
}

fn solved_counts(raw: &RawRecord) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();

    if let Some(Value::Object(nested)) = lookup(raw, "solvedCounts") {
        for (platform, value) in nested {
            counts.insert(canonical_platform(platform), coerce(value).round() as i64);
        }
    }

    for platform in PLATFORMS {
        let field = format!("{platform}Solved");
        if lookup(raw, &field).is_some() {
            counts.insert(platform.to_string(), integer(raw, &field));
        }
    }

    counts
}

/// Maps `leetcode` or `LEETCODE` to the known spelling; unknown names pass through.
pub fn canonical_platform(name: &str) -> String {
    let trimmed = name.trim();
    PLATFORMS
        .iter()
        .find(|p| p.eq_ignore_ascii_case(trimmed))
        .map(|p| p.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn achievement(raw: &RawRecord) -> Option<Achievement> {
    Some(Achievement {
        achievement_id: required_key(raw, "achievementId", "achievement")?,
        student_id: text(raw, "studentId").unwrap_or_default(),
        problem_name: text(raw, "problemName"),
        platform_name: text(raw, "platformName").map(|p| canonical_platform(&p)),
        date_achieved: date(raw, "dateAchieved"),
        score: integer(raw, "score"),
        achievement_type: text(raw, "achievementType"),
        solved_counts: solved_counts(raw),
    })
}

pub fn collect<T>(raws: &[RawRecord], convert: fn(&RawRecord) -> Option<T>) -> Vec<T> {
    raws.iter().filter_map(convert).collect()
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Serializes a canonical record for writing back to a store.
pub fn to_raw<T: Serialize>(record: &T, style: KeyStyle) -> anyhow::Result<RawRecord> {
    let Value::Object(map) = serde_json::to_value(record)? else {
        anyhow::bail!("record did not serialize to an object");
    };

    Ok(match style {
        KeyStyle::Camel => map,
        KeyStyle::Snake => map
            .into_iter()
            .map(|(key, value)| (snake_case(&key), value))
            .collect(),
    })
}

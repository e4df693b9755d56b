//! Data-store collaborator: fetches raw entity collections and writes new
//! records back. Everything returned to callers is normalized first.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::grade;
use crate::models::{
    Achievement, AttendanceRecord, AttendanceStatus, Course, Exam, ExamResult, Student,
};
use crate::normalize::{self, KeyStyle, RawRecord};

pub mod file;
pub mod postgres;
pub mod rest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Students,
    Courses,
    Attendance,
    Exams,
    Results,
    Achievements,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Students,
        EntityKind::Courses,
        EntityKind::Attendance,
        EntityKind::Exams,
        EntityKind::Results,
        EntityKind::Achievements,
    ];

    /// Collection path on the REST API and key in a `db.json` document.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Students => "students",
            EntityKind::Courses => "courses",
            EntityKind::Attendance => "attendance",
            EntityKind::Exams => "exams",
            EntityKind::Results => "results",
            EntityKind::Achievements => "achievements",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Students => "student",
            EntityKind::Courses => "course",
            EntityKind::Attendance => "attendance",
            EntityKind::Exams => "exam",
            EntityKind::Results => "exam_results",
            EntityKind::Achievements => "achievement",
        }
    }

    /// Business key field, camelCase.
    pub fn key_field(&self) -> &'static str {
        match self {
            EntityKind::Students => "studentId",
            EntityKind::Courses => "courseId",
            EntityKind::Attendance => "attendanceId",
            EntityKind::Exams => "examId",
            EntityKind::Results => "resultId",
            EntityKind::Achievements => "achievementId",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            EntityKind::Students => "student_id",
            EntityKind::Courses => "course_id",
            EntityKind::Attendance => "attendance_id",
            EntityKind::Exams => "exam_id",
            EntityKind::Results => "result_id",
            EntityKind::Achievements => "achievement_id",
        }
    }

    /// Prefix for generated ids; students and courses always carry their own.
    pub fn id_prefix(&self) -> Option<&'static str> {
        match self {
            EntityKind::Attendance => Some("A"),
            EntityKind::Exams => Some("EX"),
            EntityKind::Results => Some("R"),
            EntityKind::Achievements => Some("ACH"),
            EntityKind::Students | EntityKind::Courses => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.collection() == wanted || kind.table() == wanted)
            .with_context(|| format!("unknown entity kind {value:?}"))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} record {key:?} not found")]
    NotFound { kind: EntityKind, key: String },

    #[error("{kind} collection is not a list of objects")]
    UnexpectedShape { kind: EntityKind },
}

/// Query/insert/update/delete contract shared by every backend.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records in the order the backend returns them.
    async fn fetch_all(&self, kind: EntityKind) -> anyhow::Result<Vec<RawRecord>>;

    async fn insert(&self, kind: EntityKind, record: RawRecord) -> anyhow::Result<()>;

    /// Replaces the fields present in `record` on the row whose business key is `key`.
    async fn update(&self, kind: EntityKind, key: &str, record: RawRecord) -> anyhow::Result<()>;

    async fn delete(&self, kind: EntityKind, key: &str) -> anyhow::Result<()>;

    fn key_style(&self) -> KeyStyle;
}

/// Values from a JSON document or response body that should be a list of records.
pub(crate) fn into_records(kind: EntityKind, value: Value) -> anyhow::Result<Vec<RawRecord>> {
    let Value::Array(items) = value else {
        return Err(StoreError::UnexpectedShape { kind }.into());
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::UnexpectedShape { kind }.into()),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
    pub attendance: Vec<AttendanceRecord>,
    pub exams: Vec<Exam>,
    pub results: Vec<ExamResult>,
    pub achievements: Vec<Achievement>,
}

/// Fetches every collection concurrently; aggregation starts only once all have arrived.
pub async fn load_snapshot(store: &dyn RecordStore) -> anyhow::Result<Snapshot> {
    let (students, courses, attendance, exams, results, achievements) = tokio::try_join!(
        store.fetch_all(EntityKind::Students),
        store.fetch_all(EntityKind::Courses),
        store.fetch_all(EntityKind::Attendance),
        store.fetch_all(EntityKind::Exams),
        store.fetch_all(EntityKind::Results),
        store.fetch_all(EntityKind::Achievements),
    )?;

    let snapshot = Snapshot {
        students: normalize::collect(&students, normalize::student),
        courses: normalize::collect(&courses, normalize::course),
        attendance: normalize::collect(&attendance, normalize::attendance),
        exams: normalize::collect(&exams, normalize::exam),
        results: normalize::collect(&results, normalize::exam_result),
        achievements: normalize::collect(&achievements, normalize::achievement),
    };

    debug!(
        students = snapshot.students.len(),
        courses = snapshot.courses.len(),
        attendance = snapshot.attendance.len(),
        exams = snapshot.exams.len(),
        results = snapshot.results.len(),
        achievements = snapshot.achievements.len(),
        "snapshot loaded"
    );

    Ok(snapshot)
}

/// `A001`, `EX014`, ... from the number of records already stored.
pub fn next_code(prefix: &str, existing: usize) -> String {
    format!("{prefix}{:03}", existing + 1)
}

pub async fn insert_entity<T: Serialize + Sync>(
    store: &dyn RecordStore,
    kind: EntityKind,
    entity: &T,
) -> anyhow::Result<()> {
    let record = normalize::to_raw(entity, store.key_style())?;
    store.insert(kind, record).await?;
    info!(%kind, "record inserted");
    Ok(())
}

pub async fn update_entity<T: Serialize + Sync>(
    store: &dyn RecordStore,
    kind: EntityKind,
    key: &str,
    entity: &T,
) -> anyhow::Result<()> {
    let record = normalize::to_raw(entity, store.key_style())?;
    store.update(kind, key, record).await?;
    info!(%kind, key, "record updated");
    Ok(())
}

pub async fn seed(store: &dyn RecordStore) -> anyhow::Result<()> {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).context("invalid date");

    let students = vec![
        ("S001", "Avery", "Lee", "avery.lee@example.edu", "Computer Science", "A"),
        ("S002", "Jules", "Moreno", "jules.moreno@example.edu", "Mathematics", "B"),
        ("S003", "Kiara", "Patel", "kiara.patel@example.edu", "Computer Science", "A"),
    ];
    for (id, first, last, email, department, section) in students {
        let student = Student {
            student_id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: Some(email.to_string()),
            phone_number: None,
            department: Some(department.to_string()),
            class_section: Some(section.to_string()),
        };
        insert_entity(store, EntityKind::Students, &student).await?;
    }

    let courses = vec![
        ("C001", "CS101", "Introduction to Programming"),
        ("C002", "MA201", "Linear Algebra"),
    ];
    for (id, code, name) in courses {
        let course = Course {
            course_id: id.to_string(),
            course_code: code.to_string(),
            course_name: name.to_string(),
        };
        insert_entity(store, EntityKind::Courses, &course).await?;
    }

    let attendance = vec![
        ("S001", "C001", date(2026, 2, 2)?, AttendanceStatus::Present),
        ("S001", "C001", date(2026, 2, 3)?, AttendanceStatus::Absent),
        ("S001", "C002", date(2026, 2, 4)?, AttendanceStatus::Present),
        ("S002", "C001", date(2026, 2, 2)?, AttendanceStatus::Absent),
        ("S003", "C002", date(2026, 2, 4)?, AttendanceStatus::Present),
    ];
    for (index, (student_id, course_id, day, status)) in attendance.into_iter().enumerate() {
        let record = AttendanceRecord {
            attendance_id: next_code("A", index),
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            date: Some(day),
            status,
        };
        insert_entity(store, EntityKind::Attendance, &record).await?;
    }

    let exams = vec![
        Exam {
            exam_id: next_code("EX", 0),
            exam_name: "Midterm".to_string(),
            exam_date: Some(date(2026, 3, 2)?),
            exam_type: "Written".to_string(),
            total_marks: 100.0,
            course_id: "C001".to_string(),
        },
        Exam {
            exam_id: next_code("EX", 1),
            exam_name: "Lab Practical".to_string(),
            exam_date: Some(date(2026, 3, 9)?),
            exam_type: "Practical".to_string(),
            total_marks: 50.0,
            course_id: "C002".to_string(),
        },
    ];
    for exam in &exams {
        insert_entity(store, EntityKind::Exams, exam).await?;
    }

    let results = vec![("S001", "EX001", 92.0), ("S002", "EX001", 58.0), ("S003", "EX002", 37.0)];
    for (index, (student_id, exam_id, marks)) in results.into_iter().enumerate() {
        let result = ExamResult {
            result_id: next_code("R", index),
            student_id: student_id.to_string(),
            exam_id: exam_id.to_string(),
            marks_obtained: marks,
            grade: Some(grade::grade_for_new_result(&exams, exam_id, marks)),
        };
        insert_entity(store, EntityKind::Results, &result).await?;
    }

    let achievements = vec![
        ("S001", "Two Sum", "LeetCode", "Problem Solved", 50, date(2026, 1, 20)?),
        ("S002", "Starters 120", "CodeChef", "Contest Win", 80, date(2026, 1, 25)?),
        ("S001", "LRU Cache", "LeetCode", "Problem Solved", 60, date(2026, 2, 1)?),
        ("S003", "30 Days of Code", "HackerRank", "Badge Earned", 40, date(2026, 2, 5)?),
    ];
    for (index, (student_id, problem, platform, kind, score, day)) in
        achievements.into_iter().enumerate()
    {
        let achievement = Achievement {
            achievement_id: next_code("ACH", index),
            student_id: student_id.to_string(),
            problem_name: Some(problem.to_string()),
            platform_name: Some(platform.to_string()),
            date_achieved: Some(day),
            score,
            achievement_type: Some(kind.to_string()),
            solved_counts: Default::default(),
        };
        insert_entity(store, EntityKind::Achievements, &achievement).await?;
    }

    Ok(())
}

/// Inserts rows from a CSV file. Headers may use either naming style; missing
/// ids are generated and result grades are always derived.
pub async fn import_csv(
    store: &dyn RecordStore,
    kind: EntityKind,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let headers = reader.headers()?.clone();

    let exams = match kind {
        EntityKind::Results => {
            normalize::collect(&store.fetch_all(EntityKind::Exams).await?, normalize::exam)
        }
        _ => Vec::new(),
    };
    let mut existing = store.fetch_all(kind).await?.len();
    let mut inserted = 0usize;

    for row in reader.records() {
        let row = row?;
        let mut raw: RawRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| (header.trim().to_string(), Value::String(value.to_string())))
            .collect();

        if let Some(prefix) = kind.id_prefix() {
            if normalize::text(&raw, kind.key_field()).is_none() {
                raw.insert(
                    kind.key_field().to_string(),
                    Value::String(next_code(prefix, existing)),
                );
            }
        }

        let written = match kind {
            EntityKind::Students => write_normalized(store, kind, &raw, normalize::student).await?,
            EntityKind::Courses => write_normalized(store, kind, &raw, normalize::course).await?,
            EntityKind::Attendance => {
                write_normalized(store, kind, &raw, normalize::attendance).await?
            }
            EntityKind::Exams => write_normalized(store, kind, &raw, normalize::exam).await?,
            EntityKind::Results => match normalize::exam_result(&raw) {
                Some(mut result) => {
                    result.grade = Some(grade::grade_for_new_result(
                        &exams,
                        &result.exam_id,
                        result.marks_obtained,
                    ));
                    insert_entity(store, kind, &result).await?;
                    true
                }
                None => false,
            },
            EntityKind::Achievements => {
                write_normalized(store, kind, &raw, normalize::achievement).await?
            }
        };

        if written {
            existing += 1;
            inserted += 1;
        }
    }

    Ok(inserted)
}

async fn write_normalized<T: Serialize + Sync>(
    store: &dyn RecordStore,
    kind: EntityKind,
    raw: &RawRecord,
    convert: fn(&RawRecord) -> Option<T>,
) -> anyhow::Result<bool> {
    match convert(raw) {
        Some(entity) => {
            insert_entity(store, kind, &entity).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_padded() {
        assert_eq!(next_code("A", 0), "A001");
        assert_eq!(next_code("EX", 13), "EX014");
        assert_eq!(next_code("ACH", 999), "ACH1000");
    }

    #[test]
    fn kinds_parse_from_collection_or_table() {
        assert_eq!("results".parse::<EntityKind>().unwrap(), EntityKind::Results);
        assert_eq!("exam_results".parse::<EntityKind>().unwrap(), EntityKind::Results);
        assert_eq!("Student".parse::<EntityKind>().unwrap(), EntityKind::Students);
        assert!("guardians".parse::<EntityKind>().is_err());
    }

    #[test]
    fn non_list_collections_are_rejected() {
        let err = into_records(EntityKind::Courses, serde_json::json!({"a": 1})).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnexpectedShape { kind: EntityKind::Courses })
        ));
        assert!(into_records(EntityKind::Courses, serde_json::json!([1])).is_err());
        assert_eq!(into_records(EntityKind::Courses, serde_json::json!([])).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn csv_results_continue_ids_and_derive_grades() {
        let dir = tempfile::tempdir().unwrap();
        let store = file::FileStore::new(dir.path().join("db.json"));
        let exam = Exam {
            exam_id: "EX001".to_string(),
            exam_name: "Midterm".to_string(),
            exam_date: None,
            exam_type: "Written".to_string(),
            total_marks: 100.0,
            course_id: "C001".to_string(),
        };
        insert_entity(&store, EntityKind::Exams, &exam).await.unwrap();
        let earlier = ExamResult {
            result_id: "R001".to_string(),
            student_id: "S001".to_string(),
            exam_id: "EX001".to_string(),
            marks_obtained: 40.0,
            grade: Some(crate::models::Grade::D),
        };
        insert_entity(&store, EntityKind::Results, &earlier).await.unwrap();

        let csv_path = dir.path().join("results.csv");
        std::fs::write(
            &csv_path,
            "student_id,exam_id,marks_obtained,grade\nS002,EX001,92,F\nS003,EX001,55,A+\n",
        )
        .unwrap();

        let inserted = import_csv(&store, EntityKind::Results, &csv_path).await.unwrap();
        assert_eq!(inserted, 2);

        let snapshot = load_snapshot(&store).await.unwrap();
        let ids: Vec<&str> = snapshot.results.iter().map(|r| r.result_id.as_str()).collect();
        assert_eq!(ids, ["R001", "R002", "R003"]);
        assert_eq!(snapshot.results[1].grade, Some(crate::models::Grade::APlus));
        assert_eq!(snapshot.results[2].grade, Some(crate::models::Grade::C));
    }

    #[tokio::test]
    async fn csv_rows_without_a_key_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = file::FileStore::new(dir.path().join("db.json"));
        let csv_path = dir.path().join("students.csv");
        std::fs::write(
            &csv_path,
            "studentId,firstName,lastName\nS001,Avery,Lee\n,Nameless,Row\nS002,Jules,Moreno\n",
        )
        .unwrap();

        let inserted = import_csv(&store, EntityKind::Students, &csv_path).await.unwrap();
        assert_eq!(inserted, 2);

        let snapshot = load_snapshot(&store).await.unwrap();
        let names: Vec<String> = snapshot.students.iter().map(|s| s.full_name()).collect();
        assert_eq!(names, ["Avery Lee", "Jules Moreno"]);
    }
}

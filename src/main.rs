use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod grade;
mod leaderboard;
mod lookup;
mod models;
mod normalize;
mod report;
mod store;

use crate::config::{Backend, Config};
use crate::leaderboard::{PlatformFilter, SimpleMetric};
use crate::models::{
    Achievement, AttendanceRecord, Course, Exam, ExamResult, Student, ACHIEVEMENT_TYPES,
};
use crate::store::{load_snapshot, next_code, EntityKind, RecordStore};

#[derive(Parser)]
#[command(name = "student-records")]
#[command(about = "Attendance, exam and coding-leaderboard views over student records", long_about = None)]
struct Cli {
    /// Data store to use (overrides STORE_BACKEND)
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum MetricArg {
    Score,
    Solved,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import records of one kind from a CSV file
    Import {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Add a student
    AddStudent {
        #[arg(long)]
        id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Update a student's details
    UpdateStudent {
        #[arg(long)]
        id: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Remove a student
    RemoveStudent {
        #[arg(long)]
        id: String,
    },
    /// Add a course
    AddCourse {
        #[arg(long)]
        id: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    /// Record a student's presence or absence for a course session
    MarkAttendance {
        #[arg(long)]
        student: String,
        #[arg(long)]
        course: String,
        /// Session date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        absent: bool,
        #[arg(long)]
        id: Option<String>,
    },
    /// Add an exam
    AddExam {
        #[arg(long)]
        name: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "Written")]
        exam_type: String,
        #[arg(long, default_value_t = 100.0)]
        total_marks: f64,
        #[arg(long)]
        id: Option<String>,
    },
    /// Record an exam result; the grade is derived from the marks
    AddResult {
        #[arg(long)]
        student: String,
        #[arg(long)]
        exam: String,
        #[arg(long)]
        marks: f64,
        #[arg(long)]
        id: Option<String>,
    },
    /// Record a coding achievement
    AddAchievement {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "LeetCode")]
        platform: String,
        #[arg(long)]
        problem: Option<String>,
        #[arg(long, default_value_t = 100)]
        score: i64,
        #[arg(long, default_value = "Problem Solved")]
        achievement_type: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        id: Option<String>,
    },
    /// Show attendance percentages
    Attendance {
        #[arg(long)]
        student: Option<String>,
    },
    /// List exams and results
    Results,
    /// Grade a mark against a total
    Grade {
        #[arg(long)]
        marks: f64,
        #[arg(long, default_value_t = 100.0)]
        total: f64,
    },
    /// Rank students by coding achievements
    Leaderboard {
        #[arg(long, default_value = "all")]
        platform: PlatformFilter,
        /// Compact top-N view
        #[arg(long)]
        simple: bool,
        #[arg(long, value_enum, default_value_t = MetricArg::Score)]
        metric: MetricArg,
        /// Platforms summed by the solved metric
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<String>,
        #[arg(long, default_value_t = leaderboard::SIMPLE_LIMIT)]
        limit: usize,
    },
    /// Show dashboard counts
    Stats,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "all")]
        platform: PlatformFilter,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    info!(backend = ?config.backend, "using data store");

    match cli.command {
        Commands::InitDb => {
            anyhow::ensure!(
                config.backend == Backend::Postgres,
                "init-db only applies to the postgres backend"
            );
            config.connect_postgres().await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Grade { marks, total } => {
            anyhow::ensure!(total > 0.0, "total marks must be positive");
            let result = grade::grade_of(marks, total);
            println!(
                "{marks}/{total} = {:.2}% -> {}",
                grade::percentage(marks, total),
                result.grade
            );
        }
        command => {
            let store = config.open_store().await?;
            run(store.as_ref(), command).await?;
        }
    }

    Ok(())
}

async fn run(store: &dyn RecordStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::InitDb | Commands::Grade { .. } => {
            anyhow::bail!("this command does not read the record store")
        }
        Commands::Seed => {
            store::seed(store).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let inserted = store::import_csv(store, kind, &csv).await?;
            println!("Inserted {inserted} {kind} records from {}.", csv.display());
        }
        Commands::AddStudent {
            id,
            first_name,
            last_name,
            email,
            phone,
            department,
            section,
        } => {
            let student = Student {
                student_id: id,
                first_name,
                last_name,
                email,
                phone_number: phone,
                department,
                class_section: section,
            };
            store::insert_entity(store, EntityKind::Students, &student).await?;
            println!("Student {} added.", student.student_id);
        }
        Commands::UpdateStudent {
            id,
            first_name,
            last_name,
            email,
            phone,
            department,
            section,
        } => {
            let snapshot = load_snapshot(store).await?;
            let current = snapshot
                .students
                .iter()
                .find(|s| s.student_id == id)
                .cloned()
                .ok_or_else(|| store::StoreError::NotFound {
                    kind: EntityKind::Students,
                    key: id.clone(),
                })?;
            let updated = Student {
                student_id: current.student_id,
                first_name: first_name.unwrap_or(current.first_name),
                last_name: last_name.unwrap_or(current.last_name),
                email: email.or(current.email),
                phone_number: phone.or(current.phone_number),
                department: department.or(current.department),
                class_section: section.or(current.class_section),
            };
            store::update_entity(store, EntityKind::Students, &id, &updated).await?;
            println!("Student {id} updated.");
        }
        Commands::RemoveStudent { id } => {
            store.delete(EntityKind::Students, &id).await?;
            println!("Student {id} removed.");
        }
        Commands::AddCourse { id, code, name } => {
            let course = Course {
                course_id: id,
                course_code: code,
                course_name: name,
            };
            store::insert_entity(store, EntityKind::Courses, &course).await?;
            println!("Course {} added.", course.course_id);
        }
        Commands::MarkAttendance {
            student,
            course,
            date,
            absent,
            id,
        } => {
            let existing = store.fetch_all(EntityKind::Attendance).await?.len();
            let record = AttendanceRecord {
                attendance_id: id.unwrap_or_else(|| next_code("A", existing)),
                student_id: student,
                course_id: course,
                date: Some(date.unwrap_or_else(|| Utc::now().date_naive())),
                status: if absent {
                    models::AttendanceStatus::Absent
                } else {
                    models::AttendanceStatus::Present
                },
            };
            store::insert_entity(store, EntityKind::Attendance, &record).await?;
            println!(
                "Attendance {} marked {} for {}.",
                record.attendance_id, record.status, record.student_id
            );
        }
        Commands::AddExam {
            name,
            course,
            date,
            exam_type,
            total_marks,
            id,
        } => {
            anyhow::ensure!(total_marks > 0.0, "total marks must be positive");
            let existing = store.fetch_all(EntityKind::Exams).await?.len();
            let exam = Exam {
                exam_id: id.unwrap_or_else(|| next_code("EX", existing)),
                exam_name: name,
                exam_date: date,
                exam_type,
                total_marks,
                course_id: course,
            };
            store::insert_entity(store, EntityKind::Exams, &exam).await?;
            println!("Exam {} created.", exam.exam_id);
        }
        Commands::AddResult {
            student,
            exam,
            marks,
            id,
        } => {
            let snapshot = load_snapshot(store).await?;
            let result = ExamResult {
                result_id: id.unwrap_or_else(|| next_code("R", snapshot.results.len())),
                grade: Some(grade::grade_for_new_result(&snapshot.exams, &exam, marks)),
                student_id: student,
                exam_id: exam,
                marks_obtained: marks,
            };
            store::insert_entity(store, EntityKind::Results, &result).await?;
            println!(
                "Result {} recorded with grade {}.",
                result.result_id,
                result.grade.map(|g| g.to_string()).unwrap_or_default()
            );
        }
        Commands::AddAchievement {
            student,
            platform,
            problem,
            score,
            achievement_type,
            date,
            id,
        } => {
            if !ACHIEVEMENT_TYPES.contains(&achievement_type.as_str()) {
                tracing::warn!(%achievement_type, "unrecognised achievement type");
            }
            let existing = store.fetch_all(EntityKind::Achievements).await?.len();
            let achievement = Achievement {
                achievement_id: id.unwrap_or_else(|| next_code("ACH", existing)),
                student_id: student,
                problem_name: problem,
                platform_name: Some(normalize::canonical_platform(&platform)),
                date_achieved: Some(date.unwrap_or_else(|| Utc::now().date_naive())),
                score,
                achievement_type: Some(achievement_type),
                solved_counts: Default::default(),
            };
            store::insert_entity(store, EntityKind::Achievements, &achievement).await?;
            println!("Achievement {} added.", achievement.achievement_id);
        }
        Commands::Attendance { student } => {
            let snapshot = load_snapshot(store).await?;

            if let Some(id) = student {
                let count = attendance::attendance_count(&snapshot.attendance, &id);
                let percentage = attendance::attendance_percentage(&snapshot.attendance, &id);
                println!(
                    "{} ({id}): {percentage}% ({}/{} present, {})",
                    lookup::student_label(lookup::students(&snapshot.students).get(&id)),
                    count.present,
                    count.total,
                    attendance::band(percentage)
                );
                return Ok(());
            }

            let summaries =
                attendance::summarize_attendance(&snapshot.attendance, &snapshot.students);
            if summaries.is_empty() {
                println!("No students found.");
                return Ok(());
            }
            for summary in &summaries {
                println!(
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
        Commands::Results => {
            let snapshot = load_snapshot(store).await?;
            let exams = grade::exam_rows(&snapshot.exams, &snapshot.courses);
            let results =
                grade::result_rows(&snapshot.results, &snapshot.students, &snapshot.exams);

            println!("Exams ({}):", exams.len());
            for exam in &exams {
                println!(
                    "- {} {} [{}] {} marks, {}",
                    exam.exam_id, exam.exam_name, exam.exam_type, exam.total_marks, exam.course_label
                );
            }
            println!("Results ({}):", results.len());
            for row in &results {
                println!(
                    "- {} {} / {}: {} ({:.2}%) {}",
                    row.result_id,
                    row.student_name,
                    row.exam_name,
                    row.marks_obtained,
                    row.percentage,
                    row.grade
                );
            }
        }
        Commands::Leaderboard {
            platform,
            simple,
            metric,
            platforms,
            limit,
        } => {
            let snapshot = load_snapshot(store).await?;

            if simple {
                let metric = match metric {
                    MetricArg::Score => SimpleMetric::Score,
                    MetricArg::Solved if platforms.is_empty() => SimpleMetric::SolvedOn(
                        leaderboard::DEFAULT_SOLVED_PLATFORMS
                            .iter()
                            .map(|p| p.to_string())
                            .collect(),
                    ),
                    MetricArg::Solved => SimpleMetric::SolvedOn(
                        platforms
                            .iter()
                            .map(|p| normalize::canonical_platform(p))
                            .collect(),
                    ),
                };
                let top = leaderboard::top_students(
                    &snapshot.students,
                    &snapshot.achievements,
                    &metric,
                    limit,
                );
                if top.is_empty() {
                    println!("No achievements yet.");
                }
                for (index, entry) in top.iter().enumerate() {
                    println!("{}. {} {} pts", index + 1, entry.student_name, entry.total);
                }
                return Ok(());
            }

            let board =
                leaderboard::rank_students(&snapshot.students, &snapshot.achievements, &platform);
            println!("Leaderboard for {platform} ({} students):", board.len());
            for entry in &board {
                println!(
                    "{} {} ({}) total {} | solved {} | avg {} | {}",
                    leaderboard::rank_label(entry.rank),
                    entry.student_name,
                    entry.student_id,
                    entry.total_score,
                    entry.problems_solved,
                    entry.average_score,
                    models::PLATFORMS
                        .iter()
                        .map(|p| format!("{p} {}", entry.platform_scores.get(*p).copied().unwrap_or(0)))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        Commands::Stats => {
            let snapshot = load_snapshot(store).await?;
            let stats = report::dashboard(&snapshot);
            println!("Students: {}", stats.students);
            println!("Courses: {}", stats.courses);
            println!("Attendance records: {}", stats.attendance);
            println!("Exams: {}", stats.exams);
            println!("Results: {}", stats.results);
            println!("Recently added:");
            for student in &stats.recent_students {
                println!(
                    "- {} ({}) {}",
                    student.full_name(),
                    student.student_id,
                    student.department.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Report { platform, out } => {
            let snapshot = load_snapshot(store).await?;
            let report = report::build_report(&snapshot, &platform);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

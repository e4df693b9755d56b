use crate::grade::{percentage, round_half_up};
use crate::lookup;
use crate::models::{
    AttendanceBand, AttendanceCount, AttendanceRecord, AttendanceRow, AttendanceStatus,
    AttendanceSummary, Course, Student,
};

pub fn attendance_count(records: &[AttendanceRecord], student_id: &str) -> AttendanceCount {
    records
        .iter()
        .filter(|record| record.student_id == student_id)
        .fold(AttendanceCount::default(), |mut count, record| {
            count.total += 1;
            if record.status == AttendanceStatus::Present {
                count.present += 1;
            }
            count
        })
}

/// Whole-number percentage of sessions attended; 0 for a student with no records.
pub fn percentage_of(count: AttendanceCount) -> u32 {
    round_half_up(percentage(count.present as f64, count.total as f64)).clamp(0, 100) as u32
}

pub fn attendance_percentage(records: &[AttendanceRecord], student_id: &str) -> u32 {
    percentage_of(attendance_count(records, student_id))
}

pub fn band(percentage: u32) -> AttendanceBand {
    match percentage {
        75.. => AttendanceBand::Good,
        50..=74 => AttendanceBand::Average,
        _ => AttendanceBand::Poor,
    }
}

pub fn summarize_attendance(
    records: &[AttendanceRecord],
    students: &[Student],
) -> Vec<AttendanceSummary> {
    students
        .iter()
        .map(|student| {
            let count = attendance_count(records, &student.student_id);
            let percentage = percentage_of(count);
            AttendanceSummary {
                student_id: student.student_id.clone(),
                student_name: student.full_name(),
                percentage,
                present: count.present,
                total: count.total,
                band: band(percentage),
            }
        })
        .collect()
}

/// Log rows, most recently recorded first.
pub fn attendance_log(
    records: &[AttendanceRecord],
    students: &[Student],
    courses: &[Course],
) -> Vec<AttendanceRow> {
    let students = lookup::students(students);
    let courses = lookup::courses(courses);

    records
        .iter()
        .rev()
        .map(|record| AttendanceRow {
            attendance_id: record.attendance_id.clone(),
            student_name: lookup::student_label(students.get(&record.student_id)),
            course_name: lookup::course_label(courses.get(&record.course_id)),
            date: record.date,
            status: record.status,
        })
        .collect()
}

use crate::lookup::{self, Lookup};
use crate::models::{Course, Exam, ExamResult, ExamRow, Grade, GradeResult, ResultRow, Student};

/// Total marks assumed for a result whose exam cannot be found.
pub const DEFAULT_TOTAL_MARKS: f64 = 100.0;

/// Lower bounds (inclusive), checked highest first.
const THRESHOLDS: [(f64, Grade); 6] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::C),
    (40.0, Grade::D),
];

/// `100 * part / whole`, or 0 when `whole` is not positive.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        100.0 * part / whole
    } else {
        0.0
    }
}

/// Half-up rounding to a whole number.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

pub fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn grade_for_percentage(percent: f64) -> Grade {
    THRESHOLDS
        .iter()
        .find(|(floor, _)| percent >= *floor)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::F)
}

/// Marks above the total are accepted and grade as A+.
pub fn grade_of(marks_obtained: f64, total_marks: f64) -> GradeResult {
    GradeResult {
        grade: grade_for_percentage(percentage(marks_obtained, total_marks)),
    }
}

/// Grade stored on a newly created result, never taken from user input.
pub fn grade_for_new_result(exams: &[Exam], exam_id: &str, marks_obtained: f64) -> Grade {
    let total = match lookup::exams(exams).get(exam_id) {
        Lookup::Found(exam) => exam.total_marks,
        Lookup::NotFound => DEFAULT_TOTAL_MARKS,
    };
    grade_of(marks_obtained, total).grade
}

pub fn result_rows(results: &[ExamResult], students: &[Student], exams: &[Exam]) -> Vec<ResultRow> {
    let students = lookup::students(students);
    let exam_index = lookup::exams(exams);

    results
        .iter()
        .map(|result| {
            let exam = exam_index.get(&result.exam_id);
            let (total_marks, percent) = match exam {
                Lookup::Found(exam) => (
                    Some(exam.total_marks),
                    round_2dp(percentage(result.marks_obtained, exam.total_marks)),
                ),
                Lookup::NotFound => (None, 0.0),
            };
            let grade = result.grade.unwrap_or_else(|| {
                grade_of(result.marks_obtained, total_marks.unwrap_or(DEFAULT_TOTAL_MARKS)).grade
            });

            ResultRow {
                result_id: result.result_id.clone(),
                student_name: lookup::student_label(students.get(&result.student_id)),
                exam_name: lookup::exam_label(exam),
                marks_obtained: result.marks_obtained,
                total_marks,
                percentage: percent,
                grade,
            }
        })
        .collect()
}

pub fn exam_rows(exams: &[Exam], courses: &[Course]) -> Vec<ExamRow> {
    let courses = lookup::courses(courses);
    exams
        .iter()
        .map(|exam| ExamRow {
            exam_id: exam.exam_id.clone(),
            exam_name: exam.exam_name.clone(),
            exam_date: exam.exam_date,
            exam_type: exam.exam_type.clone(),
            total_marks: exam.total_marks,
            course_label: lookup::course_code_label(courses.get(&exam.course_id)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam(id: &str, total: f64) -> Exam {
        Exam {
            exam_id: id.to_string(),
            exam_name: format!("Exam {id}"),
            exam_date: None,
            exam_type: "Written".to_string(),
            total_marks: total,
            course_id: "C1".to_string(),
        }
    }

    fn result(id: &str, exam_id: &str, marks: f64, grade: Option<Grade>) -> ExamResult {
        ExamResult {
            result_id: id.to_string(),
            student_id: "S1".to_string(),
            exam_id: exam_id.to_string(),
            marks_obtained: marks,
            grade,
        }
    }

    #[test]
    fn boundaries_land_on_the_higher_grade() {
        assert_eq!(grade_of(90.0, 100.0).grade, Grade::APlus);
        assert_eq!(grade_of(89.0, 100.0).grade, Grade::A);
        assert_eq!(grade_of(80.0, 100.0).grade, Grade::A);
        assert_eq!(grade_of(70.0, 100.0).grade, Grade::BPlus);
        assert_eq!(grade_of(60.0, 100.0).grade, Grade::B);
        assert_eq!(grade_of(50.0, 100.0).grade, Grade::C);
        assert_eq!(grade_of(40.0, 100.0).grade, Grade::D);
        assert_eq!(grade_of(39.0, 100.0).grade, Grade::F);
    }

    #[test]
    fn scenario_grades() {
        assert_eq!(grade_of(95.0, 100.0).grade, Grade::APlus);
        assert_eq!(grade_of(45.0, 100.0).grade, Grade::D);
        assert_eq!(grade_of(105.0, 100.0).grade, Grade::APlus);
        assert_eq!(grade_of(27.0, 30.0).grade, Grade::APlus);
    }

    #[test]
    fn grade_never_improves_as_marks_drop() {
        let mut previous = Grade::APlus;
        for marks in (0..=110).rev() {
            let grade = grade_of(marks as f64, 100.0).grade;
            assert!(grade >= previous, "{marks} graded {grade} after {previous}");
            previous = grade;
        }
    }

    #[test]
    fn zero_total_is_degenerate_not_a_panic() {
        assert_eq!(percentage(10.0, 0.0), 0.0);
        assert_eq!(grade_of(10.0, 0.0).grade, Grade::F);
    }

    #[test]
    fn half_up_rounding_matches_display_rules() {
        assert_eq!(round_half_up(66.666), 67);
        assert_eq!(round_half_up(62.5), 63);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_2dp(66.6666), 66.67);
    }

    #[test]
    fn new_results_use_exam_total_or_default() {
        let exams = vec![exam("EX001", 50.0)];
        assert_eq!(grade_for_new_result(&exams, "EX001", 45.0), Grade::APlus);
        assert_eq!(grade_for_new_result(&exams, "EX404", 45.0), Grade::D);
    }

    #[test]
    fn result_rows_degrade_for_missing_exam() {
        let exams = vec![exam("EX001", 80.0)];
        let results = vec![
            result("R001", "EX001", 60.0, Some(Grade::B)),
            result("R002", "EX404", 72.0, None),
        ];
        let rows = result_rows(&results, &[], &exams);

        assert_eq!(rows[0].exam_name, "Exam EX001");
        assert_eq!(rows[0].student_name, "Unknown");
        assert_eq!(rows[0].total_marks, Some(80.0));
        assert_eq!(rows[0].percentage, 75.0);
        assert_eq!(rows[0].grade, Grade::B);

        assert_eq!(rows[1].exam_name, "Unknown");
        assert_eq!(rows[1].total_marks, None);
        assert_eq!(rows[1].percentage, 0.0);
        assert_eq!(rows[1].grade, Grade::BPlus);
    }

    #[test]
    fn exam_rows_label_courses() {
        let courses = vec![Course {
            course_id: "C1".to_string(),
            course_code: "MA201".to_string(),
            course_name: "Linear Algebra".to_string(),
        }];
        let rows = exam_rows(&[exam("EX001", 100.0)], &courses);
        assert_eq!(rows[0].course_label, "MA201 - Linear Algebra");
    }
}

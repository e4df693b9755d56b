use std::collections::HashMap;

use crate::models::{Course, Exam, Student};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, PartialEq)]
pub enum Lookup<'a, T> {
    Found(&'a T),
    NotFound,
}

/// Id index over a snapshot collection. Repeated ids resolve to the first record.
pub struct Index<'a, T> {
    by_id: HashMap<&'a str, &'a T>,
}

impl<'a, T> Index<'a, T> {
    pub fn new(items: &'a [T], id: fn(&T) -> &str) -> Self {
        let mut by_id = HashMap::with_capacity(items.len());
        for item in items {
            by_id.entry(id(item)).or_insert(item);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Lookup<'a, T> {
        match self.by_id.get(id) {
            Some(item) => Lookup::Found(*item),
            None => Lookup::NotFound,
        }
    }
}

pub fn students(items: &[Student]) -> Index<'_, Student> {
    Index::new(items, |s| s.student_id.as_str())
}

pub fn courses(items: &[Course]) -> Index<'_, Course> {
    Index::new(items, |c| c.course_id.as_str())
}

pub fn exams(items: &[Exam]) -> Index<'_, Exam> {
    Index::new(items, |e| e.exam_id.as_str())
}

pub fn student_label(lookup: Lookup<'_, Student>) -> String {
    match lookup {
        Lookup::Found(student) => student.full_name(),
        Lookup::NotFound => UNKNOWN.to_string(),
    }
}

pub fn course_label(lookup: Lookup<'_, Course>) -> String {
    match lookup {
        Lookup::Found(course) => course.course_name.clone(),
        Lookup::NotFound => UNKNOWN.to_string(),
    }
}

pub fn course_code_label(lookup: Lookup<'_, Course>) -> String {
    match lookup {
        Lookup::Found(course) => format!("{} - {}", course.course_code, course.course_name),
        Lookup::NotFound => UNKNOWN.to_string(),
    }
}

pub fn exam_label(lookup: Lookup<'_, Exam>) -> String {
    match lookup {
        Lookup::Found(exam) => exam.exam_name.clone(),
        Lookup::NotFound => UNKNOWN.to_string(),
    }
}

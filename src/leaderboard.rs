use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::grade::round_half_up;
use crate::lookup;
use crate::models::{Achievement, AchievementCard, LeaderboardEntry, SimpleEntry, Student, PLATFORMS};
use crate::normalize::canonical_platform;

pub const SIMPLE_LIMIT: usize = 5;
pub const RECENT_ACHIEVEMENTS: usize = 10;
pub const DEFAULT_SOLVED_PLATFORMS: [&str; 2] = ["LeetCode", "CodeChef"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformFilter {
    All,
    Only(String),
}

impl PlatformFilter {
    pub fn matches(&self, achievement: &Achievement) -> bool {
        match self {
            PlatformFilter::All => true,
            PlatformFilter::Only(platform) => achievement.is_on(platform),
        }
    }
}

impl FromStr for PlatformFilter {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            anyhow::bail!("platform filter must be \"all\" or a platform name");
        }
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(PlatformFilter::All);
        }
        Ok(PlatformFilter::Only(canonical_platform(trimmed)))
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFilter::All => f.write_str("all platforms"),
            PlatformFilter::Only(platform) => f.write_str(platform),
        }
    }
}

/// Metric summed by the compact leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleMetric {
    Score,
    SolvedOn(Vec<String>),
}

/// Saturates instead of overflowing; coerced scores can sit at `i64::MAX`.
fn saturating_total(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}

fn sum_scores<'a>(achievements: impl Iterator<Item = &'a Achievement>) -> i64 {
    saturating_total(achievements.map(|a| a.score))
}

/// Per-platform columns are computed over every achievement, ignoring the filter.
fn platform_scores(own: &[&Achievement]) -> BTreeMap<String, i64> {
    PLATFORMS
        .iter()
        .map(|platform| {
            let total = sum_scores(own.iter().copied().filter(|a| a.is_on(platform)));
            (platform.to_string(), total)
        })
        .collect()
}

/// Ranks every student by total score, highest first. Equal totals keep roster order.
pub fn rank_students(
    students: &[Student],
    achievements: &[Achievement],
    filter: &PlatformFilter,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = students
        .iter()
        .map(|student| {
            let own: Vec<&Achievement> = achievements
                .iter()
                .filter(|a| a.student_id == student.student_id)
                .collect();
            let filtered: Vec<&Achievement> =
                own.iter().copied().filter(|a| filter.matches(a)).collect();

            let total_score = sum_scores(filtered.iter().copied());
            let achievement_count = filtered.len();
            let average_score = if achievement_count > 0 {
                round_half_up(total_score as f64 / achievement_count as f64)
            } else {
                0
            };

            LeaderboardEntry {
                student_id: student.student_id.clone(),
                student_name: student.full_name(),
                total_score,
                problems_solved: filtered.iter().filter(|a| a.is_problem_solved()).count(),
                achievement_count,
                average_score,
                platform_scores: platform_scores(&own),
                rank: 0,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.total_score.cmp(&a.total_score));
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index + 1;
    }
    entries
}

fn solved_on(achievement: &Achievement, platforms: &[String]) -> i64 {
    saturating_total(platforms.iter().map(|platform| {
        match achievement.solved_counts.get(platform) {
            Some(count) => *count,
            None if achievement.is_on(platform) && achievement.is_problem_solved() => 1,
            None => 0,
        }
    }))
}

/// Compact leaderboard: top `limit` students by a single summed metric.
pub fn top_students(
    students: &[Student],
    achievements: &[Achievement],
    metric: &SimpleMetric,
    limit: usize,
) -> Vec<SimpleEntry> {
    let mut entries: Vec<SimpleEntry> = students
        .iter()
        .map(|student| {
            let own = achievements
                .iter()
                .filter(|a| a.student_id == student.student_id);
            let total = match metric {
                SimpleMetric::Score => sum_scores(own),
                SimpleMetric::SolvedOn(platforms) => {
                    saturating_total(own.map(|a| solved_on(a, platforms)))
                }
            };
            SimpleEntry {
                student_id: student.student_id.clone(),
                student_name: student.full_name(),
                total,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.total.cmp(&a.total));
    entries.truncate(limit);
    entries
}

pub fn rank_label(rank: usize) -> String {
    match rank {
        1 => "1st".to_string(),
        2 => "2nd".to_string(),
        3 => "3rd".to_string(),
        n => format!("#{n}"),
    }
}

/// Newest achievements first; undated ones sort last.
pub fn recent_achievements(
    achievements: &[Achievement],
    students: &[Student],
    limit: usize,
) -> Vec<AchievementCard> {
    let students = lookup::students(students);
    let mut recent: Vec<&Achievement> = achievements.iter().collect();
    recent.sort_by(|a, b| match (a.date_achieved, b.date_achieved) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    recent
        .into_iter()
        .take(limit)
        .map(|a| AchievementCard {
            student_name: lookup::student_label(students.get(&a.student_id)),
            platform_name: a.platform_name.clone().unwrap_or_default(),
            problem_name: a.problem_name.clone().unwrap_or_default(),
            achievement_type: a.achievement_type.clone().unwrap_or_default(),
            score: a.score,
            date_achieved: a.date_achieved,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn student(id: &str) -> Student {
        Student {
            student_id: id.to_string(),
            first_name: id.to_string(),
            last_name: "Student".to_string(),
            email: None,
            phone_number: None,
            department: None,
            class_section: None,
        }
    }

    fn achievement(student_id: &str, platform: &str, kind: &str, score: i64) -> Achievement {
        Achievement {
            achievement_id: format!("ACH-{student_id}-{score}"),
            student_id: student_id.to_string(),
            problem_name: Some("Two Sum".to_string()),
            platform_name: Some(platform.to_string()),
            date_achieved: None,
            score,
            achievement_type: Some(kind.to_string()),
            solved_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn higher_total_ranks_first() {
        let students = vec![student("S1"), student("S2")];
        let achievements = vec![
            achievement("S1", "LeetCode", "Problem Solved", 50),
            achievement("S2", "LeetCode", "Problem Solved", 80),
            achievement("S1", "LeetCode", "Problem Solved", 60),
        ];
        let board = rank_students(&students, &achievements, &PlatformFilter::All);

        assert_eq!(board[0].student_id, "S1");
        assert_eq!(board[0].total_score, 110);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].average_score, 55);
        assert_eq!(board[1].student_id, "S2");
        assert_eq!(board[1].total_score, 80);
        assert_eq!(board[1].rank, 2);
    }

    #[test]
    fn ties_keep_roster_order_and_ranks_are_dense() {
        let students = vec![student("S1"), student("S2"), student("S3"), student("S4")];
        let achievements = vec![
            achievement("S2", "HackerRank", "Milestone", 30),
            achievement("S3", "HackerRank", "Milestone", 30),
        ];
        let board = rank_students(&students, &achievements, &PlatformFilter::All);

        let order: Vec<&str> = board.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(order, ["S2", "S3", "S1", "S4"]);
        let ranks: Vec<usize> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, [1, 2, 3, 4]);
    }

    #[test]
    fn empty_achievements_keep_input_order() {
        let students = vec![student("S3"), student("S1"), student("S2")];
        let board = rank_students(&students, &[], &PlatformFilter::All);
        let order: Vec<&str> = board.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(order, ["S3", "S1", "S2"]);
        assert!(board.iter().all(|e| e.total_score == 0 && e.average_score == 0));
    }

    #[test]
    fn filter_scopes_totals_but_not_platform_columns() {
        let students = vec![student("S1")];
        let achievements = vec![
            achievement("S1", "LeetCode", "Problem Solved", 100),
            achievement("S1", "Codeforces", "Contest Win", 250),
            achievement("S1", "LeetCode", "Badge Earned", 20),
        ];
        let filter: PlatformFilter = "leetcode".parse().unwrap();
        let board = rank_students(&students, &achievements, &filter);
        let entry = &board[0];

        assert_eq!(entry.total_score, 120);
        assert_eq!(entry.achievement_count, 2);
        assert_eq!(entry.problems_solved, 1);
        assert_eq!(entry.average_score, 60);
        assert_eq!(entry.platform_scores["LeetCode"], 120);
        assert_eq!(entry.platform_scores["Codeforces"], 250);
        assert_eq!(entry.platform_scores["HackerRank"], 0);
        assert_eq!(entry.platform_scores.len(), PLATFORMS.len());
    }

    #[test]
    fn filter_parsing() {
        assert_eq!("ALL".parse::<PlatformFilter>().unwrap(), PlatformFilter::All);
        assert_eq!(
            "codechef".parse::<PlatformFilter>().unwrap(),
            PlatformFilter::Only("CodeChef".to_string())
        );
        assert!(" ".parse::<PlatformFilter>().is_err());
    }

    #[test]
    fn simple_board_takes_top_five_by_score() {
        let students: Vec<Student> = (1..=7).map(|i| student(&format!("S{i}"))).collect();
        let achievements: Vec<Achievement> = (1..=7)
            .map(|i| achievement(&format!("S{i}"), "LeetCode", "Problem Solved", i * 10))
            .collect();
        let board = top_students(&students, &achievements, &SimpleMetric::Score, SIMPLE_LIMIT);

        assert_eq!(board.len(), 5);
        assert_eq!(board[0].student_id, "S7");
        assert_eq!(board[0].total, 70);
        assert_eq!(board[4].student_id, "S3");
    }

    #[test]
    fn solved_metric_prefers_recorded_counts() {
        let students = vec![student("S1"), student("S2")];
        let mut counted = achievement("S1", "LeetCode", "Milestone", 0);
        counted.solved_counts.insert("LeetCode".to_string(), 40);
        counted.solved_counts.insert("CodeChef".to_string(), 5);
        counted.solved_counts.insert("HackerRank".to_string(), 99);
        let achievements = vec![
            counted,
            achievement("S2", "CodeChef", "Problem Solved", 10),
            achievement("S2", "HackerRank", "Problem Solved", 10),
        ];
        let metric = SimpleMetric::SolvedOn(
            DEFAULT_SOLVED_PLATFORMS.iter().map(|p| p.to_string()).collect(),
        );
        let board = top_students(&students, &achievements, &metric, SIMPLE_LIMIT);

        assert_eq!(board[0].student_id, "S1");
        assert_eq!(board[0].total, 45);
        assert_eq!(board[1].total, 1);
    }

    #[test]
    fn rank_labels() {
        assert_eq!(rank_label(1), "1st");
        assert_eq!(rank_label(2), "2nd");
        assert_eq!(rank_label(3), "3rd");
        assert_eq!(rank_label(12), "#12");
    }

    #[test]
    fn recent_achievements_sort_newest_first() {
        let mut old = achievement("S1", "LeetCode", "Problem Solved", 10);
        old.date_achieved = NaiveDate::from_ymd_opt(2026, 1, 5);
        let mut new = achievement("S9", "CodeChef", "Contest Win", 90);
        new.date_achieved = NaiveDate::from_ymd_opt(2026, 2, 1);
        let undated = achievement("S1", "HackerRank", "Badge Earned", 5);

        let cards = recent_achievements(&[undated, old, new], &[student("S1")], 2);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].score, 90);
        assert_eq!(cards[0].student_name, "Unknown");
        assert_eq!(cards[1].score, 10);
        assert_eq!(cards[1].student_name, "S1 Student");
    }

    #[test]
    fn huge_coerced_scores_saturate_instead_of_overflowing() {
        let huge = |id: &str| {
            let raw = serde_json::json!({
                "achievementId": id,
                "studentId": "S1",
                "platformName": "leetcode",
                "achievementType": "Problem Solved",
                "score": "1e30"
            });
            crate::normalize::achievement(raw.as_object().unwrap()).unwrap()
        };
        let achievements = vec![
            huge("ACH001"),
            huge("ACH002"),
            achievement("S2", "LeetCode", "Problem Solved", 10),
        ];
        let students = vec![student("S2"), student("S1")];

        let board = rank_students(&students, &achievements, &PlatformFilter::All);
        assert_eq!(board[0].student_id, "S1");
        assert_eq!(board[0].total_score, i64::MAX);
        assert_eq!(board[0].platform_scores["LeetCode"], i64::MAX);
        assert_eq!(board[1].total_score, 10);

        let top = top_students(&students, &achievements, &SimpleMetric::Score, 5);
        assert_eq!(top[0].total, i64::MAX);
    }
}

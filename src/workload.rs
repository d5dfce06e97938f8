use crate::data::{
    Department, OverloadedTeacher, Recommendations, Subject, SubjectSummary, Teacher,
    TimetableEntry,
};
use itertools::Itertools;
use std::collections::HashMap;

/// Summarizes teacher loads over `entries` against `max_recommended_load`.
///
/// `teachers` is the catalog the loads are measured against; its size is
/// the current headcount.
pub fn analyze(
    entries: &[TimetableEntry],
    teachers: &[Teacher],
    max_recommended_load: u32,
) -> Recommendations {
    let load: HashMap<&str, usize> = entries.iter().map(|e| e.teacher.id.as_str()).counts();
    let total = entries.len();
    let max_load = max_recommended_load.max(1);

    let overloaded_teachers = teachers
        .iter()
        .filter_map(|teacher| {
            let current_load = load.get(teacher.id.as_str()).copied().unwrap_or(0) as u32;
            (current_load > max_recommended_load).then(|| OverloadedTeacher {
                name: teacher.name.clone(),
                current_load,
                recommended: max_recommended_load,
            })
        })
        .collect();

    let current_teachers = teachers.len();
    let recommended_teachers = total.div_ceil(max_load as usize);
    let average_load_per_teacher = if current_teachers == 0 {
        0.0
    } else {
        (total as f64 / current_teachers as f64 * 10.0).round() / 10.0
    };

    Recommendations {
        current_teachers,
        recommended_teachers,
        average_load_per_teacher,
        max_recommended_load,
        need_more_teachers: recommended_teachers > current_teachers,
        overloaded_teachers,
    }
}

/// Share of the class's weekly slots that were filled, as a whole percent.
pub fn utilization_rate(placed: usize, days: usize, periods_per_day: usize) -> u32 {
    let capacity = days * periods_per_day;
    if capacity == 0 {
        return 0;
    }
    let rate = (placed * 100 + capacity / 2) / capacity;
    rate.min(100) as u32
}

/// Counts subjects per reporting department. `social_science` and
/// unlabelled subjects count as other.
pub fn summarize(subjects: &[Subject]) -> SubjectSummary {
    subjects
        .iter()
        .fold(SubjectSummary::default(), |mut summary, subject| {
            match subject.department {
                Some(Department::Core) => summary.core_subjects += 1,
                Some(Department::Science) => summary.science_subjects += 1,
                Some(Department::Arts) => summary.arts_subjects += 1,
                _ => summary.other_subjects += 1,
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Day, TeacherRef};

    fn teacher(id: &str) -> Teacher {
        Teacher {
            id: id.to_string(),
            name: format!("Teacher {}", id),
            department: None,
            subject_ids: Vec::new(),
        }
    }

    fn entries_for(teacher_id: &str, count: usize) -> Vec<TimetableEntry> {
        (0..count)
            .map(|i| TimetableEntry {
                id: format!("{}-{}", teacher_id, i),
                class_name: format!("SS{}", i % 3 + 1),
                day_of_week: Day::ALL[i % 5],
                period: (i / 5 + 1).to_string(),
                subject: "Mathematics".to_string(),
                teacher: TeacherRef {
                    id: teacher_id.to_string(),
                    name: format!("Teacher {}", teacher_id),
                },
            })
            .collect()
    }

    #[test]
    fn balanced_load_needs_no_extra_teachers() {
        let mut entries = entries_for("t1", 20);
        entries.extend(entries_for("t2", 20));
        let report = analyze(&entries, &[teacher("t1"), teacher("t2")], 20);
        assert_eq!(report.recommended_teachers, 2);
        assert!(!report.need_more_teachers);
        assert!(report.overloaded_teachers.is_empty());
        assert_eq!(report.average_load_per_teacher, 20.0);
    }

    #[test]
    fn single_teacher_carrying_everything_is_flagged() {
        let entries = entries_for("t1", 40);
        let report = analyze(&entries, &[teacher("t1")], 20);
        assert!(report.need_more_teachers);
        assert_eq!(
            report.overloaded_teachers,
            vec![OverloadedTeacher {
                name: "Teacher t1".to_string(),
                current_load: 40,
                recommended: 20,
            }]
        );
    }

    #[test]
    fn empty_catalog_averages_zero() {
        let report = analyze(&entries_for("ghost", 3), &[], 25);
        assert_eq!(report.average_load_per_teacher, 0.0);
        assert_eq!(report.recommended_teachers, 1);
        assert!(report.need_more_teachers);
    }

    #[test]
    fn utilization_stays_within_bounds() {
        assert_eq!(utilization_rate(0, 5, 8), 0);
        assert_eq!(utilization_rate(20, 5, 8), 50);
        assert_eq!(utilization_rate(33, 5, 8), 83);
        assert_eq!(utilization_rate(40, 5, 8), 100);
        assert_eq!(utilization_rate(55, 5, 8), 100);
        assert_eq!(utilization_rate(3, 0, 8), 0);
    }

    #[test]
    fn summary_groups_by_department() {
        let subject = |department: Option<Department>| Subject {
            id: "s".to_string(),
            name: "S".to_string(),
            code: None,
            classes: Vec::new(),
            periods_per_week: 1,
            department,
        };
        let summary = summarize(&[
            subject(Some(Department::Core)),
            subject(Some(Department::Core)),
            subject(Some(Department::Science)),
            subject(Some(Department::Arts)),
            subject(Some(Department::SocialScience)),
            subject(None),
        ]);
        assert_eq!(
            summary,
            SubjectSummary {
                core_subjects: 2,
                science_subjects: 1,
                arts_subjects: 1,
                other_subjects: 2,
            }
        );
    }
}

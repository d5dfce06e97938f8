use crate::data::{Day, Shortfall, Subject, Teacher, TeacherId, TimetableEntry};
use crate::grid::SlotGrid;
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Entries produced for one class plus the subjects that did not fit.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub entries: Vec<TimetableEntry>,
    pub shortfalls: Vec<Shortfall>,
}

/// Greedy single-pass timetable fill for `class_name`.
///
/// `booked` holds entries already standing for other classes; a teacher
/// busy in one of them is never placed in the same `(day, period)`.
/// Subjects with more weekly periods go first. Each subject gets the
/// least-loaded teacher able to teach it and is spread one instance per
/// day before any day receives a second one. Subjects that cannot get all
/// their periods are reported in `shortfalls`; that is not an error.
pub fn generate(
    class_name: &str,
    subjects: &[Subject],
    teachers: &[Teacher],
    grid: &SlotGrid<'_>,
    booked: &[TimetableEntry],
) -> Placement {
    let start_time = Instant::now();
    let periods = grid.schedulable_periods();

    // lookups
    let mut teacher_busy: HashSet<(Day, &str, TeacherId)> = booked
        .iter()
        .map(|e| (e.day_of_week, e.period.as_str(), e.teacher.id.clone()))
        .collect();
    let mut class_busy: HashSet<(Day, &str)> = booked
        .iter()
        .filter(|e| e.class_name.eq_ignore_ascii_case(class_name))
        .map(|e| (e.day_of_week, e.period.as_str()))
        .collect();
    let mut load: HashMap<TeacherId, u32> = booked
        .iter()
        .map(|e| e.teacher.id.clone())
        .counts()
        .into_iter()
        .map(|(id, count)| (id, count as u32))
        .collect();

    info!(
        "Generating timetable for {} with {} subjects, {} teachers, {} days x {} periods...",
        class_name,
        subjects.len(),
        teachers.len(),
        grid.days.len(),
        periods.len()
    );

    let mut placement = Placement::default();

    let ordered = subjects
        .iter()
        .filter(|s| s.periods_per_week > 0)
        .sorted_by(|a, b| {
            b.periods_per_week
                .cmp(&a.periods_per_week)
                .then_with(|| a.name.cmp(&b.name))
        });

    for subject in ordered {
        let required = subject.periods_per_week;

        let Some(teacher) = teachers
            .iter()
            .filter(|t| t.teaches(&subject.id))
            .min_by(|a, b| {
                let load_a = load.get(&a.id).copied().unwrap_or(0);
                let load_b = load.get(&b.id).copied().unwrap_or(0);
                load_a.cmp(&load_b).then_with(|| a.id.cmp(&b.id))
            })
        else {
            warn!("No teacher can take {} for {}", subject.name, class_name);
            placement.shortfalls.push(Shortfall {
                subject: subject.name.clone(),
                required,
                placed: 0,
                reason: "no teacher is assigned to this subject".to_string(),
            });
            continue;
        };

        let mut placed = 0u32;
        let mut per_day: HashMap<Day, u32> = HashMap::new();

        // a round gives each day at most one more instance; a day can never
        // hold more instances than it has periods
        'rounds: for round in 0..periods.len() as u32 {
            let mut placed_this_round = false;
            for day in grid.days {
                if placed == required {
                    break 'rounds;
                }
                if per_day.get(day).copied().unwrap_or(0) > round {
                    continue;
                }
                let free = periods.iter().find(|period| {
                    !class_busy.contains(&(*day, **period))
                        && !teacher_busy.contains(&(*day, **period, teacher.id.clone()))
                });
                let Some(period) = free else {
                    continue;
                };

                trace!(
                    "{} {} period {}: {} with {}",
                    class_name, day, period, subject.name, teacher.name
                );
                class_busy.insert((*day, *period));
                teacher_busy.insert((*day, *period, teacher.id.clone()));
                *per_day.entry(*day).or_insert(0) += 1;
                placed += 1;
                placed_this_round = true;

                placement.entries.push(TimetableEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    class_name: class_name.to_string(),
                    day_of_week: *day,
                    period: period.to_string(),
                    subject: subject.name.clone(),
                    teacher: teacher.to_ref(),
                });
            }
            if !placed_this_round {
                break;
            }
        }

        *load.entry(teacher.id.clone()).or_insert(0) += placed;
        debug!(
            "{}: placed {}/{} periods of {} with {}",
            class_name, placed, required, subject.name, teacher.name
        );

        if placed < required {
            warn!(
                "{} is under-scheduled for {} ({}/{})",
                subject.name, class_name, placed, required
            );
            placement.shortfalls.push(Shortfall {
                subject: subject.name.clone(),
                required,
                placed,
                reason: format!(
                    "no free slot left where both {} and {} are available",
                    class_name, teacher.name
                ),
            });
        }
    }

    info!(
        "Placed {} periods for {} in {:.2?} ({} shortfalls)",
        placement.entries.len(),
        class_name,
        start_time.elapsed(),
        placement.shortfalls.len()
    );
    placement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PeriodTime, TeacherRef};
    use chrono::NaiveTime;
    use crate::grid::default_periods;
    use std::collections::BTreeMap;

    fn subject(id: &str, periods: u32) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_uppercase(),
            code: None,
            classes: Vec::new(),
            periods_per_week: periods,
            department: None,
        }
    }

    fn teacher(id: &str, subjects: &[&str]) -> Teacher {
        Teacher {
            id: id.to_string(),
            name: format!("Teacher {}", id),
            department: None,
            subject_ids: subjects.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn assert_no_double_booking(entries: &[TimetableEntry]) {
        let duplicates = entries
            .iter()
            .map(|e| (e.day_of_week, e.period.clone(), e.teacher.id.clone()))
            .duplicates()
            .count();
        assert_eq!(duplicates, 0, "a teacher is booked twice in one slot");
    }

    #[test]
    fn fills_every_subject_when_room_exists() {
        let periods = default_periods();
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        let subjects = vec![subject("math", 5), subject("eng", 5), subject("bio", 3)];
        let teachers = vec![teacher("t1", &["math", "bio"]), teacher("t2", &["eng"])];

        let placement = generate("SS1 gold", &subjects, &teachers, &grid, &[]);

        assert!(placement.shortfalls.is_empty());
        let counts = placement.entries.iter().map(|e| e.subject.as_str()).counts();
        assert_eq!(counts["MATH"], 5);
        assert_eq!(counts["ENG"], 5);
        assert_eq!(counts["BIO"], 3);
        assert_no_double_booking(&placement.entries);
    }

    #[test]
    fn spreads_instances_across_distinct_days() {
        let periods = default_periods();
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        let placement = generate(
            "JS2",
            &[subject("math", 4)],
            &[teacher("t1", &["math"])],
            &grid,
            &[],
        );
        let days_used: HashSet<Day> = placement.entries.iter().map(|e| e.day_of_week).collect();
        assert_eq!(days_used.len(), 4);
    }

    #[test]
    fn more_periods_than_days_opens_a_second_round() {
        let periods = default_periods();
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        let placement = generate(
            "JS2",
            &[subject("math", 7)],
            &[teacher("t1", &["math"])],
            &grid,
            &[],
        );
        assert_eq!(placement.entries.len(), 7);
        let per_day = placement.entries.iter().map(|e| e.day_of_week).counts();
        assert!(per_day.values().all(|count| *count <= 2));
    }

    #[test]
    fn teacher_busy_elsewhere_is_not_double_booked() {
        let mut periods = BTreeMap::new();
        periods.insert(
            "1".to_string(),
            PeriodTime {
                start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(8, 40, 0).unwrap(),
            },
        );
        let days = vec![Day::Monday, Day::Tuesday];
        let grid = SlotGrid::new(&days, &periods);
        let booked = vec![TimetableEntry {
            id: "x".to_string(),
            class_name: "JS1".to_string(),
            day_of_week: Day::Monday,
            period: "1".to_string(),
            subject: "MATH".to_string(),
            teacher: TeacherRef {
                id: "t1".to_string(),
                name: "Teacher t1".to_string(),
            },
        }];

        let placement = generate(
            "JS2",
            &[subject("math", 2)],
            &[teacher("t1", &["math"])],
            &grid,
            &booked,
        );

        assert_eq!(placement.entries.len(), 1);
        assert_eq!(placement.entries[0].day_of_week, Day::Tuesday);
        assert_eq!(placement.shortfalls.len(), 1);
        assert_eq!(placement.shortfalls[0].placed, 1);
        let mut all = booked.clone();
        all.extend(placement.entries);
        assert_no_double_booking(&all);
    }

    #[test]
    fn least_loaded_teacher_is_chosen() {
        let periods = default_periods();
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        let subjects = vec![subject("math", 5), subject("further", 4)];
        let teachers = vec![
            teacher("t1", &["math", "further"]),
            teacher("t2", &["math", "further"]),
        ];
        let placement = generate("SS3", &subjects, &teachers, &grid, &[]);
        let by_teacher = placement.entries.iter().map(|e| e.teacher.id.as_str()).counts();
        assert_eq!(by_teacher["t1"], 5);
        assert_eq!(by_teacher["t2"], 4);
    }

    #[test]
    fn subject_without_teacher_is_reported() {
        let periods = default_periods();
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        let placement = generate("JS3", &[subject("latin", 2)], &[], &grid, &[]);
        assert!(placement.entries.is_empty());
        assert_eq!(placement.shortfalls[0].required, 2);
        assert_eq!(placement.shortfalls[0].placed, 0);
    }

    #[test]
    fn class_slots_are_never_shared() {
        let periods = default_periods();
        let days = vec![Day::Monday];
        let grid = SlotGrid::new(&days, &periods);
        let subjects: Vec<Subject> = (0..10).map(|i| subject(&format!("s{}", i), 1)).collect();
        let teachers: Vec<Teacher> = (0..10)
            .map(|i| teacher(&format!("t{}", i), &[format!("s{}", i).as_str()]))
            .collect();
        let placement = generate("SS2", &subjects, &teachers, &grid, &[]);
        assert_eq!(placement.entries.len(), 8);
        assert_eq!(placement.shortfalls.len(), 2);
        let slots = placement.entries.iter().map(|e| e.period.clone()).unique().count();
        assert_eq!(slots, 8);
    }

    #[test]
    fn class_slots_match_regardless_of_case() {
        let periods = default_periods();
        let days = vec![Day::Monday];
        let grid = SlotGrid::new(&days, &periods);
        let booked: Vec<TimetableEntry> = ["1", "2", "3", "4", "5", "6", "7"]
            .iter()
            .map(|period| TimetableEntry {
                id: format!("b{}", period),
                class_name: "ss2 gold".to_string(),
                day_of_week: Day::Monday,
                period: period.to_string(),
                subject: "History".to_string(),
                teacher: TeacherRef {
                    id: "t9".to_string(),
                    name: "Teacher t9".to_string(),
                },
            })
            .collect();

        let placement = generate(
            "SS2 gold",
            &[subject("math", 3)],
            &[teacher("t1", &["math"])],
            &grid,
            &booked,
        );
        assert_eq!(placement.entries.len(), 1);
        assert_eq!(placement.entries[0].period, "8");
        assert_eq!(placement.shortfalls.len(), 1);
    }
}

use crate::data::{Day, GridCell, GridRow, PeriodKey, PeriodTime, TimetableEntry, clock};
use crate::error::AppError;
use chrono::NaiveTime;
use std::collections::BTreeMap;

/// Period keys that live in the period map but are never scheduled.
pub const RESERVED_PERIODS: [&str; 2] = ["BREAK", "LUNCH"];

pub fn is_reserved(period: &str) -> bool {
    RESERVED_PERIODS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(period.trim()))
}

/// Eight teaching periods from 08:00, with a break after the third and
/// lunch after the sixth.
pub fn default_periods() -> BTreeMap<PeriodKey, PeriodTime> {
    [
        ("1", (8, 0), (8, 40)),
        ("2", (8, 40), (9, 20)),
        ("3", (9, 20), (10, 0)),
        ("BREAK", (10, 0), (10, 20)),
        ("4", (10, 20), (11, 0)),
        ("5", (11, 0), (11, 40)),
        ("6", (11, 40), (12, 20)),
        ("LUNCH", (12, 20), (13, 0)),
        ("7", (13, 0), (13, 40)),
        ("8", (13, 40), (14, 20)),
    ]
    .into_iter()
    .filter_map(|(key, (start_h, start_m), (end_h, end_m))| {
        let start = NaiveTime::from_hms_opt(start_h, start_m, 0)?;
        let end = NaiveTime::from_hms_opt(end_h, end_m, 0)?;
        Some((key.to_string(), PeriodTime { start, end }))
    })
    .collect()
}

/// The week's days and the period definitions, borrowed from the school data.
#[derive(Debug, Clone, Copy)]
pub struct SlotGrid<'a> {
    pub days: &'a [Day],
    pub periods: &'a BTreeMap<PeriodKey, PeriodTime>,
}

impl<'a> SlotGrid<'a> {
    pub fn new(days: &'a [Day], periods: &'a BTreeMap<PeriodKey, PeriodTime>) -> Self {
        SlotGrid { days, periods }
    }

    /// Teaching periods in ascending numeric order. Keys that are not numbers
    /// sort after the numbered ones.
    pub fn schedulable_periods(&self) -> Vec<&'a str> {
        let mut keys: Vec<&'a str> = self
            .periods
            .keys()
            .map(String::as_str)
            .filter(|key| !is_reserved(key))
            .collect();
        keys.sort_by(|a, b| period_order(a).cmp(&period_order(b)));
        keys
    }

    pub fn is_schedulable(&self, period: &str) -> bool {
        !is_reserved(period) && self.periods.contains_key(period)
    }

    pub fn weekly_slots(&self) -> usize {
        self.days.len() * self.schedulable_periods().len()
    }

    /// Lays entries out day by day, period by period. Entries on days or
    /// periods outside the grid are left out.
    pub fn cells(&self, entries: &[TimetableEntry]) -> Vec<GridRow> {
        let periods = self.schedulable_periods();
        self.days
            .iter()
            .map(|day| GridRow {
                day_of_week: *day,
                cells: periods
                    .iter()
                    .map(|period| GridCell {
                        period: period.to_string(),
                        entries: entries
                            .iter()
                            .filter(|entry| entry.occupies(*day, period))
                            .cloned()
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

pub(crate) fn period_order(key: &str) -> (u8, u32, &str) {
    match key.trim().parse::<u32>() {
        Ok(number) => (0, number, key),
        Err(_) => (1, 0, key),
    }
}

/// Validates a new teaching period against the existing definitions and
/// returns the key and times to store.
pub fn new_period(
    periods: &BTreeMap<PeriodKey, PeriodTime>,
    number: &str,
    start: &str,
    end: &str,
) -> Result<(PeriodKey, PeriodTime), AppError> {
    let number = number.trim();
    if number.is_empty() {
        return Err(AppError::Validation("period number is required".to_string()));
    }
    if is_reserved(number) {
        return Err(AppError::Validation(format!(
            "'{}' is a reserved period name",
            number
        )));
    }
    let time = PeriodTime {
        start: parse_time(start)?,
        end: parse_time(end)?,
    };
    if time.start >= time.end {
        return Err(AppError::Validation(format!(
            "period {} must start before it ends ({} - {})",
            number,
            start.trim(),
            end.trim()
        )));
    }
    if periods.contains_key(number) {
        return Err(AppError::conflict(format!("period {} already exists", number)));
    }
    Ok((number.to_string(), time))
}

fn parse_time(value: &str) -> Result<NaiveTime, AppError> {
    clock::parse(value)
        .map_err(|e| AppError::Validation(format!("'{}' is not a valid HH:MM time: {}", value.trim(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TeacherRef;

    #[test]
    fn schedulable_periods_skip_break_and_lunch() {
        let periods = default_periods();
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        assert_eq!(
            grid.schedulable_periods(),
            vec!["1", "2", "3", "4", "5", "6", "7", "8"]
        );
        assert_eq!(grid.weekly_slots(), 40);
        assert!(!grid.is_schedulable("LUNCH"));
    }

    #[test]
    fn periods_sort_numerically_not_lexically() {
        let mut periods = default_periods();
        let (key, time) = new_period(&periods, "9", "14:20", "15:00").unwrap();
        periods.insert(key, time);
        let (key, time) = new_period(&periods, "10", "15:00", "15:40").unwrap();
        periods.insert(key, time);
        let days = Day::school_week();
        let grid = SlotGrid::new(&days, &periods);
        let order = grid.schedulable_periods();
        assert_eq!(order[order.len() - 2..], ["9", "10"]);
    }

    #[test]
    fn new_period_rejects_bad_input() {
        let periods = default_periods();
        assert!(matches!(
            new_period(&periods, "", "08:00", "09:00"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_period(&periods, "lunch", "08:00", "09:00"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_period(&periods, "9", "25:00", "26:00"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_period(&periods, "9", "8am", "09:00"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_period(&periods, "9", "15:00", "14:00"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            new_period(&periods, "3", "15:00", "16:00"),
            Err(AppError::Conflict { .. })
        ));
    }

    #[test]
    fn new_period_compares_times_not_text() {
        let periods = default_periods();
        let (key, time) = new_period(&periods, " 9 ", " 14:20", "15:05 ").unwrap();
        assert_eq!(key, "9");
        assert_eq!(time.start, NaiveTime::from_hms_opt(14, 20, 0).unwrap());
        assert_eq!(time.end, NaiveTime::from_hms_opt(15, 5, 0).unwrap());
        assert_eq!(periods["LUNCH"].start, NaiveTime::from_hms_opt(12, 20, 0).unwrap());
    }

    #[test]
    fn cells_place_entries_by_day_and_period() {
        let periods = default_periods();
        let days = vec![Day::Monday, Day::Tuesday];
        let grid = SlotGrid::new(&days, &periods);
        let entry = TimetableEntry {
            id: "e1".to_string(),
            class_name: "JS1".to_string(),
            day_of_week: Day::Tuesday,
            period: "2".to_string(),
            subject: "Mathematics".to_string(),
            teacher: TeacherRef {
                id: "t1".to_string(),
                name: "Ada".to_string(),
            },
        };
        let rows = grid.cells(&[entry]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].cells.iter().all(|cell| cell.entries.is_empty()));
        assert_eq!(rows[1].cells[1].entries.len(), 1);
    }
}

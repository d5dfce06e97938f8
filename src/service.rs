use crate::catalog::resolve_subjects;
use crate::data::{
    EntryPatch, GenerateRequest, GenerationResult, NewEntry, NewPeriod, PeriodKey, PeriodTime,
    Subject, TimetableEntry, TimetableQuery, TimetableStatistics, TimetableView, ViewMode,
};
use crate::error::AppError;
use crate::grid::{self, SlotGrid};
use crate::solver;
use crate::store::{SchoolTx, TimetableStore};
use crate::workload;
use itertools::Itertools;
use log::info;
use std::collections::BTreeMap;

/// The timetable operations exposed over HTTP.
#[derive(Debug)]
pub struct TimetableService {
    store: TimetableStore,
    max_recommended_load: u32,
}

impl TimetableService {
    pub fn new(store: TimetableStore, max_recommended_load: u32) -> Self {
        TimetableService {
            store,
            max_recommended_load,
        }
    }

    /// Builds a fresh timetable for one class.
    ///
    /// Fails with a conflict if the class already has entries and
    /// `overwrite` is not set. Class names are matched without regard to
    /// case. The existence check, the removal of old entries and the write
    /// of the new ones happen in one transaction.
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, AppError> {
        if request.class_name.trim().is_empty() {
            return Err(AppError::Validation("className is required".to_string()));
        }
        let max_load = self.max_recommended_load;

        self.store.transaction(|tx| {
            let class_name = tx.canonical_class(&request.class_name)?;
            let subjects = resolve_subjects(&class_name, &tx.subjects()?);
            if subjects.is_empty() {
                return Err(AppError::Validation(format!(
                    "no subjects are configured for class {}",
                    class_name
                )));
            }

            let existing = tx.class_entry_count(&class_name)?;
            if existing > 0 {
                if !request.overwrite {
                    return Err(AppError::Conflict {
                        message: format!(
                            "a timetable already exists for {} ({} entries)",
                            class_name, existing
                        ),
                        recommendation: Some(
                            "Set overwrite to true to replace the existing timetable".to_string(),
                        ),
                    });
                }
                let removed = tx.delete_class_entries(&class_name)?;
                info!("Removed {} existing entries for {}", removed, class_name);
            }

            let days = tx.days()?;
            let periods = tx.periods()?;
            let teachers = tx.teachers()?;
            let mut entries = tx.entries()?;

            let grid = SlotGrid::new(&days, &periods);
            let placement = solver::generate(&class_name, &subjects, &teachers, &grid, &entries);
            let utilization_rate = workload::utilization_rate(
                placement.entries.len(),
                grid.days.len(),
                grid.schedulable_periods().len(),
            );

            let total_periods = placement.entries.len();
            let subjects_included = placement.entries.iter().map(|e| &e.subject).unique().count();
            let teachers_involved = placement
                .entries
                .iter()
                .map(|e| &e.teacher.id)
                .unique()
                .count();

            for entry in &placement.entries {
                tx.insert_entry(entry)?;
            }
            entries.extend(placement.entries);
            let recommendations = workload::analyze(&entries, &teachers, max_load);

            Ok(GenerationResult {
                total_periods,
                subjects_included,
                teachers_involved,
                utilization_rate,
                summary: workload::summarize(&subjects),
                recommendations,
                shortfalls: placement.shortfalls,
            })
        })
    }

    pub fn query(&self, query: &TimetableQuery) -> Result<TimetableView, AppError> {
        let class = non_empty(query.class.as_deref());
        let teacher = non_empty(query.teacher.as_deref());

        self.store.read(|tx| {
            let days = tx.days()?;
            let periods = tx.periods()?;
            let timetable: Vec<TimetableEntry> = tx
                .entries()?
                .into_iter()
                .filter(|e| class.is_none_or(|c| e.class_name.eq_ignore_ascii_case(c)))
                .filter(|e| query.day.is_none_or(|d| e.day_of_week == d))
                .filter(|e| teacher.is_none_or(|t| e.teacher.id == t))
                .sorted_by(|a, b| {
                    a.day_of_week
                        .cmp(&b.day_of_week)
                        .then_with(|| grid::period_order(&a.period).cmp(&grid::period_order(&b.period)))
                        .then_with(|| a.class_name.cmp(&b.class_name))
                })
                .collect();

            let statistics = TimetableStatistics {
                total_entries: timetable.len(),
                classes_scheduled: timetable
                    .iter()
                    .map(|e| e.class_name.to_lowercase())
                    .unique()
                    .count(),
                teachers_scheduled: timetable.iter().map(|e| &e.teacher.id).unique().count(),
                subjects_scheduled: timetable.iter().map(|e| &e.subject).unique().count(),
            };
            let layout = match query.view {
                ViewMode::Grid => Some(SlotGrid::new(&days, &periods).cells(&timetable)),
                ViewMode::List => None,
            };

            Ok(TimetableView {
                grid: layout,
                available_classes: tx.classes()?,
                available_teachers: tx.teachers()?.iter().map(|t| t.to_ref()).collect(),
                subjects: resolve_subjects(class.unwrap_or(""), &tx.subjects()?),
                periods,
                days_of_week: days,
                statistics,
                timetable,
            })
        })
    }

    pub fn create_entry(&self, new_entry: &NewEntry) -> Result<TimetableEntry, AppError> {
        self.store.transaction(|tx| {
            let entry = build_entry(tx, uuid::Uuid::new_v4().to_string(), new_entry)?;
            tx.insert_entry(&entry)?;
            info!(
                "Added {} for {} on {} period {}",
                entry.subject, entry.class_name, entry.day_of_week, entry.period
            );
            Ok(entry)
        })
    }

    /// Applies `patch` to an entry, re-running the same checks as a create.
    pub fn update_entry(&self, id: &str, patch: &EntryPatch) -> Result<TimetableEntry, AppError> {
        self.store.transaction(|tx| {
            let current = tx
                .entry(id)?
                .ok_or_else(|| AppError::NotFound(format!("timetable entry {}", id)))?;
            let merged = NewEntry {
                class_name: patch.class_name.clone().unwrap_or(current.class_name),
                day_of_week: patch.day_of_week.unwrap_or(current.day_of_week),
                period: patch.period.clone().unwrap_or(current.period),
                subject: patch.subject.clone().unwrap_or(current.subject),
                teacher_id: patch.teacher_id.clone().unwrap_or(current.teacher.id),
            };
            let entry = build_entry(tx, id.to_string(), &merged)?;
            tx.replace_entry(&entry)?;
            Ok(entry)
        })
    }

    pub fn delete_entry(&self, id: &str) -> Result<TimetableEntry, AppError> {
        self.store.transaction(|tx| {
            tx.delete_entry(id)?
                .ok_or_else(|| AppError::NotFound(format!("timetable entry {}", id)))
        })
    }

    pub fn subjects(&self, class: Option<&str>) -> Result<Vec<Subject>, AppError> {
        let class = non_empty(class).unwrap_or("");
        self.store.read(|tx| Ok(resolve_subjects(class, &tx.subjects()?)))
    }

    /// Every class known to the school: the configured catalog plus any
    /// class that already has timetable entries.
    pub fn classes(&self) -> Result<Vec<String>, AppError> {
        self.store.read(|tx| tx.classes())
    }

    pub fn periods(&self) -> Result<BTreeMap<PeriodKey, PeriodTime>, AppError> {
        self.store.read(|tx| tx.periods())
    }

    pub fn add_period(&self, period: &NewPeriod) -> Result<BTreeMap<PeriodKey, PeriodTime>, AppError> {
        self.store.transaction(|tx| {
            let mut periods = tx.periods()?;
            let (key, time) = grid::new_period(&periods, &period.period_number, &period.start, &period.end)?;
            tx.insert_period(&key, &time)?;
            info!("Added period {}", key);
            periods.insert(key, time);
            Ok(periods)
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validates `input` against the catalog and the standing entries (except
/// `id` itself) and turns it into an entry.
fn build_entry(tx: &SchoolTx<'_>, id: String, input: &NewEntry) -> Result<TimetableEntry, AppError> {
    if input.class_name.trim().is_empty() {
        return Err(AppError::Validation("className is required".to_string()));
    }
    let class_name = tx.canonical_class(&input.class_name)?;
    let days = tx.days()?;
    if !days.contains(&input.day_of_week) {
        return Err(AppError::Validation(format!(
            "{} is not a school day",
            input.day_of_week
        )));
    }
    let period = input.period.trim();
    let periods = tx.periods()?;
    if !SlotGrid::new(&days, &periods).is_schedulable(period) {
        return Err(AppError::Validation(format!(
            "period '{}' is not a teaching period",
            period
        )));
    }
    let subject = tx
        .subjects()?
        .into_iter()
        .find(|s| s.id == input.subject || s.name.eq_ignore_ascii_case(input.subject.trim()))
        .ok_or_else(|| AppError::Validation(format!("unknown subject '{}'", input.subject)))?;
    let teacher = tx
        .teachers()?
        .into_iter()
        .find(|t| t.id == input.teacher_id)
        .ok_or_else(|| AppError::Validation(format!("unknown teacher '{}'", input.teacher_id)))?;

    if let Some(clash) = tx.teacher_clash(input.day_of_week, period, &teacher.id, &id)? {
        return Err(AppError::Conflict {
            message: format!(
                "{} already teaches {} on {} period {}",
                teacher.name, clash.class_name, clash.day_of_week, clash.period
            ),
            recommendation: Some("Choose another period or teacher".to_string()),
        });
    }

    Ok(TimetableEntry {
        id,
        class_name,
        day_of_week: input.day_of_week,
        period: period.to_string(),
        subject: subject.name,
        teacher: teacher.to_ref(),
    })
}

use crate::data::Subject;
use itertools::Itertools;

const STAGES: [&str; 2] = ["JS", "SS"];

/// Splits a class name such as `"SS2 gold"` into its stage (`"SS"`) and
/// stage-level (`"SS2"`). Names that do not start with a known stage and a
/// year 1-3 fall back to their first three characters for the stage-level.
pub fn stage_keys(class_name: &str) -> (String, String) {
    let normalized = class_name.trim().to_ascii_uppercase();
    let stage: String = normalized.chars().take(2).collect();

    let year = normalized.chars().nth(2);
    let level = match year {
        Some(digit @ '1'..='3') if STAGES.contains(&stage.as_str()) => format!("{}{}", stage, digit),
        _ => normalized.chars().take(3).collect(),
    };

    (stage, level)
}

/// Filters the catalog down to the subjects taught to `class_name`.
///
/// Subjects tied to the exact class or its stage-level come first, the rest
/// after; both groups are ordered by name. An empty class name returns the
/// catalog untouched.
pub fn resolve_subjects(class_name: &str, subjects: &[Subject]) -> Vec<Subject> {
    let class_key = class_name.trim().to_ascii_uppercase();
    if class_key.is_empty() {
        return subjects.to_vec();
    }
    let (stage, level) = stage_keys(&class_key);

    let (specific, general): (Vec<&Subject>, Vec<&Subject>) = subjects
        .iter()
        .filter(|subject| applies_to(subject, &class_key, &stage, &level))
        .partition(|subject| {
            normalized_classes(subject).any(|entry| entry == class_key || entry == level)
        });

    specific
        .into_iter()
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .chain(general.into_iter().sorted_by(|a, b| a.name.cmp(&b.name)))
        .cloned()
        .collect()
}

fn applies_to(subject: &Subject, class_key: &str, stage: &str, level: &str) -> bool {
    if subject.classes.is_empty() {
        return true;
    }
    normalized_classes(subject).any(|entry| {
        entry == class_key || entry == level || entry == stage || stage.starts_with(entry.as_str())
    })
}

fn normalized_classes(subject: &Subject) -> impl Iterator<Item = String> + '_ {
    subject
        .classes
        .iter()
        .map(|entry| entry.trim().to_ascii_uppercase())
        .filter(|entry| !entry.is_empty())
}

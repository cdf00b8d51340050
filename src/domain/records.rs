//! Student answer and evaluation records, plus the reference answer table.
//!
//! These are the persisted artifact formats handed between the recognition
//! and scoring stages and accumulated into the running collection. Field
//! names are part of the stable JSON contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Feedback marker recorded for a question with no reference entry.
pub const NO_REFERENCE_FEEDBACK: &str = "No reference answer found";

/// Identity of the student a scan belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    /// Student name, if recognized; may be empty.
    #[serde(default)]
    pub name: String,
    /// Roll number or other submission identifier.
    #[serde(default)]
    pub roll_no: String,
}

impl StudentInfo {
    /// Creates student info carrying just a submission identifier.
    pub fn from_roll_no(roll_no: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            roll_no: roll_no.into(),
        }
    }
}

/// One reference answer with its point value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAnswer {
    /// The model answer text.
    pub answer: String,
    /// Maximum marks awardable for the question.
    pub marks: f64,
}

/// Mapping from question label to reference answer and point value.
///
/// Read-only within a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTable {
    entries: BTreeMap<String, ReferenceAnswer>,
}

impl ReferenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a reference answer for a question label.
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        answer: impl Into<String>,
        marks: f64,
    ) -> &mut Self {
        self.entries.insert(
            label.into(),
            ReferenceAnswer {
                answer: answer.into(),
                marks,
            },
        );
        self
    }

    /// Looks up the reference entry for a question label.
    pub fn get(&self, label: &str) -> Option<&ReferenceAnswer> {
        self.entries.get(label)
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the labels in `answered` that have no reference entry,
    /// sorted and deduplicated.
    pub fn uncovered_labels<'a, I>(&self, answered: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        use itertools::Itertools;
        answered
            .into_iter()
            .filter(|label| !self.entries.contains_key(*label))
            .map(str::to_owned)
            .unique()
            .sorted()
            .collect()
    }
}

/// Recognition output for one scan: who submitted it and what they wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentAnswerRecord {
    /// The submitting student.
    pub student_info: StudentInfo,
    /// Recognized answer text per question label.
    pub answers: BTreeMap<String, String>,
}

impl StudentAnswerRecord {
    /// Creates a record for the given student.
    pub fn new(student_info: StudentInfo, answers: BTreeMap<String, String>) -> Self {
        Self {
            student_info,
            answers,
        }
    }
}

/// Scoring outcome for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    /// The student's recognized answer text.
    pub answer: String,
    /// Marks awarded, in `[0, max_marks]`.
    pub awarded_marks: f64,
    /// Maximum marks for the question (0 when no reference exists).
    pub max_marks: f64,
    /// Grader feedback, or an error/no-reference marker.
    pub feedback: String,
}

/// Scored record for one student submission.
///
/// The totals always equal the sums of the per-question entries; the only
/// mutation paths are [`EvaluationRecord::insert_question`] and
/// [`EvaluationRecord::insert_unreferenced`], which maintain that
/// invariant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// The submitting student.
    pub student_info: StudentInfo,
    /// Sum of awarded marks across all questions.
    pub total_awarded_marks: f64,
    /// Sum of maximum marks across all questions.
    pub total_possible_marks: f64,
    /// Per-question scoring outcomes.
    pub answers: BTreeMap<String, QuestionScore>,
}

impl EvaluationRecord {
    /// Creates an empty record for the given student.
    pub fn new(student_info: StudentInfo) -> Self {
        Self {
            student_info,
            ..Self::default()
        }
    }

    /// Records a scored question and folds it into the totals.
    pub fn insert_question(
        &mut self,
        label: impl Into<String>,
        answer: impl Into<String>,
        awarded_marks: f64,
        max_marks: f64,
        feedback: impl Into<String>,
    ) {
        self.total_awarded_marks += awarded_marks;
        self.total_possible_marks += max_marks;
        self.answers.insert(
            label.into(),
            QuestionScore {
                answer: answer.into(),
                awarded_marks,
                max_marks,
                feedback: feedback.into(),
            },
        );
    }

    /// Records a question that has no reference entry.
    ///
    /// Contributes zero to both totals but still appears in the record
    /// with the no-reference marker.
    pub fn insert_unreferenced(&mut self, label: impl Into<String>, answer: impl Into<String>) {
        self.insert_question(label, answer, 0.0, 0.0, NO_REFERENCE_FEEDBACK);
    }

    /// Verifies the totals against the per-question entries.
    pub fn totals_consistent(&self) -> bool {
        let awarded: f64 = self.answers.values().map(|q| q.awarded_marks).sum();
        let possible: f64 = self.answers.values().map(|q| q.max_marks).sum();
        (awarded - self.total_awarded_marks).abs() < 1e-9
            && (possible - self.total_possible_marks).abs() < 1e-9
    }
}

/// The append-only collection of finalized evaluation records.
///
/// Later batches append; they never truncate or reorder earlier entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunningCollection {
    /// Finalized student records in completion order.
    pub students: Vec<EvaluationRecord>,
}

impl RunningCollection {
    /// Appends a finalized record.
    pub fn append(&mut self, record: EvaluationRecord) {
        self.students.push(record);
    }

    /// Number of finalized records.
    pub fn len(&self) -> usize {
        self.students.len()
    }

    /// Returns true if no records have been finalized yet.
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_track_insertions() {
        let mut record = EvaluationRecord::new(StudentInfo::from_roll_no("r-17"));
        record.insert_question("Q1", "b", 2.0, 2.0, "correct");
        record.insert_question("Q2", "a", 0.5, 3.0, "partially correct");
        record.insert_question("Q3", "", 0.0, 1.0, "blank answer");

        assert_eq!(record.total_awarded_marks, 2.5);
        assert_eq!(record.total_possible_marks, 6.0);
        assert!(record.totals_consistent());
    }

    #[test]
    fn unreferenced_question_contributes_zero_but_is_recorded() {
        let mut record = EvaluationRecord::new(StudentInfo::default());
        record.insert_question("Q1", "b", 2.0, 2.0, "correct");
        record.insert_unreferenced("Q9", "stray");

        assert_eq!(record.total_awarded_marks, 2.0);
        assert_eq!(record.total_possible_marks, 2.0);
        let q9 = &record.answers["Q9"];
        assert_eq!(q9.awarded_marks, 0.0);
        assert_eq!(q9.max_marks, 0.0);
        assert_eq!(q9.feedback, NO_REFERENCE_FEEDBACK);
        assert!(record.totals_consistent());
    }

    #[test]
    fn uncovered_labels_are_sorted_and_unique() {
        let mut table = ReferenceTable::new();
        table.insert("Q1", "b", 2.0);

        let uncovered = table.uncovered_labels(["Q2", "Q1", "Q4", "Q2"]);
        assert_eq!(uncovered, vec!["Q2", "Q4"]);
    }

    #[test]
    fn evaluation_record_json_shape() {
        let mut record = EvaluationRecord::new(StudentInfo {
            name: "A. Student".to_string(),
            roll_no: "42".to_string(),
        });
        record.insert_question("Q1", "b", 2.0, 2.0, "correct");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["student_info"]["roll_no"], "42");
        assert_eq!(json["total_awarded_marks"], 2.0);
        assert_eq!(json["answers"]["Q1"]["max_marks"], 2.0);
    }

    #[test]
    fn reference_table_json_is_a_plain_map() {
        let mut table = ReferenceTable::new();
        table.insert("Q1", "b", 2.0);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["Q1"]["answer"], "b");
        assert_eq!(json["Q1"]["marks"], 2.0);
    }

    #[test]
    fn running_collection_appends_in_order() {
        let mut collection = RunningCollection::default();
        collection.append(EvaluationRecord::new(StudentInfo::from_roll_no("1")));
        collection.append(EvaluationRecord::new(StudentInfo::from_roll_no("2")));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.students[0].student_info.roll_no, "1");
        assert_eq!(collection.students[1].student_info.roll_no, "2");
    }
}

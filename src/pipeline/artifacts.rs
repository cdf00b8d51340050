//! Durable stage artifacts and the explicit stage-state record.
//!
//! Every stage persists its output as a named artifact before the
//! orchestrator advances: the aligned raster as PNG, recognition and
//! evaluation records as JSON, finalized records appended to the running
//! collection. File artifacts are the durability layer; the stage-state
//! record is the source of truth for orchestration decisions, so a
//! recorded-complete stage whose artifact has gone missing is simply
//! recomputed.
//!
//! The running collection is append-only. Its writes go through a
//! temp-file-and-rename with an fsync so a crash mid-batch never loses a
//! record that was already reported complete.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use image::GrayImage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{GradeError, GradeResult};
use crate::domain::{EvaluationRecord, ReferenceTable, RunningCollection, StudentAnswerRecord};
use crate::utils::{load_gray, save_gray};

const STAGE_STATE_FILE: &str = "stage_state.json";
const COLLECTION_FILE: &str = "evaluation_results.json";
const CSV_FILE: &str = "evaluation_results.csv";

/// Persisted registration summary for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentSummary {
    /// Template the scan registered against.
    pub template_id: String,
    /// Good-match count of the accepted alignment.
    pub confidence: usize,
    /// Scan→template homography, row-major.
    pub homography: [[f64; 3]; 3],
}

/// Stage progress for one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStageState {
    /// Set when the scan registered and its aligned raster was persisted.
    #[serde(default)]
    pub align: Option<AlignmentSummary>,
    /// Set when the recognition record was persisted.
    #[serde(default)]
    pub recognized: bool,
    /// Set when the evaluation record was persisted and appended to the
    /// running collection.
    #[serde(default)]
    pub scored: bool,
}

/// The batch's explicit stage-status record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageStateRecord {
    /// Per-scan progress keyed by scan id.
    #[serde(default)]
    pub scans: BTreeMap<String, ScanStageState>,
}

impl StageStateRecord {
    /// Progress entry for a scan, defaulting to untouched.
    pub fn scan(&self, scan_id: &str) -> ScanStageState {
        self.scans.get(scan_id).cloned().unwrap_or_default()
    }

    /// Mutable progress entry for a scan.
    pub fn scan_mut(&mut self, scan_id: &str) -> &mut ScanStageState {
        self.scans.entry(scan_id.to_string()).or_default()
    }
}

/// File-based handoff between pipeline stages, rooted at one session
/// directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> GradeResult<Self> {
        let store = Self { root: root.into() };
        store.ensure_layout()?;
        Ok(store)
    }

    /// Session root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_layout(&self) -> GradeResult<()> {
        for dir in [
            self.inputs_dir().join("templates"),
            self.inputs_dir().join("scans"),
            self.stages_dir().join("aligned"),
            self.stages_dir().join("recognition"),
            self.stages_dir().join("evaluation"),
            self.results_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn inputs_dir(&self) -> PathBuf {
        self.root.join("inputs")
    }

    fn stages_dir(&self) -> PathBuf {
        self.root.join("stages")
    }

    fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    // -- Ingest --------------------------------------------------------

    /// Copies an uploaded template file into the session layout.
    pub fn ingest_template(&self, source: &Path) -> GradeResult<PathBuf> {
        self.ingest(source, "templates", "template_")
    }

    /// Copies an uploaded scan file into the session layout.
    pub fn ingest_scan(&self, source: &Path) -> GradeResult<PathBuf> {
        self.ingest(source, "scans", "scan_")
    }

    fn ingest(&self, source: &Path, subdir: &str, prefix: &str) -> GradeResult<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                GradeError::invalid_input(format!("unusable upload name: {}", source.display()))
            })?;
        let dest = self.inputs_dir().join(subdir).join(format!("{prefix}{name}"));
        fs::copy(source, &dest)?;
        debug!(from = %source.display(), to = %dest.display(), "upload ingested");
        Ok(dest)
    }

    // -- Aligned rasters ----------------------------------------------

    fn aligned_path(&self, scan_id: &str) -> PathBuf {
        self.stages_dir().join("aligned").join(format!("aligned_{scan_id}.png"))
    }

    /// Persists the aligned raster for a scan.
    pub fn save_aligned(&self, scan_id: &str, aligned: &GrayImage) -> GradeResult<()> {
        save_gray(aligned, &self.aligned_path(scan_id))
    }

    /// Returns true when the aligned raster artifact exists.
    pub fn has_aligned(&self, scan_id: &str) -> bool {
        self.aligned_path(scan_id).is_file()
    }

    /// Loads a previously persisted aligned raster.
    pub fn load_aligned(&self, scan_id: &str) -> GradeResult<GrayImage> {
        load_gray(&self.aligned_path(scan_id))
    }

    // -- Recognition and evaluation records ---------------------------

    fn recognition_path(&self, scan_id: &str) -> PathBuf {
        self.stages_dir().join("recognition").join(format!("{scan_id}.json"))
    }

    fn evaluation_path(&self, scan_id: &str) -> PathBuf {
        self.stages_dir().join("evaluation").join(format!("{scan_id}.json"))
    }

    /// Persists a recognition record.
    pub fn save_recognition(&self, scan_id: &str, record: &StudentAnswerRecord) -> GradeResult<()> {
        write_json_atomic(&self.recognition_path(scan_id), record)
    }

    /// Returns true when the recognition artifact exists.
    pub fn has_recognition(&self, scan_id: &str) -> bool {
        self.recognition_path(scan_id).is_file()
    }

    /// Loads a previously persisted recognition record.
    pub fn load_recognition(&self, scan_id: &str) -> GradeResult<StudentAnswerRecord> {
        read_json(&self.recognition_path(scan_id))
    }

    /// Persists an evaluation record.
    pub fn save_evaluation(&self, scan_id: &str, record: &EvaluationRecord) -> GradeResult<()> {
        write_json_atomic(&self.evaluation_path(scan_id), record)
    }

    /// Returns true when the evaluation artifact exists.
    pub fn has_evaluation(&self, scan_id: &str) -> bool {
        self.evaluation_path(scan_id).is_file()
    }

    /// Loads a previously persisted evaluation record.
    pub fn load_evaluation(&self, scan_id: &str) -> GradeResult<EvaluationRecord> {
        read_json(&self.evaluation_path(scan_id))
    }

    // -- Stage state ---------------------------------------------------

    fn stage_state_path(&self) -> PathBuf {
        self.stages_dir().join(STAGE_STATE_FILE)
    }

    /// Loads the stage-state record; an absent record is an empty one.
    pub fn stage_state(&self) -> GradeResult<StageStateRecord> {
        let path = self.stage_state_path();
        if !path.is_file() {
            return Ok(StageStateRecord::default());
        }
        read_json(&path)
    }

    /// Persists the stage-state record durably.
    pub fn save_stage_state(&self, record: &StageStateRecord) -> GradeResult<()> {
        write_json_atomic(&self.stage_state_path(), record)
    }

    // -- Running collection -------------------------------------------

    fn collection_path(&self) -> PathBuf {
        self.results_dir().join(COLLECTION_FILE)
    }

    fn csv_path(&self) -> PathBuf {
        self.results_dir().join(CSV_FILE)
    }

    /// Reads the append-only running collection; absent means empty.
    ///
    /// A corrupt collection is fatal to this read: the error surfaces
    /// rather than being replaced with fabricated data.
    pub fn running_collection(&self) -> GradeResult<RunningCollection> {
        let path = self.collection_path();
        if !path.is_file() {
            return Ok(RunningCollection::default());
        }
        read_json(&path)
    }

    /// Appends a finalized record to the running collection and the CSV
    /// export, flushing the collection durably before returning.
    pub fn append_to_collection(
        &self,
        record: &EvaluationRecord,
        reference: &ReferenceTable,
    ) -> GradeResult<()> {
        let mut collection = self.running_collection()?;
        collection.append(record.clone());
        write_json_atomic(&self.collection_path(), &collection)?;
        self.append_csv_rows(record, reference)?;
        Ok(())
    }

    fn append_csv_rows(
        &self,
        record: &EvaluationRecord,
        reference: &ReferenceTable,
    ) -> GradeResult<()> {
        let path = self.csv_path();
        let write_header = !path.is_file() || fs::metadata(&path)?.len() == 0;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if write_header {
            writer.write_record([
                "Student Name",
                "Roll No",
                "Question No",
                "Student Answer",
                "Reference Answer",
                "Max Marks",
                "Awarded Marks",
                "Feedback",
            ])?;
        }

        for (label, score) in &record.answers {
            let reference_answer = reference
                .get(label)
                .map(|r| r.answer.as_str())
                .unwrap_or("N/A");
            let max_marks = score.max_marks.to_string();
            let awarded_marks = score.awarded_marks.to_string();
            writer.write_record([
                record.student_info.name.as_str(),
                record.student_info.roll_no.as_str(),
                label.as_str(),
                score.answer.as_str(),
                reference_answer,
                max_marks.as_str(),
                awarded_marks.as_str(),
                score.feedback.as_str(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    // -- Reset ---------------------------------------------------------

    /// Clears all stage artifacts atomically, leaving ingested inputs and
    /// the append-only results untouched.
    ///
    /// The stages directory is renamed aside in one step and recreated,
    /// so a crash mid-reset leaves either the old state or a clean slate,
    /// never a half-cleared session.
    pub fn reset(&self) -> GradeResult<()> {
        let stages = self.stages_dir();
        let trash = self.root.join("stages.trash");
        if trash.exists() {
            fs::remove_dir_all(&trash)?;
        }
        if stages.exists() {
            fs::rename(&stages, &trash)?;
        }
        self.ensure_layout()?;
        if trash.exists() {
            // Best effort; stale trash does not affect correctness.
            let _ = fs::remove_dir_all(&trash);
        }
        debug!(root = %self.root.display(), "stage artifacts cleared");
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> GradeResult<T> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|err| GradeError::artifact_corrupt(path, err))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> GradeResult<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, value)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StudentInfo;
    use tempfile::tempdir;

    fn sample_record(roll_no: &str) -> EvaluationRecord {
        let mut record = EvaluationRecord::new(StudentInfo::from_roll_no(roll_no));
        record.insert_question("Q1", "b", 2.0, 2.0, "correct");
        record.insert_question("Q2", "a", 0.0, 3.0, "incorrect");
        record
    }

    #[test]
    fn recognition_record_round_trips() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let record = StudentAnswerRecord::new(
            StudentInfo::from_roll_no("s1"),
            [("Q1".to_string(), "b".to_string())].into(),
        );
        store.save_recognition("s1", &record).unwrap();
        assert!(store.has_recognition("s1"));
        assert_eq!(store.load_recognition("s1").unwrap(), record);
    }

    #[test]
    fn evaluation_record_round_trips() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let record = sample_record("s7");
        store.save_evaluation("s7", &record).unwrap();
        assert!(store.has_evaluation("s7"));
        assert_eq!(store.load_evaluation("s7").unwrap(), record);
    }

    #[test]
    fn corrupt_collection_surfaces_artifact_corrupt() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        fs::write(dir.path().join("results").join(COLLECTION_FILE), b"{not json").unwrap();
        let err = store.running_collection().unwrap_err();
        assert!(matches!(err, GradeError::ArtifactCorrupt { .. }));
    }

    #[test]
    fn collection_appends_are_ordered_and_durable() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let reference = ReferenceTable::new();

        store.append_to_collection(&sample_record("1"), &reference).unwrap();
        store.append_to_collection(&sample_record("2"), &reference).unwrap();

        let collection = store.running_collection().unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.students[0].student_info.roll_no, "1");
        assert_eq!(collection.students[1].student_info.roll_no, "2");
    }

    #[test]
    fn csv_header_written_once() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let mut reference = ReferenceTable::new();
        reference.insert("Q1", "b", 2.0);

        store.append_to_collection(&sample_record("1"), &reference).unwrap();
        store.append_to_collection(&sample_record("2"), &reference).unwrap();

        let csv = fs::read_to_string(dir.path().join("results").join(CSV_FILE)).unwrap();
        let header_count = csv.lines().filter(|l| l.starts_with("Student Name")).count();
        assert_eq!(header_count, 1);
        // Two records × two questions.
        assert_eq!(csv.lines().count(), 5);
        assert!(csv.contains("N/A"), "missing reference shows as N/A");
    }

    #[test]
    fn stage_state_round_trips_and_defaults_empty() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        assert!(store.stage_state().unwrap().scans.is_empty());

        let mut record = StageStateRecord::default();
        record.scan_mut("s1").recognized = true;
        record.scan_mut("s1").align = Some(AlignmentSummary {
            template_id: "t1".to_string(),
            confidence: 37,
            homography: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        });
        store.save_stage_state(&record).unwrap();

        let loaded = store.stage_state().unwrap();
        let scan = loaded.scan("s1");
        assert!(scan.recognized);
        assert_eq!(scan.align.unwrap().confidence, 37);
    }

    #[test]
    fn reset_clears_stages_but_preserves_results() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let reference = ReferenceTable::new();

        let mut state = StageStateRecord::default();
        state.scan_mut("s1").recognized = true;
        store.save_stage_state(&state).unwrap();
        store
            .save_recognition("s1", &StudentAnswerRecord::default())
            .unwrap();
        store.append_to_collection(&sample_record("1"), &reference).unwrap();

        store.reset().unwrap();

        assert!(store.stage_state().unwrap().scans.is_empty());
        assert!(!store.has_recognition("s1"));
        assert_eq!(store.running_collection().unwrap().len(), 1);
    }

    #[test]
    fn ingest_prefixes_uploads() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("session")).unwrap();

        let upload = dir.path().join("key.png");
        fs::write(&upload, b"fake").unwrap();

        let dest = store.ingest_template(&upload).unwrap();
        assert!(dest.ends_with("template_key.png"));
        assert!(dest.is_file());

        let dest = store.ingest_scan(&upload).unwrap();
        assert!(dest.ends_with("scan_key.png"));
    }
}

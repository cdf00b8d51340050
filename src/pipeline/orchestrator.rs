//! Batch orchestration: Align → SelectRegions → Recognize → Score.
//!
//! The session owns the uploaded templates and scans plus the immutable
//! [`SessionConfig`], drives the ordered stage sequence over the batch,
//! and persists every stage output through the [`ArtifactStore`] before
//! advancing. Per-scan progression is independent: one scan failing a
//! stage degrades that scan, never the batch. Batch-level gating is
//! limited to the cases where a downstream stage would be meaningless:
//! zero alignments fail the batch outright, a fully failed recognition
//! stage skips scoring, and recognized labels without reference answers
//! refuse the scoring stage before any scoring call is made.
//!
//! Re-running a session without new uploads reuses persisted artifacts
//! (the stage-state record decides, artifact files are the durability
//! layer); a session reset clears the stage artifacts atomically and
//! leaves the append-only running collection in place.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use image::GrayImage;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::core::traits::{AnswerScorer, RegionRecognizer, RegionSource};
use crate::core::{GradeError, GradeResult, StageKind};
use crate::domain::{
    EvaluationRecord, RegionOfInterest, RunningCollection, Scan, StudentAnswerRecord, StudentInfo,
    Template,
};
use crate::pipeline::aligner::Aligner;
use crate::pipeline::artifacts::{AlignmentSummary, ArtifactStore};
use crate::pipeline::config::SessionConfig;
use crate::pipeline::report::{BatchReport, ScanReport, StageStatus};
use crate::pipeline::selector::TemplateSelector;
use crate::pipeline::stats::BatchStats;
use crate::processors::matrix3_to_array;

enum AlignAttempt {
    Fresh(crate::pipeline::aligner::AlignmentResult),
    Reused(AlignmentSummary),
    Rejected,
}

enum RecognizeAttempt {
    Fresh(StudentAnswerRecord),
    Reused(StudentAnswerRecord),
    Failed(String),
}

/// One grading session: uploaded inputs, configuration, collaborators,
/// and the artifact store, with batch entry points.
pub struct GradingSession<R, S> {
    config: SessionConfig,
    templates: Vec<Template>,
    scans: Vec<Scan>,
    store: ArtifactStore,
    selector: TemplateSelector,
    recognizer: R,
    scorer: S,
    region_source: Option<Box<dyn RegionSource + Send + Sync>>,
}

impl<R, S> GradingSession<R, S>
where
    R: RegionRecognizer + Sync,
    S: AnswerScorer + Sync,
{
    /// Creates a session with the given configuration and collaborators.
    pub fn new(config: SessionConfig, recognizer: R, scorer: S) -> GradeResult<Self> {
        let store = ArtifactStore::open(&config.artifact_root)?;
        let aligner = Aligner::new(config.aligner.clone());
        let selector = TemplateSelector::new(aligner, config.parallel.clone());
        Ok(Self {
            config,
            templates: Vec::new(),
            scans: Vec::new(),
            store,
            selector,
            recognizer,
            scorer,
            region_source: None,
        })
    }

    /// Attaches a best-effort region refresh collaborator.
    pub fn with_region_source(
        mut self,
        source: Box<dyn RegionSource + Send + Sync>,
    ) -> Self {
        self.region_source = Some(source);
        self
    }

    /// Adds decoded templates and scans to the session.
    pub fn upload_inputs(&mut self, templates: Vec<Template>, scans: Vec<Scan>) {
        self.templates.extend(templates);
        self.scans.extend(scans);
    }

    /// Copies uploaded files into the session layout and loads them.
    pub fn ingest_files(
        &mut self,
        template_paths: &[impl AsRef<Path>],
        scan_paths: &[impl AsRef<Path>],
    ) -> GradeResult<()> {
        for path in template_paths {
            let dest = self.store.ingest_template(path.as_ref())?;
            self.templates.push(Template::from_path(&dest)?);
        }
        for path in scan_paths {
            let dest = self.store.ingest_scan(path.as_ref())?;
            self.scans.push(Scan::from_path(&dest)?);
        }
        Ok(())
    }

    /// Reads the append-only running collection.
    pub fn running_collection(&self) -> GradeResult<RunningCollection> {
        self.store.running_collection()
    }

    /// Clears all stage artifacts atomically for a clean rerun. Ingested
    /// inputs and the running collection are preserved.
    pub fn reset_session(&self) -> GradeResult<()> {
        self.store.reset()
    }

    /// Runs the full stage sequence over the uploaded batch.
    ///
    /// When the parallel policy caps worker threads, the whole run is
    /// scoped to a pool of that size.
    pub fn run_batch(&self) -> GradeResult<BatchReport> {
        match self.config.parallel.max_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|err| GradeError::config(err.to_string()))?;
                pool.install(|| self.run_batch_inner())
            }
            None => self.run_batch_inner(),
        }
    }

    fn run_batch_inner(&self) -> GradeResult<BatchReport> {
        if self.templates.is_empty() || self.scans.is_empty() {
            return Err(GradeError::invalid_input(
                "upload at least one template and one scan before running a batch",
            ));
        }

        let mut state = self.store.stage_state()?;
        let mut reports: BTreeMap<String, ScanReport> = self
            .scans
            .iter()
            .map(|scan| (scan.id.clone(), ScanReport::default()))
            .collect();
        let mut stats = BatchStats {
            total_scans: self.scans.len(),
            ..BatchStats::default()
        };

        // -- Align ----------------------------------------------------

        let prior_alignments: Vec<Option<AlignmentSummary>> = self
            .scans
            .iter()
            .map(|scan| {
                state
                    .scan(&scan.id)
                    .align
                    .filter(|_| self.store.has_aligned(&scan.id))
            })
            .collect();

        let align_one = |idx: usize| -> (usize, AlignAttempt) {
            let scan = &self.scans[idx];
            if let Some(summary) = prior_alignments[idx].clone() {
                return (idx, AlignAttempt::Reused(summary));
            }
            match self.selector.select_best(&self.templates, scan) {
                Some(result) => (idx, AlignAttempt::Fresh(result)),
                None => (idx, AlignAttempt::Rejected),
            }
        };

        let attempts: Vec<(usize, AlignAttempt)> =
            if self.config.parallel.parallelize_scans(self.scans.len()) {
                (0..self.scans.len()).into_par_iter().map(align_one).collect()
            } else {
                (0..self.scans.len()).map(align_one).collect()
            };

        let mut aligned_images: Vec<(usize, GrayImage)> = Vec::new();
        for (idx, attempt) in attempts {
            let scan_id = self.scans[idx].id.clone();
            match attempt {
                AlignAttempt::Fresh(result) => {
                    self.store.save_aligned(&scan_id, &result.aligned)?;
                    self.record_alignment(&mut state, &mut reports, idx, &result);
                    aligned_images.push((idx, result.aligned));
                }
                AlignAttempt::Reused(summary) => match self.store.load_aligned(&scan_id) {
                    Ok(image) => {
                        let report = reports.get_mut(&scan_id).expect("report entry");
                        report.reused = true;
                        report.template_id = Some(summary.template_id.clone());
                        report.confidence = Some(summary.confidence);
                        aligned_images.push((idx, image));
                    }
                    Err(err) => {
                        warn!(scan = %scan_id, %err, "aligned artifact unreadable, re-registering");
                        match self.selector.select_best(&self.templates, &self.scans[idx]) {
                            Some(result) => {
                                self.store.save_aligned(&scan_id, &result.aligned)?;
                                self.record_alignment(&mut state, &mut reports, idx, &result);
                                aligned_images.push((idx, result.aligned));
                            }
                            None => {
                                state.scan_mut(&scan_id).align = None;
                                self.reject_scan(&mut reports, &scan_id);
                            }
                        }
                    }
                },
                AlignAttempt::Rejected => {
                    state.scan_mut(&scan_id).align = None;
                    self.reject_scan(&mut reports, &scan_id);
                }
            }
        }
        self.store.save_stage_state(&state)?;

        stats.aligned = aligned_images.len();
        stats.rejected = self.scans.len() - aligned_images.len();
        info!(
            aligned = stats.aligned,
            total = stats.total_scans,
            "alignment stage finished"
        );

        if aligned_images.is_empty() {
            return Ok(BatchReport {
                align: StageStatus::failed(format!(
                    "alignment failed for all {} scans",
                    self.scans.len()
                )),
                select_regions: StageStatus::skipped_after(StageKind::Align),
                recognize: StageStatus::skipped_after(StageKind::Align),
                score: StageStatus::skipped_after(StageKind::Align),
                scans: reports,
                missing_reference: Vec::new(),
                stats,
            });
        }
        let align_status = StageStatus::completed(format!(
            "{} of {} scans aligned",
            stats.aligned, stats.total_scans
        ));

        // -- SelectRegions --------------------------------------------

        let (regions, select_status) = self.select_regions(&aligned_images[0].1);

        // -- Recognize ------------------------------------------------

        let recognition_inputs: Vec<(usize, &GrayImage, bool)> = aligned_images
            .iter()
            .map(|(idx, image)| {
                let scan_id = &self.scans[*idx].id;
                let prior = state.scan(scan_id).recognized && self.store.has_recognition(scan_id);
                (*idx, image, prior)
            })
            .collect();

        let recognize_one = |input: &(usize, &GrayImage, bool)| -> (usize, RecognizeAttempt) {
            let (idx, image, prior) = *input;
            let scan = &self.scans[idx];
            if prior {
                match self.store.load_recognition(&scan.id) {
                    Ok(record) => return (idx, RecognizeAttempt::Reused(record)),
                    Err(err) => {
                        warn!(scan = %scan.id, %err, "recognition artifact unreadable, re-running");
                    }
                }
            }
            // Regions are template-space; clamp to the aligned raster so
            // integer rounding at the edges cannot push a crop out of
            // bounds.
            let clamped: Vec<RegionOfInterest> = regions
                .iter()
                .map(|r| r.clamped(image.width(), image.height()))
                .collect();
            let outcome = self.call_with_deadline(StageKind::Recognize, || {
                self.recognizer.recognize(image, &clamped)
            });
            match outcome {
                Ok(answers) => {
                    if let Some(region) = clamped.iter().find(|r| !answers.contains_key(&r.label)) {
                        return (
                            idx,
                            RecognizeAttempt::Failed(format!(
                                "recognizer omitted an entry for region {}",
                                region.label
                            )),
                        );
                    }
                    let record = StudentAnswerRecord::new(
                        StudentInfo::from_roll_no(scan.id.clone()),
                        answers,
                    );
                    (idx, RecognizeAttempt::Fresh(record))
                }
                Err(err) => (idx, RecognizeAttempt::Failed(err.to_string())),
            }
        };

        let recognize_attempts: Vec<(usize, RecognizeAttempt)> =
            if self.config.parallel.parallelize_scans(recognition_inputs.len()) {
                recognition_inputs.par_iter().map(recognize_one).collect()
            } else {
                recognition_inputs.iter().map(recognize_one).collect()
            };

        let mut recognition_records: BTreeMap<usize, StudentAnswerRecord> = BTreeMap::new();
        for (idx, attempt) in recognize_attempts {
            let scan_id = self.scans[idx].id.clone();
            let report = reports.get_mut(&scan_id).expect("report entry");
            match attempt {
                RecognizeAttempt::Reused(record) => {
                    report.recognized = true;
                    recognition_records.insert(idx, record);
                }
                RecognizeAttempt::Fresh(record) => {
                    self.store.save_recognition(&scan_id, &record)?;
                    state.scan_mut(&scan_id).recognized = true;
                    report.recognized = true;
                    recognition_records.insert(idx, record);
                }
                RecognizeAttempt::Failed(message) => {
                    warn!(scan = %scan_id, %message, "recognition failed for scan");
                    report.note = Some(format!("recognition failed: {message}"));
                }
            }
        }
        self.store.save_stage_state(&state)?;
        stats.recognized = recognition_records.len();

        if recognition_records.is_empty() {
            return Ok(BatchReport {
                align: align_status,
                select_regions: select_status,
                recognize: StageStatus::failed("recognition failed for all aligned scans"),
                score: StageStatus::skipped_after(StageKind::Recognize),
                scans: reports,
                missing_reference: Vec::new(),
                stats,
            });
        }
        let recognize_status = StageStatus::completed(format!(
            "{} of {} aligned scans recognized",
            stats.recognized, stats.aligned
        ));

        // -- Coverage gate before Score -------------------------------

        let answered_labels = recognition_records
            .values()
            .flat_map(|record| record.answers.keys().map(String::as_str));
        let uncovered = self.config.reference.uncovered_labels(answered_labels);
        if !uncovered.is_empty() {
            let message = GradeError::missing_reference(uncovered.clone()).to_string();
            warn!(%message, "scoring refused");
            return Ok(BatchReport {
                align: align_status,
                select_regions: select_status,
                recognize: recognize_status,
                score: StageStatus::failed(message),
                scans: reports,
                missing_reference: uncovered,
                stats,
            });
        }

        // -- Score ----------------------------------------------------

        for (idx, record) in &recognition_records {
            let scan_id = self.scans[*idx].id.clone();
            let prior = state.scan(&scan_id);
            let report = reports.get_mut(&scan_id).expect("report entry");

            if prior.scored && self.store.has_evaluation(&scan_id) {
                report.scored = true;
                stats.scored += 1;
                continue;
            }

            let evaluation = self.score_record(record);
            self.store.save_evaluation(&scan_id, &evaluation)?;
            // Durable before the scan is reported complete.
            self.store
                .append_to_collection(&evaluation, &self.config.reference)?;
            state.scan_mut(&scan_id).scored = true;
            self.store.save_stage_state(&state)?;

            info!(
                scan = %scan_id,
                awarded = evaluation.total_awarded_marks,
                possible = evaluation.total_possible_marks,
                "evaluation finalized"
            );
            report.scored = true;
            stats.scored += 1;
        }

        let score_status = StageStatus::completed(format!(
            "{} of {} recognized scans scored",
            stats.scored, stats.recognized
        ));

        Ok(BatchReport {
            align: align_status,
            select_regions: select_status,
            recognize: recognize_status,
            score: score_status,
            scans: reports,
            missing_reference: Vec::new(),
            stats,
        })
    }

    fn record_alignment(
        &self,
        state: &mut crate::pipeline::artifacts::StageStateRecord,
        reports: &mut BTreeMap<String, ScanReport>,
        idx: usize,
        result: &crate::pipeline::aligner::AlignmentResult,
    ) {
        let scan_id = &self.scans[idx].id;
        state.scan_mut(scan_id).align = Some(AlignmentSummary {
            template_id: result.template_id.clone(),
            confidence: result.confidence,
            homography: matrix3_to_array(&result.homography),
        });
        let report = reports.get_mut(scan_id).expect("report entry");
        report.template_id = Some(result.template_id.clone());
        report.confidence = Some(result.confidence);
    }

    fn reject_scan(&self, reports: &mut BTreeMap<String, ScanReport>, scan_id: &str) {
        let report = reports.get_mut(scan_id).expect("report entry");
        report.confidence = Some(0);
        report.note = Some("alignment rejected by every candidate template".to_string());
    }

    /// Best-effort region refresh; failures fall back to the configured
    /// static set without failing the batch.
    fn select_regions(&self, aligned: &GrayImage) -> (Vec<RegionOfInterest>, StageStatus) {
        match &self.region_source {
            Some(source) => match source.refresh(aligned) {
                Ok(regions) if !regions.is_empty() => {
                    let status = StageStatus::completed(format!(
                        "{} regions refreshed from the aligned raster",
                        regions.len()
                    ));
                    (regions, status)
                }
                Ok(_) => {
                    warn!("region refresh returned no regions, using configured set");
                    (
                        self.config.regions.clone(),
                        StageStatus::completed(
                            "region refresh returned no regions; using configured regions",
                        ),
                    )
                }
                Err(err) => {
                    warn!(%err, "region refresh failed, using configured set");
                    (
                        self.config.regions.clone(),
                        StageStatus::completed(format!(
                            "region refresh failed ({err}); using configured regions"
                        )),
                    )
                }
            },
            None => (
                self.config.regions.clone(),
                StageStatus::completed("using configured regions"),
            ),
        }
    }

    /// Scores every answer in one recognition record. Collaborator
    /// failures and timeouts degrade to a zero-score entry whose feedback
    /// carries the error text; awarded marks are clamped to the
    /// question's range.
    fn score_record(&self, record: &StudentAnswerRecord) -> EvaluationRecord {
        let mut evaluation = EvaluationRecord::new(record.student_info.clone());
        for (label, answer) in &record.answers {
            match self.config.reference.get(label) {
                Some(reference) => {
                    let outcome = self.call_with_deadline(StageKind::Score, || {
                        self.scorer.score(answer, &reference.answer, reference.marks)
                    });
                    match outcome {
                        Ok((awarded, feedback)) => evaluation.insert_question(
                            label.clone(),
                            answer.clone(),
                            awarded.clamp(0.0, reference.marks),
                            reference.marks,
                            feedback,
                        ),
                        Err(err) => {
                            warn!(%label, %err, "scoring failed for question");
                            evaluation.insert_question(
                                label.clone(),
                                answer.clone(),
                                0.0,
                                reference.marks,
                                err.to_string(),
                            );
                        }
                    }
                }
                // Unreachable after the coverage gate for fresh records,
                // but a reloaded artifact can carry stale labels.
                None => evaluation.insert_unreferenced(label.clone(), answer.clone()),
            }
        }
        evaluation
    }

    /// Runs a collaborator call and converts a deadline overrun into a
    /// timeout failure for that single item. A late result is discarded
    /// rather than trusted.
    fn call_with_deadline<T>(
        &self,
        stage: StageKind,
        call: impl FnOnce() -> GradeResult<T>,
    ) -> GradeResult<T> {
        let start = Instant::now();
        let result = call();
        let elapsed = start.elapsed();
        if elapsed > self.config.collaborator_timeout {
            warn!(%stage, ?elapsed, "collaborator exceeded deadline");
            return Err(GradeError::timeout(stage, elapsed));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReferenceTable;
    use crate::test_utils::synthetic_sheet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    struct MapRecognizer {
        answers: BTreeMap<String, String>,
    }

    impl MapRecognizer {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                answers: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    impl RegionRecognizer for MapRecognizer {
        fn recognize(
            &self,
            _aligned: &GrayImage,
            regions: &[RegionOfInterest],
        ) -> GradeResult<BTreeMap<String, String>> {
            Ok(regions
                .iter()
                .map(|r| {
                    (
                        r.label.clone(),
                        self.answers.get(&r.label).cloned().unwrap_or_default(),
                    )
                })
                .collect())
        }
    }

    /// Returns entries for all regions except the named one.
    struct OmittingRecognizer {
        omit: String,
    }

    impl RegionRecognizer for OmittingRecognizer {
        fn recognize(
            &self,
            _aligned: &GrayImage,
            regions: &[RegionOfInterest],
        ) -> GradeResult<BTreeMap<String, String>> {
            Ok(regions
                .iter()
                .filter(|r| r.label != self.omit)
                .map(|r| (r.label.clone(), "x".to_string()))
                .collect())
        }
    }

    struct FixedScorer {
        award: f64,
        calls: Arc<AtomicUsize>,
        fail_on_reference: Option<String>,
        delay: Option<Duration>,
    }

    impl FixedScorer {
        fn new(award: f64) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    award,
                    calls: Arc::clone(&calls),
                    fail_on_reference: None,
                    delay: None,
                },
                calls,
            )
        }
    }

    impl AnswerScorer for FixedScorer {
        fn score(
            &self,
            _answer: &str,
            reference: &str,
            max_marks: f64,
        ) -> GradeResult<(f64, String)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail_on_reference.as_deref() == Some(reference) {
                return Err(GradeError::collaborator(
                    StageKind::Score,
                    "grading backend unavailable",
                ));
            }
            Ok((self.award.min(max_marks), "graded".to_string()))
        }
    }

    struct FailingRegions;

    impl RegionSource for FailingRegions {
        fn refresh(&self, _aligned: &GrayImage) -> GradeResult<Vec<RegionOfInterest>> {
            Err(GradeError::stage(StageKind::SelectRegions, "detector offline"))
        }
    }

    fn two_question_regions() -> Vec<RegionOfInterest> {
        vec![
            RegionOfInterest::new("Q1", 40, 40, 60, 30),
            RegionOfInterest::new("Q2", 200, 200, 60, 30),
        ]
    }

    fn two_question_reference() -> ReferenceTable {
        let mut reference = ReferenceTable::new();
        reference.insert("Q1", "b", 2.0);
        reference.insert("Q2", "a", 3.0);
        reference
    }

    fn config_for(dir: &Path) -> SessionConfig {
        SessionConfig::new(dir)
            .with_regions(two_question_regions())
            .with_reference(two_question_reference())
    }

    fn sheet_inputs() -> (Vec<Template>, Vec<Scan>) {
        let sheet = synthetic_sheet(400, 400);
        (
            vec![Template::new("t1", sheet.clone())],
            vec![Scan::new("s1", sheet)],
        )
    }

    #[test]
    fn full_batch_completes_and_accumulates() {
        let dir = tempdir().unwrap();
        let (scorer, calls) = FixedScorer::new(1.5);
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "c")]);
        let mut session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();

        assert!(report.all_completed(), "report: {report:?}");
        assert_eq!(report.stats.aligned, 1);
        assert_eq!(report.stats.scored, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let collection = session.running_collection().unwrap();
        assert_eq!(collection.len(), 1);
        let record = &collection.students[0];
        assert_eq!(record.student_info.roll_no, "s1");
        assert_eq!(record.total_possible_marks, 5.0);
        assert_eq!(record.total_awarded_marks, 3.0);
        assert!(record.totals_consistent());
    }

    #[test]
    fn missing_reference_blocks_scoring_before_any_call() {
        let dir = tempdir().unwrap();
        let (scorer, calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);

        let mut reference = ReferenceTable::new();
        reference.insert("Q1", "b", 2.0);
        let config = SessionConfig::new(dir.path())
            .with_regions(two_question_regions())
            .with_reference(reference);

        let mut session = GradingSession::new(config, recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();

        assert_eq!(report.missing_reference, vec!["Q2"]);
        assert!(!report.score.is_completed());
        assert!(report.score.message.contains("Q2"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no scoring call may run");
        assert!(session.running_collection().unwrap().is_empty());
    }

    #[test]
    fn scorer_failure_degrades_single_question() {
        let dir = tempdir().unwrap();
        let (mut scorer, _calls) = FixedScorer::new(2.0);
        scorer.fail_on_reference = Some("a".to_string());
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);
        let mut session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();
        assert!(report.score.is_completed());

        let record = &session.running_collection().unwrap().students[0];
        let q2 = &record.answers["Q2"];
        assert_eq!(q2.awarded_marks, 0.0);
        assert!(q2.feedback.contains("grading backend unavailable"));
        // Q1 is unaffected.
        assert_eq!(record.answers["Q1"].awarded_marks, 2.0);
        assert!(record.totals_consistent());
    }

    #[test]
    fn collaborator_timeout_degrades_to_zero_score() {
        let dir = tempdir().unwrap();
        let (mut scorer, _calls) = FixedScorer::new(2.0);
        scorer.delay = Some(Duration::from_millis(30));
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);
        let config = config_for(dir.path())
            .with_collaborator_timeout(Duration::from_millis(5));
        let mut session = GradingSession::new(config, recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();
        assert!(report.score.is_completed(), "timeouts degrade items, not the stage");

        let record = &session.running_collection().unwrap().students[0];
        for score in record.answers.values() {
            assert_eq!(score.awarded_marks, 0.0);
            assert!(score.feedback.contains("timed out"));
        }
    }

    #[test]
    fn zero_alignments_fail_the_batch_and_skip_downstream() {
        let dir = tempdir().unwrap();
        let (scorer, calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[("Q1", "b")]);
        let mut session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();

        let blank = GrayImage::from_pixel(300, 300, image::Luma([255u8]));
        session.upload_inputs(
            vec![Template::new("t1", synthetic_sheet(300, 300))],
            vec![Scan::new("s1", blank)],
        );

        let report = session.run_batch().unwrap();

        assert!(!report.align.is_completed());
        assert!(report.select_regions.message.contains("align"));
        assert!(report.recognize.message.contains("align"));
        assert!(report.score.message.contains("align"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.scans["s1"].confidence, Some(0));
    }

    #[test]
    fn recognizer_contract_violation_fails_scan_and_skips_scoring() {
        let dir = tempdir().unwrap();
        let (scorer, calls) = FixedScorer::new(1.0);
        let recognizer = OmittingRecognizer {
            omit: "Q2".to_string(),
        };
        let mut session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();

        assert!(report.align.is_completed());
        assert!(!report.recognize.is_completed());
        assert!(report.score.message.contains("recognize"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let note = report.scans["s1"].note.as_deref().unwrap();
        assert!(note.contains("Q2"));
    }

    #[test]
    fn rerun_reuses_artifacts_without_recomputing() {
        let dir = tempdir().unwrap();
        let (scorer, calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);
        let mut session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let first = session.run_batch().unwrap();
        assert!(first.all_completed());
        let calls_after_first = calls.load(Ordering::SeqCst);

        let second = session.run_batch().unwrap();
        assert!(second.all_completed());
        assert!(second.scans["s1"].reused, "alignment must be reused");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            calls_after_first,
            "no scoring calls on reuse"
        );
        assert_eq!(session.running_collection().unwrap().len(), 1);
    }

    #[test]
    fn reset_session_enables_clean_rerun_and_appends() {
        let dir = tempdir().unwrap();
        let (scorer, calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);
        let mut session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        session.run_batch().unwrap();
        let calls_after_first = calls.load(Ordering::SeqCst);

        session.reset_session().unwrap();
        session.run_batch().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), calls_after_first * 2);
        // Append-only: the collection now holds both runs' records.
        assert_eq!(session.running_collection().unwrap().len(), 2);
    }

    #[test]
    fn failing_region_source_falls_back_to_configured_regions() {
        let dir = tempdir().unwrap();
        let (scorer, _calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);
        let mut session = GradingSession::new(config_for(dir.path()), recognizer, scorer)
            .unwrap()
            .with_region_source(Box::new(FailingRegions));
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();

        assert!(report.select_regions.is_completed());
        assert!(report
            .select_regions
            .message
            .contains("using configured regions"));
        assert!(report.recognize.is_completed());
        assert!(report.score.is_completed());
    }

    #[test]
    fn capped_worker_pool_still_completes() {
        let dir = tempdir().unwrap();
        let (scorer, _calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[("Q1", "b"), ("Q2", "a")]);
        let config = config_for(dir.path()).with_parallel(
            crate::core::ParallelPolicy::default().with_max_threads(Some(2)),
        );
        let mut session = GradingSession::new(config, recognizer, scorer).unwrap();
        let (templates, scans) = sheet_inputs();
        session.upload_inputs(templates, scans);

        let report = session.run_batch().unwrap();
        assert!(report.all_completed());
    }

    #[test]
    fn empty_session_is_invalid_input() {
        let dir = tempdir().unwrap();
        let (scorer, _calls) = FixedScorer::new(1.0);
        let recognizer = MapRecognizer::new(&[]);
        let session =
            GradingSession::new(config_for(dir.path()), recognizer, scorer).unwrap();

        let err = session.run_batch().unwrap_err();
        assert!(matches!(err, GradeError::InvalidInput { .. }));
    }
}

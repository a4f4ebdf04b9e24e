//! A [`Calibrator`] shared between a capture thread and a calibration thread.
//!
//! `calibrate` solves on a snapshot with the lock released, so readers such
//! as `distribution_is_good` stay responsive. While a solve is running every
//! mutation is refused with [`CalibrationError::Busy`].

use super::{CalibrationError, Calibrator, CalibratorState};
use crate::distribution::DistributionStats;
use crate::optimization::GeometricSolver;
use crate::result::CalibrationResult;
use crate::sample::Sample;

use log::debug;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SharedCalibrator {
    inner: Arc<RwLock<Calibrator>>,
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag when the solve ends, including on error.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SharedCalibrator {
    pub fn new(calibrator: Calibrator) -> Self {
        SharedCalibrator {
            inner: Arc::new(RwLock::new(calibrator)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Applies `f` under the write lock unless a solve is in progress.
    fn mutate<R>(&self, f: impl FnOnce(&mut Calibrator) -> R) -> Result<R, CalibrationError> {
        let mut calibrator = self.inner.write();
        if self.busy.load(Ordering::Acquire) {
            return Err(CalibrationError::Busy);
        }
        Ok(f(&mut calibrator))
    }

    pub fn maybe_add_sample(&self, sample: Sample) -> Result<bool, CalibrationError> {
        self.mutate(|c| c.maybe_add_sample(sample))
    }

    pub fn remove_most_recent_sample(&self) -> Result<(), CalibrationError> {
        self.mutate(|c| c.remove_most_recent_sample())?
            .map_err(CalibrationError::from)
    }

    pub fn distribution_is_good(&self) -> bool {
        self.inner.read().distribution_is_good()
    }

    pub fn state(&self) -> CalibratorState {
        self.inner.read().state()
    }

    pub fn stats(&self) -> DistributionStats {
        self.inner.read().stats()
    }

    pub fn last_result(&self) -> Option<CalibrationResult> {
        self.inner.read().last_result()
    }

    /// Copy of the current calibrator.
    pub fn snapshot(&self) -> Calibrator {
        self.inner.read().clone()
    }

    pub fn calibrate<S: GeometricSolver + ?Sized>(
        &self,
        solver: &S,
        force: bool,
    ) -> Result<CalibrationResult, CalibrationError> {
        let mut snapshot = {
            let calibrator = self.inner.write();
            if self.busy.swap(true, Ordering::AcqRel) {
                return Err(CalibrationError::Busy);
            }
            calibrator.clone()
        };
        let _guard = BusyGuard(&self.busy);

        debug!(
            "Calibrating on a snapshot of {} samples",
            snapshot.sample_count()
        );
        let result = snapshot.calibrate(solver, force)?;
        // Mutations were refused while busy, so the snapshot is still current.
        *self.inner.write() = snapshot;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrator::tests::{diverse_samples, mono, MockSolver};
    use crate::optimization::{
        MonoSolution, MonoSolveInput, SolverError, StereoSolution, StereoSolveInput,
    };
    use nalgebra::Isometry3;
    use std::sync::mpsc;
    use std::thread;

    fn ready() -> SharedCalibrator {
        let shared = SharedCalibrator::new(Calibrator::Mono(mono()));
        for sample in diverse_samples() {
            assert!(shared.maybe_add_sample(sample.into()).unwrap());
        }
        shared
    }

    /// Blocks inside `solve` until released, reporting when it has started.
    struct GatedSolver {
        started: mpsc::Sender<()>,
        release: parking_lot::Mutex<mpsc::Receiver<()>>,
        inner: MockSolver,
    }

    impl GeometricSolver for GatedSolver {
        fn solve(&self, input: &MonoSolveInput<'_>) -> Result<MonoSolution, SolverError> {
            let _ = self.started.send(());
            let _ = self.release.lock().recv();
            self.inner.solve(input)
        }

        fn solve_stereo(
            &self,
            input: &StereoSolveInput<'_>,
        ) -> Result<StereoSolution, SolverError> {
            self.inner.solve_stereo(input)
        }

        fn solve_hand_eye(
            &self,
            gripper_poses: &[Isometry3<f64>],
            target_poses: &[Isometry3<f64>],
        ) -> Result<Isometry3<f64>, SolverError> {
            self.inner.solve_hand_eye(gripper_poses, target_poses)
        }
    }

    #[test]
    fn test_calibrate_commits_result() {
        let shared = ready();
        let result = shared.calibrate(&MockSolver::default(), false).unwrap();
        assert_eq!(shared.last_result(), Some(result));
        assert_eq!(shared.state(), CalibratorState::Calibrated);
        assert!(!shared.is_busy());
    }

    #[test]
    fn test_not_ready_clears_busy_flag() {
        let shared = SharedCalibrator::new(Calibrator::Mono(mono()));
        let result = shared.calibrate(&MockSolver::default(), false);
        assert!(matches!(result, Err(CalibrationError::NotReady)));
        assert!(!shared.is_busy());
        assert_eq!(
            shared.remove_most_recent_sample().unwrap_err().to_string(),
            "No samples to remove"
        );
    }

    #[test]
    fn test_mutations_are_refused_while_calibrating() {
        let shared = ready();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let solver = GatedSolver {
            started: started_tx,
            release: parking_lot::Mutex::new(release_rx),
            inner: MockSolver::default(),
        };

        let worker = {
            let shared = shared.clone();
            thread::spawn(move || shared.calibrate(&solver, false))
        };
        started_rx.recv().unwrap();

        assert!(shared.is_busy());
        assert!(shared.distribution_is_good());
        assert!(matches!(
            shared.maybe_add_sample(diverse_samples()[0].clone().into()),
            Err(CalibrationError::Busy)
        ));
        assert!(matches!(
            shared.remove_most_recent_sample(),
            Err(CalibrationError::Busy)
        ));
        assert!(matches!(
            shared.calibrate(&MockSolver::default(), false),
            Err(CalibrationError::Busy)
        ));

        release_tx.send(()).unwrap();
        let result = worker.join().unwrap().unwrap();
        assert!(!shared.is_busy());
        assert_eq!(shared.last_result(), Some(result));
        assert_eq!(shared.snapshot().sample_count(), 10);
    }
}

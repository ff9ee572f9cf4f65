//! 通过引擎与调度器本身观察并发上限

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use amr_projector::projection::scheduler::ThreadScheduler;
use amr_projector::{
    ParticleRecord, ProgressCallback, ProgressEvent, ProjectionRequest, ResolutionSpec,
    SimulationInfo, Variable, project,
};
use parking_lot::Mutex;

const MANY: [Variable; 10] = [
    Variable::Vx,
    Variable::Vy,
    Variable::Vz,
    Variable::Mass,
    Variable::SurfaceDensity,
    Variable::Speed,
    Variable::KineticEnergy,
    Variable::SigmaX,
    Variable::SigmaY,
    Variable::Sigma,
];

fn particles() -> Vec<ParticleRecord> {
    (0..20_000)
        .map(|k| {
            let t = (k as f64 * 0.618_033_988_75).fract();
            let s = (k as f64 * 0.414_213_562_37).fract();
            ParticleRecord::new([t, s, 0.5], 1.0).with_velocity([t - 0.5, s - 0.5, t * s])
        })
        .collect()
}

#[test]
fn engine_never_exceeds_max_concurrency() {
    let records = particles();
    for budget in [1, 3, 8] {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (counter, observed) = (in_flight.clone(), peak.clone());
        let mut builder = ProjectionRequest::builder(budget)
            .resolution(ResolutionSpec::Depth(6))
            .progress(ProgressCallback::new(move |event| match event {
                ProgressEvent::VariableStarted { .. } => {
                    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    observed.fetch_max(now, Ordering::SeqCst);
                }
                ProgressEvent::VariableFinished { .. } => {
                    counter.fetch_sub(1, Ordering::SeqCst);
                }
                ProgressEvent::Completed { .. } => {}
            }));
        for v in MANY {
            builder = builder.variable(v);
        }
        let request = builder.build(&SimulationInfo::new(1.0)).unwrap();
        let result = project(&records, &request).unwrap();

        assert!(result.is_complete());
        assert!(result.peak_concurrency() <= budget);
        assert!(peak.load(Ordering::SeqCst) <= budget);
        let slots: HashSet<&str> = result
            .timings()
            .iter()
            .map(|t| t.channel_index.as_str())
            .collect();
        assert!(slots.len() <= budget);
        assert_eq!(result.timings().len(), MANY.len());
    }
}

#[test]
fn single_worker_is_sequential() {
    let records = particles();
    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = order.clone();
    let mut builder = ProjectionRequest::builder(1)
        .resolution(ResolutionSpec::Depth(4))
        .progress(ProgressCallback::new(move |event| {
            if let ProgressEvent::VariableStarted { variable, .. } = event {
                sink.lock().push(*variable);
            }
        }));
    for v in MANY {
        builder = builder.variable(v);
    }
    let result = project(&records, &builder.build(&SimulationInfo::new(1.0)).unwrap()).unwrap();
    assert_eq!(result.peak_concurrency(), 1);
    assert_eq!(*order.lock(), MANY.to_vec());
    assert!(result.timings().iter().all(|t| t.channel_index == "worker_0"));
}

#[test]
fn queued_jobs_wait_for_a_free_slot() {
    let scheduler = ThreadScheduler::new(NonZeroUsize::new(2).unwrap());
    let in_flight = AtomicUsize::new(0);
    let worst = AtomicUsize::new(0);
    let jobs: Vec<usize> = (0..9).collect();
    let schedule = scheduler.run(&jobs, |_, job| {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        worst.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(10));
        in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(*job * 2)
    });
    assert!(worst.load(Ordering::SeqCst) <= 2);
    assert_eq!(schedule.workers, 2);
    assert_eq!(
        schedule
            .reports
            .iter()
            .map(|r| r.output.clone().unwrap())
            .collect::<Vec<_>>(),
        (0..9).map(|j| j * 2).collect::<Vec<_>>()
    );
}

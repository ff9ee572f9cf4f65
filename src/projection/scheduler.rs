//! 按变量并行：每个变量一条独立的累加流水线
//!
//! 固定 `min(任务数, max_concurrency)` 个工作线程，从共享队列里依次取变量；
//! 一个工作线程做完一个变量后才会取下一个，所以同时在算的变量数不会超过上限。

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::error::VariableError;
use crate::performance::get_unix_timestamp_ms;

/// 统计同时在执行的任务数及其峰值
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// 一个任务的执行结果与时间
#[derive(Debug)]
pub struct JobReport<T> {
    pub output: Result<T, VariableError>,
    /// 执行该任务的工作槽位
    pub slot: usize,
    pub start_time: u64,
    pub end_time: u64,
}

#[derive(Debug)]
pub struct Schedule<T> {
    /// 与输入任务顺序一致
    pub reports: Vec<JobReport<T>>,
    pub peak_concurrency: usize,
    pub workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadScheduler {
    max_concurrency: NonZeroUsize,
}

impl ThreadScheduler {
    pub fn new(max_concurrency: NonZeroUsize) -> Self {
        Self { max_concurrency }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.get()
    }

    /// 执行全部任务。任务内部的 panic 被捕获并记为该任务的错误，
    /// 不会取消其他任务。`max_concurrency == 1` 时直接在调用线程上顺序执行。
    pub fn run<J, T, F>(&self, jobs: &[J], work: F) -> Schedule<T>
    where
        J: Sync,
        T: Send,
        F: Fn(usize, &J) -> Result<T, VariableError> + Sync,
    {
        let queue: Mutex<VecDeque<usize>> = Mutex::new((0..jobs.len()).collect());
        let finished: Mutex<Vec<Option<JobReport<T>>>> =
            Mutex::new((0..jobs.len()).map(|_| None).collect());
        let gauge = ConcurrencyGauge::default();
        let workers = self.max_concurrency().min(jobs.len());

        let worker_loop = |slot: usize| loop {
            let Some(index) = queue.lock().pop_front() else {
                break;
            };
            gauge.enter();
            let start_time = get_unix_timestamp_ms();
            let output = panic::catch_unwind(AssertUnwindSafe(|| work(slot, &jobs[index])))
                .unwrap_or_else(|payload| Err(VariableError::WorkerPanicked(panic_message(payload))));
            let end_time = get_unix_timestamp_ms();
            gauge.leave();
            debug!("[调度] 槽位 {} 完成任务 {}，耗时 {}ms", slot, index, end_time.saturating_sub(start_time));
            finished.lock()[index] = Some(JobReport {
                output,
                slot,
                start_time,
                end_time,
            });
        };

        if workers <= 1 {
            worker_loop(0);
        } else {
            std::thread::scope(|scope| {
                for slot in 0..workers {
                    let worker_loop = &worker_loop;
                    scope.spawn(move || worker_loop(slot));
                }
            });
        }

        let reports = finished
            .into_inner()
            .into_iter()
            .map(|report| {
                report.unwrap_or_else(|| JobReport {
                    output: Err(VariableError::WorkerPanicked("任务未被执行".into())),
                    slot: 0,
                    start_time: 0,
                    end_time: 0,
                })
            })
            .collect();

        Schedule {
            reports,
            peak_concurrency: gauge.peak(),
            workers,
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

//! # Result Aggregator Module / 结果聚合模块
//!
//! Collects exactly one `ExecutionResult` per selected environment from
//! concurrently running tasks and emits the `RunSummary` in spec order,
//! regardless of completion order. Also owns the live output channel.
//!
//! 从并发运行的任务中为每个选中的环境收集且仅收集一个 `ExecutionResult`，
//! 并按规格顺序（而非完成顺序）生成 `RunSummary`。同时持有实时输出通道。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::error::RunError;
use crate::core::models::{ExecutionResult, RunSummary};
use crate::infra::command::{LiveSink, OutputLine};
use crate::reporting::console::print_live_line;

#[derive(Debug)]
struct Slots {
    order: Vec<String>,
    index: HashMap<String, usize>,
    results: Vec<Option<ExecutionResult>>,
}

/// Thread-safe collector of per-environment results.
/// Clones share the same slots and the same live channel.
///
/// 线程安全的按环境结果收集器。
/// 克隆共享相同的槽位和实时通道。
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    slots: Arc<Mutex<Slots>>,
    live_tx: mpsc::UnboundedSender<OutputLine>,
    live_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<OutputLine>>>>,
}

impl ResultAggregator {
    /// Creates one empty slot per environment name, in the given order.
    pub fn new(order: Vec<String>) -> Result<Self, RunError> {
        if order.is_empty() {
            return Err(RunError::NoEnvironmentsSelected { selectors: vec![] });
        }

        let index = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let results = vec![None; order.len()];
        let (live_tx, live_rx) = mpsc::unbounded_channel();

        Ok(Self {
            slots: Arc::new(Mutex::new(Slots {
                order,
                index,
                results,
            })),
            live_tx,
            live_rx: Arc::new(Mutex::new(Some(live_rx))),
        })
    }

    /// Stores the result for its environment.
    /// Rejects names outside the order and a second result for the same name.
    pub fn record(&self, result: ExecutionResult) -> Result<(), RunError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let position = *slots
            .index
            .get(&result.name)
            .ok_or_else(|| RunError::UnknownResult {
                name: result.name.clone(),
            })?;

        let slot = &mut slots.results[position];
        if slot.is_some() {
            return Err(RunError::DuplicateResult { name: result.name });
        }
        tracing::debug!(env = %result.name, status = ?result.status, "result recorded");
        *slot = Some(result);
        Ok(())
    }

    /// Number of results recorded so far.
    pub fn recorded(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.results.iter().filter(|r| r.is_some()).count()
    }

    /// Whether a result has been recorded for `name`.
    pub fn has_result(&self, name: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .index
            .get(name)
            .is_some_and(|&i| slots.results[i].is_some())
    }

    /// Builds the summary in the original order.
    /// Every slot must be filled; the first empty one is reported.
    pub fn finish(&self) -> Result<RunSummary, RunError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let results = slots
            .order
            .iter()
            .zip(&slots.results)
            .map(|(name, result)| {
                result
                    .clone()
                    .ok_or_else(|| RunError::MissingResult { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RunSummary::new(results))
    }

    /// A sender for live output lines tagged with `env`.
    pub fn live_sink(&self, env: &str) -> LiveSink {
        LiveSink::new(env, self.live_tx.clone())
    }

    /// Hands every live output line to `forward` on a background task.
    /// The receiver can only be taken once; later calls return `None`.
    /// The task ends once every clone of the aggregator and every sink is dropped.
    pub fn spawn_live_forwarder<F>(&self, mut forward: F) -> Option<JoinHandle<()>>
    where
        F: FnMut(OutputLine) + Send + 'static,
    {
        let mut rx = self
            .live_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        Some(tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                forward(line);
            }
        }))
    }

    /// Prints live output to the console, each line prefixed with its
    /// environment name. Lines of different environments may interleave.
    pub fn spawn_live_printer(&self) -> Option<JoinHandle<()>> {
        self.spawn_live_forwarder(|line| print_live_line(&line.env, &line.line))
    }
}

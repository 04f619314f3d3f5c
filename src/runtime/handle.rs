use std::sync::Arc;

use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    catalog::BookCatalog,
    core::{
        store::{ProgressStore, StoreError, SyncResult},
        sync::SyncStatus,
    },
    ledger::{Op, StoredOp},
    persist::{LedgerSink, PersistError},
    progress::{MediumConfig, ProgressInput, ProgressSnapshot},
    stats::{self, CalendarDay, DayTotals, Period, PeriodSummary, StreakSummary},
    types::{Medium, OpSeq, ProgressKey, ProgressState, ReaderId, SpeedCenti},
};
use chrono::NaiveDate;

use super::events::ProgressEvent;

/// Errors surfaced through the runtime handle.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Persistence failed or applied backpressure.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime loop has shut down.
    #[error("runtime channel closed")]
    ChannelClosed,
}

/// Batching and snapshot knobs for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Flush the journal eagerly after every report.
    pub flush_on_report: bool,
    /// Max ops buffered before a forced flush.
    pub batch_max_ops: usize,
    /// Max time an op may sit unflushed.
    pub batch_max_latency_ms: u64,
    /// Bound of the persistence queue; overflow surfaces as an error.
    pub persist_queue_bound: usize,
    /// Auto-checkpoint after this many mutations (0 disables).
    pub snapshot_every_ops: usize,
    /// Compact the journal after each snapshot.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_report: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Cloneable handle to the single-writer engine loop.
pub struct ReadlogHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<ProgressEvent>,
}

impl Clone for ReadlogHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Report {
        key: ProgressKey,
        medium: Medium,
        input: ProgressInput,
        occurred_on: NaiveDate,
        resp: oneshot::Sender<Result<SyncResult, RuntimeError>>,
    },
    MarkFinished {
        key: ProgressKey,
        occurred_on: NaiveDate,
        resp: oneshot::Sender<Result<SyncResult, RuntimeError>>,
    },
    ActivateMedium {
        key: ProgressKey,
        medium: Medium,
        config: MediumConfig,
        resp: oneshot::Sender<Result<ProgressSnapshot, RuntimeError>>,
    },
    DeactivateMedium {
        key: ProgressKey,
        medium: Medium,
        resp: oneshot::Sender<Result<ProgressSnapshot, RuntimeError>>,
    },
    SetCustomTotalPages {
        key: ProgressKey,
        total_pages: u32,
        resp: oneshot::Sender<Result<ProgressSnapshot, RuntimeError>>,
    },
    SetAudioLength {
        key: ProgressKey,
        length_secs: u64,
        resp: oneshot::Sender<Result<ProgressSnapshot, RuntimeError>>,
    },
    SetPlaybackSpeed {
        key: ProgressKey,
        speed_centi: SpeedCenti,
        resp: oneshot::Sender<Result<ProgressSnapshot, RuntimeError>>,
    },
    GetProgress {
        key: ProgressKey,
        resp: oneshot::Sender<Option<ProgressSnapshot>>,
    },
    DailyTotals {
        reader: ReaderId,
        from: NaiveDate,
        to: NaiveDate,
        resp: oneshot::Sender<Vec<DayTotals>>,
    },
    PeriodSummary {
        reader: ReaderId,
        period: Period,
        anchor: NaiveDate,
        resp: oneshot::Sender<PeriodSummary>,
    },
    Calendar {
        reader: ReaderId,
        year: i32,
        month: u32,
        resp: oneshot::Sender<Option<Vec<CalendarDay>>>,
    },
    Streaks {
        reader: ReaderId,
        from: NaiveDate,
        to: NaiveDate,
        resp: oneshot::Sender<StreakSummary>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: crate::core::store::StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Spawns the single-writer engine loop.
///
/// All mutations are serialized through one task, which gives every
/// synchronization its required per-record critical section. `catalog`
/// answers page-count lookups; its answer is snapshotted into each journaled
/// op. `sink`, when present, receives the journal on a worker task.
pub fn spawn_readlog(
    store: ProgressStore,
    catalog: Option<Box<dyn BookCatalog>>,
    sink: Option<Box<dyn LedgerSink>>,
    config: RuntimeConfig,
) -> ReadlogHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<ProgressEvent>(1024);

    let (persist_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        let catalog = catalog;
        let mut ops_since_snapshot = 0usize;

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut store,
                            catalog.as_deref(),
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            &mut ops_since_snapshot,
                        ).await;

                        if done {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        if let Some(Ok(op_seq)) = durable {
                            let _ = events_tx_loop.send(ProgressEvent::DurableUpTo { op_seq });
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut store,
                    catalog.as_deref(),
                    &events_tx_loop,
                    persist_tx_opt.as_ref(),
                    &config,
                    &mut ops_since_snapshot,
                )
                .await;
                if done {
                    break;
                }
            }
        }
    });

    ReadlogHandle { cmd_tx, events_tx }
}

impl ReadlogHandle {
    /// Subscribes to the engine's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events_tx.subscribe()
    }

    /// Reports a raw position change on one medium.
    pub async fn report(
        &self,
        key: ProgressKey,
        medium: Medium,
        input: ProgressInput,
        occurred_on: NaiveDate,
    ) -> Result<SyncResult, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Report {
                key,
                medium,
                input,
                occurred_on,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Marks the read-through finished. Idempotent.
    pub async fn mark_finished(
        &self,
        key: ProgressKey,
        occurred_on: NaiveDate,
    ) -> Result<SyncResult, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::MarkFinished {
                key,
                occurred_on,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Starts tracking an additional format.
    pub async fn activate_medium(
        &self,
        key: ProgressKey,
        medium: Medium,
        config: MediumConfig,
    ) -> Result<ProgressSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ActivateMedium {
                key,
                medium,
                config,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Stops tracking a format; its ledger history remains.
    pub async fn deactivate_medium(
        &self,
        key: ProgressKey,
        medium: Medium,
    ) -> Result<ProgressSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::DeactivateMedium {
                key,
                medium,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Sets the page-count override for a book the catalog cannot size.
    pub async fn set_custom_total_pages(
        &self,
        key: ProgressKey,
        total_pages: u32,
    ) -> Result<ProgressSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetCustomTotalPages {
                key,
                total_pages,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Fills in the audiobook length once known.
    pub async fn set_audio_length(
        &self,
        key: ProgressKey,
        length_secs: u64,
    ) -> Result<ProgressSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetAudioLength {
                key,
                length_secs,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Changes the record-level playback speed.
    pub async fn set_playback_speed(
        &self,
        key: ProgressKey,
        speed_centi: SpeedCenti,
    ) -> Result<ProgressSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetPlaybackSpeed {
                key,
                speed_centi,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Snapshot of one record, if it exists.
    pub async fn get_progress(
        &self,
        key: ProgressKey,
    ) -> Result<Option<ProgressSnapshot>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetProgress { key, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Per-day totals over an inclusive date range.
    pub async fn daily_totals(
        &self,
        reader: ReaderId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayTotals>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::DailyTotals {
                reader,
                from,
                to,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Rollup of the period around `anchor`.
    pub async fn period_summary(
        &self,
        reader: ReaderId,
        period: Period,
        anchor: NaiveDate,
    ) -> Result<PeriodSummary, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PeriodSummary {
                reader,
                period,
                anchor,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// One cell per day of the month.
    pub async fn calendar(
        &self,
        reader: ReaderId,
        year: i32,
        month: u32,
    ) -> Result<Option<Vec<CalendarDay>>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Calendar {
                reader,
                year,
                month,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Longest streak and gap over an inclusive date range.
    pub async fn streaks(
        &self,
        reader: ReaderId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<StreakSummary, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Streaks {
                reader,
                from,
                to,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Forces a journal flush; resolves with the durable sequence.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes a full snapshot to the sink.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Flushes and stops the loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    cmd: Command,
    store: &mut ProgressStore,
    catalog: Option<&dyn BookCatalog>,
    events_tx: &broadcast::Sender<ProgressEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) -> bool {
    match cmd {
        Command::Report {
            key,
            medium,
            input,
            occurred_on,
            resp,
        } => {
            let catalog_total = lookup_total(catalog, key);
            let res = store
                .report(key, medium, input, occurred_on, catalog_total)
                .map_err(RuntimeError::from)
                .and_then(|(result, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    emit_progress_events(events_tx, &result);
                    Ok(result)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
            let _ = resp.send(res);
        }
        Command::MarkFinished {
            key,
            occurred_on,
            resp,
        } => {
            let catalog_total = lookup_total(catalog, key);
            let res = store
                .mark_finished(key, occurred_on, catalog_total)
                .map_err(RuntimeError::from)
                .and_then(|(result, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    emit_progress_events(events_tx, &result);
                    Ok(result)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
            let _ = resp.send(res);
        }
        Command::ActivateMedium {
            key,
            medium,
            config: medium_config,
            resp,
        } => {
            let catalog_total = lookup_total(catalog, key);
            let res = store
                .activate_medium(key, medium, medium_config, catalog_total)
                .map_err(RuntimeError::from)
                .and_then(|(snapshot, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    Ok(snapshot)
                });
            let _ = resp.send(res);
        }
        Command::DeactivateMedium { key, medium, resp } => {
            let res = store
                .deactivate_medium(key, medium)
                .map_err(RuntimeError::from)
                .and_then(|(snapshot, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    Ok(snapshot)
                });
            let _ = resp.send(res);
        }
        Command::SetCustomTotalPages {
            key,
            total_pages,
            resp,
        } => {
            let res = store
                .set_custom_total_pages(key, total_pages)
                .map_err(RuntimeError::from)
                .and_then(|(snapshot, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    Ok(snapshot)
                });
            let _ = resp.send(res);
        }
        Command::SetAudioLength {
            key,
            length_secs,
            resp,
        } => {
            let res = store
                .set_audio_length(key, length_secs)
                .map_err(RuntimeError::from)
                .and_then(|(snapshot, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    Ok(snapshot)
                });
            let _ = resp.send(res);
        }
        Command::SetPlaybackSpeed {
            key,
            speed_centi,
            resp,
        } => {
            let res = store
                .set_playback_speed(key, speed_centi)
                .map_err(RuntimeError::from)
                .and_then(|(snapshot, stored)| {
                    publish_durability(store, events_tx, persist_tx, stored)?;
                    Ok(snapshot)
                });
            let _ = resp.send(res);
        }
        Command::GetProgress { key, resp } => {
            let catalog_total = lookup_total(catalog, key);
            let _ = resp.send(store.snapshot(key, catalog_total));
        }
        Command::DailyTotals {
            reader,
            from,
            to,
            resp,
        } => {
            let _ = resp.send(stats::daily_totals(store, reader, from, to));
        }
        Command::PeriodSummary {
            reader,
            period,
            anchor,
            resp,
        } => {
            let _ = resp.send(stats::period_summary(store, reader, period, anchor));
        }
        Command::Calendar {
            reader,
            year,
            month,
            resp,
        } => {
            let _ = resp.send(stats::calendar(store, reader, year, month));
        }
        Command::Streaks {
            reader,
            from,
            to,
            resp,
        } => {
            let _ = resp.send(stats::streaks(store, reader, from, to));
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx.send(PersistMsg::Flush { resp: flush_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = persist_tx {
                let snapshot = store.export_snapshot();
                let last_seq = store.latest_op_seq();
                let (cp_tx, cp_rx) = oneshot::channel();
                if tx
                    .send(PersistMsg::Checkpoint {
                        snapshot,
                        last_seq,
                        compact: config.compact_after_snapshot,
                        resp: cp_tx,
                    })
                    .await
                    .is_err()
                {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    cp_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                let send_res = tx.send(PersistMsg::Shutdown { resp: done_tx }).await;
                if send_res.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    match done_rx.await {
                        Ok(()) => Ok(()),
                        Err(_) => Err(RuntimeError::ChannelClosed),
                    }
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

fn lookup_total(catalog: Option<&dyn BookCatalog>, key: ProgressKey) -> Option<u32> {
    catalog.and_then(|c| c.effective_total_pages(key.book_id))
}

/// Enqueues the op for the sink (or reports durability immediately when
/// running without one).
fn publish_durability(
    store: &mut ProgressStore,
    events_tx: &broadcast::Sender<ProgressEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    stored: StoredOp,
) -> Result<(), RuntimeError> {
    // The loop forwards each op itself; the store's drain buffer is for
    // embedders that batch their own persistence.
    let _ = store.drain_pending_ops();
    if let Some(tx) = persist_tx {
        enqueue_persist(tx, stored)
    } else {
        let _ = events_tx.send(ProgressEvent::DurableUpTo {
            op_seq: store.latest_op_seq(),
        });
        Ok(())
    }
}

fn emit_progress_events(events_tx: &broadcast::Sender<ProgressEvent>, result: &SyncResult) {
    let snap = &result.snapshot;
    if result.status != SyncStatus::Advanced {
        return;
    }

    if snap.state == ProgressState::Complete {
        if let Some(completed_on) = snap.completed_on {
            info!(
                reader = snap.key.reader_id,
                book = snap.key.book_id,
                "book completed"
            );
            let _ = events_tx.send(ProgressEvent::Completed {
                progress_id: snap.progress_id,
                reader_id: snap.key.reader_id,
                book_id: snap.key.book_id,
                completed_on,
            });
            return;
        }
    }

    debug!(
        reader = snap.key.reader_id,
        book = snap.key.book_id,
        percent_centi = snap.percent_centi,
        "progress advanced"
    );
    let _ = events_tx.send(ProgressEvent::Advanced {
        progress_id: snap.progress_id,
        reader_id: snap.key.reader_id,
        book_id: snap.key.book_id,
        percent_centi: snap.percent_centi,
    });
}

fn spawn_persistence_worker(
    sink: Box<dyn LedgerSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    config: RuntimeConfig,
) {
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let mut last_durable: OpSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Op(stored) => {
                            let is_report = matches!(stored.op, Op::Report { .. } | Op::MarkFinished { .. });
                            buf.push(stored);

                            if buf.len() >= config.batch_max_ops || (config.flush_on_report && is_report) {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                                deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let flush_result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let result = if let Err(err) = flush_result {
                                Err(err)
                            } else {
                                let sink_ref = Arc::clone(&sink);
                                match tokio::task::spawn_blocking(move || {
                                    let mut sink = sink_ref.blocking_lock();
                                    sink.write_snapshot(&snapshot, last_seq)?;
                                    if compact {
                                        let _ = sink.compact_through(last_seq)?;
                                    }
                                    Result::<(), PersistError>::Ok(())
                                }).await {
                                    Ok(inner) => inner,
                                    Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                                }
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, false).await;
                    deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                }
            }
        }
    });
}

async fn flush_buf(
    sink: &Arc<Mutex<Box<dyn LedgerSink>>>,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    call_flush: bool,
) -> Result<(), PersistError> {
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.flush()
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let ops = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let append_res: Result<OpSeq, PersistError> = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let seq = sink.append_ops(&ops)?;
        if call_flush {
            sink.flush()?;
        }
        Ok(seq)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    match append_res {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            let _ = durable_tx.send(Ok(*last_durable));
            Ok(())
        }
        Err(err) => {
            warn!("journal append failed: {err}");
            let _ = durable_tx.send(Err(PersistError::Message(err.to_string())));
            Err(err)
        }
    }
}

async fn maybe_auto_checkpoint(
    store: &ProgressStore,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) {
    if config.snapshot_every_ops == 0 || *ops_since_snapshot < config.snapshot_every_ops {
        return;
    }

    let Some(tx) = persist_tx else {
        return;
    };

    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    let (cp_tx, cp_rx) = oneshot::channel();
    if tx
        .send(PersistMsg::Checkpoint {
            snapshot,
            last_seq,
            compact: config.compact_after_snapshot,
            resp: cp_tx,
        })
        .await
        .is_ok()
    {
        let _ = cp_rx.await;
        *ops_since_snapshot = 0;
    }
}

fn enqueue_persist(tx: &mpsc::Sender<PersistMsg>, stored: StoredOp) -> Result<(), RuntimeError> {
    tx.try_send(PersistMsg::Op(stored)).map_err(|err| {
        warn!("persistence queue under pressure: {err}");
        RuntimeError::Persist(PersistError::Message(format!("persist queue error: {err}")))
    })
}

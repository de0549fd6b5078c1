//! ProbeWorker - One actor per monitored machine
//!
//! ## Escalation Ladder
//!
//! Every inactivity tick (no report within the configured delay) moves the probe up:
//!
//! ```text
//! Normal ──tick──► Degraded ──d ticks──► Failed ──f ticks──► AlertedLow ──h ticks──► AlertedHigh
//!                  (degrading tick                 (low machine        (high machine
//!                   counts as the first)             alert)              alert)
//!
//! any report ──► Normal, counter = 0
//! ```
//!
//! Reports are also folded into the probe's [`TimeSeries`], and every service whose failure
//! run reaches a threshold raises a service alert tagged `<machine>-<service>`.
//!
//! ## Message Flow
//!
//! ```text
//! Registry ──Report──► mailbox (capacity 1) ──► ProbeWorker ──► AlertDispatcher
//!          ──stop────► oneshot                      │
//!                                                   └──status──► watch (read by Registry)
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    ProbeStatus,
    alerts::{AlertCategory, AlertDispatcher, Severity},
    config::MonitoringSettings,
    timeseries::{REPEAT_NOTICE_INTERVAL, ServiceEvaluation, TimeSeries, TimeSeriesNode},
    util::invariant_violation,
};

use super::messages::{ProbeCommand, ProbeState, ProbeSummary, Report};

/// Reports for a slow probe queue here; a full mailbox throttles only that probe
pub const MAILBOX_CAPACITY: usize = 1;

/// Actor owning the escalation state and history of a single machine
pub struct ProbeWorker {
    name: String,
    status: ProbeStatus,

    /// Consecutive inactivity ticks in the current status
    counter: usize,

    last_normal: DateTime<Utc>,

    /// Shared with the trimming tasks
    series: Arc<Mutex<TimeSeries>>,

    settings: MonitoringSettings,
    alerts: AlertDispatcher,

    mailbox: mpsc::Receiver<ProbeCommand>,
    stop_rx: oneshot::Receiver<()>,

    /// Published status, read by the registry when building snapshots
    status_tx: watch::Sender<ProbeStatus>,
}

impl ProbeWorker {
    pub fn new(
        name: String,
        settings: MonitoringSettings,
        alerts: AlertDispatcher,
        series: TimeSeries,
        mailbox: mpsc::Receiver<ProbeCommand>,
        stop_rx: oneshot::Receiver<()>,
        status_tx: watch::Sender<ProbeStatus>,
    ) -> Self {
        Self {
            name,
            status: ProbeStatus::Normal,
            counter: 0,
            last_normal: Utc::now(),
            series: Arc::new(Mutex::new(series)),
            settings,
            alerts,
            mailbox,
            stop_rx,
            status_tx,
        }
    }

    /// Run the actor's main loop until stopped or until its mailbox closes
    #[instrument(skip(self), fields(probe = %self.name))]
    pub async fn run(mut self) {
        debug!("starting probe worker");

        let delay = self.settings.inactivity_delay;
        let inactivity = sleep(delay);
        tokio::pin!(inactivity);

        loop {
            tokio::select! {
                biased;

                _ = &mut self.stop_rx => {
                    debug!("received stop signal");
                    break;
                }

                command = self.mailbox.recv() => {
                    match command {
                        Some(ProbeCommand::Report(report)) => {
                            self.handle_report(report).await;
                            inactivity.as_mut().reset(Instant::now() + delay);
                        }

                        Some(ProbeCommand::GetState { respond_to }) => {
                            let _ = respond_to.send(self.state().await);
                        }

                        None => {
                            warn!("mailbox closed, shutting down");
                            break;
                        }
                    }
                }

                () = &mut inactivity => {
                    self.tick();
                    inactivity.as_mut().reset(Instant::now() + delay);
                }
            }
        }

        self.mailbox.close();
        debug!("probe worker stopped");
    }

    async fn handle_report(&mut self, report: Report) {
        if report.machine != self.name {
            invariant_violation(&format!(
                "probe {} received a report for machine {}",
                self.name, report.machine
            ));
        }

        trace!(status = %self.status, services = report.services.len(), "received report");

        {
            let mut series = self.series.lock().await;
            let head = series.store(report.timestamp, &report.services);
            self.evaluate_services(head);

            if series.needs_trim() {
                self.spawn_trim();
            }
        }

        self.reset();
    }

    /// Check every service of the newest node against the alert thresholds
    fn evaluate_services(&self, head: &TimeSeriesNode) {
        let thresholds = &self.settings.thresholds;

        for (service, observation) in &head.services {
            let evaluation = ServiceEvaluation::evaluate(*observation, thresholds);
            if evaluation == ServiceEvaluation::Quiet {
                continue;
            }

            let tag = format!("{}-{service}", self.name);
            let count = observation.count;

            match evaluation {
                ServiceEvaluation::ReachesLow => {
                    warn!("service {tag} failed {count} consecutive reports");
                    self.alerts.notify(AlertCategory::Service, &tag, Severity::Low);
                }
                ServiceEvaluation::ReachesHigh => {
                    warn!("service {tag} failed {count} consecutive reports");
                    self.alerts.notify(AlertCategory::Service, &tag, Severity::High);
                }
                ServiceEvaluation::StillFailing => {
                    warn!("service {tag} is still failing after {count} consecutive reports");
                }
                ServiceEvaluation::Quiet => {}
            }
        }
    }

    /// Trim in a separate task; it serializes with stores through the series lock
    fn spawn_trim(&self) {
        let series = Arc::clone(&self.series);
        let name = self.name.clone();

        tokio::spawn(async move {
            let mut series = series.lock().await;
            let outcome = series.trim();
            trace!(probe = %name, size = series.len(), ?outcome, "trim finished");
        });
    }

    /// One inactivity tick
    fn tick(&mut self) {
        let thresholds = self.settings.thresholds;

        match self.status {
            ProbeStatus::Normal => {
                // The degrading tick is the first one counted towards Failed
                self.advance();
                self.counter = 1;
                if self.counter >= thresholds.degraded_to_failed {
                    self.advance();
                }
            }

            ProbeStatus::Degraded => {
                self.counter += 1;
                if self.counter >= thresholds.degraded_to_failed {
                    self.advance();
                }
            }

            ProbeStatus::Failed => {
                self.counter += 1;
                if self.counter >= thresholds.failed_to_alerted_low {
                    self.advance();
                    self.alerts
                        .notify(AlertCategory::Machine, &self.name, Severity::Low);
                }
            }

            ProbeStatus::AlertedLow => {
                self.counter += 1;
                if self.counter >= thresholds.alerted_low_to_alerted_high {
                    self.advance();
                    self.alerts
                        .notify(AlertCategory::Machine, &self.name, Severity::High);
                }
            }

            ProbeStatus::AlertedHigh => {
                self.counter += 1;
                if self.counter % REPEAT_NOTICE_INTERVAL == 0 {
                    warn!("machine {} is still in {} state", self.name, self.status);
                }
            }
        }
    }

    fn advance(&mut self) {
        self.status = self.status.next();
        self.counter = 0;
        self.status_tx.send_replace(self.status);

        let silent_for = Utc::now() - self.last_normal;
        warn!(
            "no report received for {}s, machine {} is now in {} state",
            silent_for.num_seconds(),
            self.name,
            self.status
        );
    }

    fn reset(&mut self) {
        if self.status > ProbeStatus::Normal {
            info!("machine {} is back in normal state", self.name);
        }

        self.status = ProbeStatus::Normal;
        self.counter = 0;
        self.last_normal = Utc::now();
        self.status_tx.send_replace(self.status);
    }

    async fn state(&self) -> ProbeState {
        ProbeState {
            name: self.name.clone(),
            status: self.status,
            counter: self.counter,
            last_normal: self.last_normal,
            series_size: self.series.lock().await.len(),
        }
    }
}

/// Handle owned by the registry for one running probe worker
pub struct ProbeHandle {
    name: String,
    mailbox: mpsc::Sender<ProbeCommand>,
    stop_tx: oneshot::Sender<()>,
    status_rx: watch::Receiver<ProbeStatus>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Spawn a worker in `Normal` state with an empty history
    pub fn spawn(
        name: impl Into<String>,
        settings: MonitoringSettings,
        alerts: AlertDispatcher,
    ) -> Self {
        Self::spawn_with_series(name, settings, alerts, TimeSeries::new())
    }

    pub fn spawn_with_series(
        name: impl Into<String>,
        settings: MonitoringSettings,
        alerts: AlertDispatcher,
        series: TimeSeries,
    ) -> Self {
        let name = name.into();
        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(ProbeStatus::Normal);

        let worker = ProbeWorker::new(
            name.clone(),
            settings,
            alerts,
            series,
            mailbox_rx,
            stop_rx,
            status_tx,
        );

        let task = tokio::spawn(worker.run());

        Self {
            name,
            mailbox: mailbox_tx,
            stop_tx,
            status_rx,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last status published by the worker
    pub fn status(&self) -> ProbeStatus {
        *self.status_rx.borrow()
    }

    pub fn summary(&self) -> ProbeSummary {
        ProbeSummary {
            name: self.name.clone(),
            status: self.status(),
        }
    }

    /// Hand a report to the worker, waiting while its mailbox is full
    pub async fn deliver(&self, report: Report) -> Result<()> {
        self.mailbox
            .send(ProbeCommand::Report(report))
            .await
            .context("probe mailbox closed")
    }

    pub async fn state(&self) -> Result<ProbeState> {
        query_state(&self.mailbox).await
    }

    /// Sender for queries that should not borrow the handle
    pub fn mailbox(&self) -> mpsc::Sender<ProbeCommand> {
        self.mailbox.clone()
    }

    /// Signal the worker to stop and wait until it has exited
    pub async fn stop(self) {
        let Self {
            name,
            stop_tx,
            task,
            ..
        } = self;

        let _ = stop_tx.send(());
        if let Err(e) = task.await {
            error!("probe worker for {name} did not stop cleanly: {e}");
        }
    }
}

/// Ask a worker for its state through its mailbox
pub async fn query_state(mailbox: &mpsc::Sender<ProbeCommand>) -> Result<ProbeState> {
    let (tx, rx) = oneshot::channel();
    mailbox
        .send(ProbeCommand::GetState { respond_to: tx })
        .await
        .context("failed to send GetState command")?;

    rx.await.context("failed to receive probe state")
}

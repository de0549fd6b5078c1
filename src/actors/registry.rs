//! Registry - Routes reports to probe workers
//!
//! The registry is the only writer of the identity → probe mapping. Every report goes
//! through its ingress queue, so creation and deletion of probes are linearized here.
//!
//! ```text
//! HTTP ──Report──► ingress ──► Registry ──┬──► ProbeHandle (web1) ──► ProbeWorker
//!                                         ├──► ProbeHandle (db1)  ──► ProbeWorker
//!                                         └──snapshot──► broadcast ──► dashboard
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use crate::{alerts::AlertDispatcher, config::MonitoringSettings, util::invariant_violation};

use super::messages::{DashboardSnapshot, ProbeState, RegistryCommand, Report};
use super::probe::{ProbeHandle, query_state};

/// Reports waiting to be routed
pub const INGRESS_CAPACITY: usize = 1024;

const COMMAND_CAPACITY: usize = 32;

pub struct Registry {
    probes: HashMap<String, ProbeHandle>,

    /// Identities in registration order, used for snapshots
    order: Vec<String>,

    settings: MonitoringSettings,
    alerts: AlertDispatcher,

    report_rx: mpsc::Receiver<Report>,
    command_rx: mpsc::Receiver<RegistryCommand>,

    dashboard_tx: Option<broadcast::Sender<DashboardSnapshot>>,
}

impl Registry {
    pub fn new(
        settings: MonitoringSettings,
        alerts: AlertDispatcher,
        report_rx: mpsc::Receiver<Report>,
        command_rx: mpsc::Receiver<RegistryCommand>,
        dashboard_tx: Option<broadcast::Sender<DashboardSnapshot>>,
    ) -> Self {
        Self {
            probes: HashMap::new(),
            order: Vec::new(),
            settings,
            alerts,
            report_rx,
            command_rx,
            dashboard_tx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting registry");

        let mut dashboard = self
            .dashboard_tx
            .as_ref()
            .and(self.settings.dashboard_interval)
            .map(|period| {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            });

        loop {
            tokio::select! {
                biased;

                Some(report) = self.report_rx.recv() => {
                    self.route(report).await;
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(RegistryCommand::Snapshot { respond_to }) => {
                            let _ = respond_to.send(self.snapshot());
                        }

                        Some(RegistryCommand::ProbeState { machine, respond_to }) => {
                            self.answer_probe_state(machine, respond_to);
                        }

                        Some(RegistryCommand::Shutdown { respond_to }) => {
                            info!("shutting down {} probe(s)", self.probes.len());
                            self.stop_all().await;
                            let _ = respond_to.send(());
                            break;
                        }

                        None => {
                            debug!("command channel closed");
                            self.stop_all().await;
                            break;
                        }
                    }
                }

                () = next_tick(&mut dashboard) => {
                    self.publish_snapshot();
                }
            }
        }

        debug!("registry stopped");
    }

    async fn route(&mut self, report: Report) {
        if report.delete {
            self.remove(&report.machine).await;
            return;
        }

        if !self.probes.contains_key(&report.machine) {
            self.register(&report.machine);
        }

        let Some(probe) = self.probes.get(&report.machine) else {
            return;
        };

        trace!(machine = %report.machine, "routing report");

        if let Err(e) = probe.deliver(report).await {
            warn!("failed to deliver report to {}: {e:#}", probe.name());
        }
    }

    fn register(&mut self, machine: &str) {
        match self.probes.entry(machine.to_string()) {
            Entry::Occupied(_) => {
                invariant_violation(&format!("probe {machine} is already registered"))
            }
            Entry::Vacant(slot) => {
                info!("registering new probe {machine}");
                let probe =
                    ProbeHandle::spawn(machine, self.settings.clone(), self.alerts.clone());
                slot.insert(probe);
                self.order.push(machine.to_string());
            }
        }
    }

    /// Unregister a probe and wait for its worker to exit
    async fn remove(&mut self, machine: &str) {
        let Some(probe) = self.probes.remove(machine) else {
            warn!("delete requested for unknown probe {machine}, ignoring");
            return;
        };

        self.order.retain(|name| name != machine);
        probe.stop().await;
        info!("probe {machine} deleted");
    }

    fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            probes: self
                .order
                .iter()
                .filter_map(|name| self.probes.get(name))
                .map(ProbeHandle::summary)
                .collect(),
        }
    }

    fn publish_snapshot(&self) {
        let Some(tx) = &self.dashboard_tx else {
            return;
        };

        let snapshot = self.snapshot();
        trace!(probes = snapshot.probes.len(), "publishing dashboard snapshot");

        // No receiver just means nobody is watching the dashboard
        let _ = tx.send(snapshot);
    }

    /// Answer from a separate task so a busy worker cannot stall routing
    fn answer_probe_state(
        &self,
        machine: String,
        respond_to: oneshot::Sender<Option<ProbeState>>,
    ) {
        let Some(mailbox) = self.probes.get(&machine).map(ProbeHandle::mailbox) else {
            let _ = respond_to.send(None);
            return;
        };

        tokio::spawn(async move {
            let state = query_state(&mailbox).await.ok();
            let _ = respond_to.send(state);
        });
    }

    async fn stop_all(&mut self) {
        self.order.clear();
        for (_, probe) in self.probes.drain() {
            probe.stop().await;
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle for submitting reports and querying the registry
#[derive(Clone)]
pub struct RegistryHandle {
    ingress: mpsc::Sender<Report>,
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry. Snapshots are broadcast only when `dashboard_tx` is set.
    pub fn spawn(
        settings: MonitoringSettings,
        alerts: AlertDispatcher,
        dashboard_tx: Option<broadcast::Sender<DashboardSnapshot>>,
    ) -> Self {
        let (ingress, report_rx) = mpsc::channel(INGRESS_CAPACITY);
        let (sender, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let registry = Registry::new(settings, alerts, report_rx, command_rx, dashboard_tx);
        tokio::spawn(registry.run());

        Self { ingress, sender }
    }

    /// Sender side of the ingress queue
    pub fn ingress(&self) -> mpsc::Sender<Report> {
        self.ingress.clone()
    }

    pub async fn submit(&self, report: Report) -> Result<()> {
        self.ingress
            .send(report)
            .await
            .context("registry ingress closed")
    }

    /// Current {name, status} of every probe, in registration order
    pub async fn snapshot(&self) -> Result<DashboardSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .context("failed to send Snapshot command")?;

        rx.await.context("failed to receive snapshot")
    }

    pub async fn probe_state(&self, machine: &str) -> Result<Option<ProbeState>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::ProbeState {
                machine: machine.to_string(),
                respond_to: tx,
            })
            .await
            .context("failed to send ProbeState command")?;

        rx.await.context("failed to receive probe state")
    }

    /// Stop every worker and the registry, waiting until they have exited
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Shutdown { respond_to: tx })
            .await
            .context("registry already stopped")?;

        rx.await.context("registry stopped before acknowledging shutdown")
    }
}

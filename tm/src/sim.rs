//! Simulated browser: one origin's shared storage plus its open tabs
//!
//! Drives real [`TabCoordinator`]s against an in-process [`StorageHub`], so
//! scenarios run the same code a tab would. Under paused tokio time the
//! timings are exact and runs are reproducible.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::election::{Jitter, RandomJitter, Role, TabCoordinator};
use crate::error::{Result, TabError};
use crate::events::{EventBus, EventLogEntry, TabEvent, create_event_bus};
use crate::identity::TabId;
use crate::storage::{HubClient, StorageHub};

/// Slack added to timer windows when waiting for a scenario to settle
pub const SETTLE_MARGIN: Duration = Duration::from_millis(20);

/// Point-in-time view of one tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabSnapshot {
    pub id: TabId,
    pub role: Role,
    pub epoch: u64,
    pub master: bool,
    pub peers: usize,
}

/// One origin with a shared storage hub and its open tabs
pub struct Browser {
    config: Config,
    hub: HubClient,
    hub_task: JoinHandle<()>,
    bus: EventBus,
    tabs: Vec<TabCoordinator>,
    opened: u64,
}

impl Browser {
    /// Start the storage hub. Must be called inside a tokio runtime.
    pub fn new(config: Config) -> Self {
        debug!("Browser::new: called");
        let hub = StorageHub::new(config.storage.clone());
        let client = hub.client();
        let hub_task = tokio::spawn(hub.run());
        let bus = create_event_bus(config.events.channel_capacity);

        Self {
            config,
            hub: client,
            hub_task,
            bus,
            tabs: Vec::new(),
            opened: 0,
        }
    }

    /// Subscribe to every tab's events
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.bus.subscribe()
    }

    /// Open a tab with the configured backoff source
    ///
    /// With `election.seed` set, the n-th tab opened gets `seed + n`, so a
    /// whole run is reproducible while tabs still draw different slots.
    pub fn open_tab(&mut self) -> Result<TabId> {
        let jitter: Box<dyn Jitter> = match self.config.election.seed {
            Some(seed) => Box::new(RandomJitter::seeded(seed.wrapping_add(self.opened))),
            None => Box::new(RandomJitter::from_entropy()),
        };
        self.open_tab_with(jitter)
    }

    /// Open a tab with an explicit backoff source
    pub fn open_tab_with(&mut self, jitter: Box<dyn Jitter>) -> Result<TabId> {
        let id = TabId::generate();
        debug!(%id, "Browser::open_tab_with: called");
        let (handle, events) = self.hub.attach(id.clone())?;

        let tab = TabCoordinator::start_with(
            id.clone(),
            std::sync::Arc::new(handle),
            events,
            self.config.election.clone(),
            jitter,
            self.bus.emitter_for(id.clone()),
        );
        self.tabs.push(tab);
        self.opened += 1;

        info!(%id, open = self.tabs.len(), "Opened tab");
        Ok(id)
    }

    /// Look up an open tab
    pub fn tab(&self, id: &TabId) -> Option<&TabCoordinator> {
        self.tabs.iter().find(|tab| tab.id() == id)
    }

    /// Ids of the open tabs, in opening order
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|tab| tab.id().clone()).collect()
    }

    fn take(&mut self, id: &TabId) -> Result<TabCoordinator> {
        let index = self
            .tabs
            .iter()
            .position(|tab| tab.id() == id)
            .ok_or_else(|| TabError::UnknownTab(id.clone()))?;
        Ok(self.tabs.remove(index))
    }

    /// Close a tab normally: unload hooks run and a Close is broadcast
    pub fn close_tab(&mut self, id: &TabId) -> Result<()> {
        debug!(%id, "Browser::close_tab: called");
        let tab = self.take(id)?;
        tab.stop();
        Ok(())
    }

    /// Kill a tab without a Close broadcast
    pub fn crash_tab(&mut self, id: &TabId) -> Result<()> {
        debug!(%id, "Browser::crash_tab: called");
        let tab = self.take(id)?;
        tab.abort();
        Ok(())
    }

    /// Roles of all open tabs, in opening order
    pub fn snapshot(&self) -> Vec<TabSnapshot> {
        self.tabs
            .iter()
            .map(|tab| {
                let status = tab.status();
                TabSnapshot {
                    id: tab.id().clone(),
                    role: status.role,
                    epoch: status.epoch,
                    master: tab.is_master(),
                    peers: tab.peers().len(),
                }
            })
            .collect()
    }

    /// Ids of the tabs that currently consider themselves master
    pub fn masters(&self) -> Vec<TabId> {
        self.tabs
            .iter()
            .filter(|tab| tab.is_master())
            .map(|tab| tab.id().clone())
            .collect()
    }

    /// The single master, if exactly one exists
    pub fn master(&self) -> Result<TabId> {
        let masters = self.masters();
        match masters.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(TabError::NoMaster),
        }
    }

    /// Let timers and deliveries run for `duration`
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Close every tab and stop the hub
    pub async fn shutdown(mut self) {
        debug!(tabs = self.tabs.len(), "Browser::shutdown: called");
        for tab in self.tabs.drain(..) {
            tab.stop();
        }
        if let Err(e) = self.hub.shutdown() {
            warn!(error = %e, "Storage hub already stopped");
        }
        if let Err(e) = (&mut self.hub_task).await {
            warn!(error = %e, "Storage hub task failed");
        }
    }
}

/// What happens to the master after the tabs have opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disruption {
    /// Master unloads normally
    CloseMaster,
    /// Master dies without a Close; a fresh tab then opens
    CrashMaster,
}

/// A scripted run of the simulated browser
#[derive(Debug, Clone)]
pub struct Scenario {
    pub tabs: usize,
    pub disruption: Option<Disruption>,
}

/// Result of a scenario run
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Roles once every tab has opened
    pub opened: Vec<TabSnapshot>,
    pub disruption: Option<Disruption>,
    /// Tab removed by the disruption
    pub removed: Option<TabId>,
    /// Roles after the maximum election window
    pub settled: Vec<TabSnapshot>,
    pub masters: usize,
    pub events: Vec<EventLogEntry>,
}

fn drain(rx: &mut broadcast::Receiver<TabEvent>, out: &mut Vec<EventLogEntry>) {
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(EventLogEntry::new(event)),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                warn!(missed, "Event log lagged");
            }
            Err(_) => break,
        }
    }
}

/// Run a scenario to completion
///
/// Tabs open one claim window apart, which is how a user opens tabs; opens
/// inside one window race and may leave no master.
pub async fn run_scenario(config: Config, scenario: Scenario) -> Result<SimulationReport> {
    info!(tabs = scenario.tabs, disruption = ?scenario.disruption, "Running scenario");
    let claim_window = config.election.claim_delay() + SETTLE_MARGIN;
    let election_window = config.election.max_election_window() + SETTLE_MARGIN;

    let mut browser = Browser::new(config);
    let mut rx = browser.subscribe();
    let mut events = Vec::new();

    for _ in 0..scenario.tabs {
        browser.open_tab()?;
        browser.settle(claim_window).await;
        drain(&mut rx, &mut events);
    }
    let opened = browser.snapshot();

    let removed = match scenario.disruption {
        Some(disruption) => {
            let master = browser.master()?;
            match disruption {
                Disruption::CloseMaster => browser.close_tab(&master)?,
                Disruption::CrashMaster => {
                    browser.crash_tab(&master)?;
                    browser.open_tab()?;
                }
            }
            browser.settle(election_window).await;
            drain(&mut rx, &mut events);
            Some(master)
        }
        None => None,
    };

    let settled = browser.snapshot();
    let masters = browser.masters().len();
    browser.shutdown().await;
    drain(&mut rx, &mut events);

    Ok(SimulationReport {
        opened,
        disruption: scenario.disruption,
        removed,
        settled,
        masters,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::SequenceJitter;

    #[tokio::test(start_paused = true)]
    async fn test_open_and_close_tabs() {
        let mut browser = Browser::new(Config::default());
        let a = browser.open_tab().unwrap();
        browser.settle(Duration::from_millis(100)).await;
        let b = browser.open_tab().unwrap();
        browser.settle(Duration::from_millis(100)).await;

        assert_eq!(browser.masters(), vec![a.clone()]);
        assert_eq!(browser.tab_ids(), vec![a.clone(), b.clone()]);

        browser.close_tab(&a).unwrap();
        browser.settle(Duration::from_millis(10)).await;
        assert_eq!(browser.master().unwrap(), b);

        browser.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tab() {
        let mut browser = Browser::new(Config::default());
        let err = browser.close_tab(&TabId::from("nope")).unwrap_err();
        assert!(matches!(err, TabError::UnknownTab(_)));
        assert!(matches!(browser.master(), Err(TabError::NoMaster)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_roles() {
        let mut browser = Browser::new(Config::default());
        browser.open_tab_with(Box::new(SequenceJitter::new([0]))).unwrap();
        browser.settle(Duration::from_millis(100)).await;
        browser.open_tab_with(Box::new(SequenceJitter::new([0]))).unwrap();
        browser.settle(Duration::from_millis(100)).await;

        let snapshot = browser.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, Role::Master);
        assert_eq!(snapshot[0].peers, 1);
        assert_eq!(snapshot[1].role, Role::Standby);
        assert_eq!(snapshot[1].peers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scenario_close_master() {
        let mut config = Config::default();
        config.election.seed = Some(3);

        let report = run_scenario(
            config,
            Scenario {
                tabs: 1,
                disruption: Some(Disruption::CloseMaster),
            },
        )
        .await
        .unwrap();

        assert_eq!(report.opened.len(), 1);
        assert!(report.settled.is_empty());
        assert_eq!(report.masters, 0);
        assert!(report.removed.is_some());
        assert!(
            report
                .events
                .iter()
                .any(|entry| matches!(entry.event, TabEvent::TabClosed { was_master: true, .. }))
        );
    }
}

//! LoginGate - whether this tab may show an interactive login
//!
//! Only the master tab prompts for credentials; other tabs wait for the
//! master to finish. The gate resolves the master decision once, then follows
//! the tab's events so a standby tab that wins a later election opens up.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::election::{ElectionStatus, TabCoordinator};
use crate::events::TabEvent;
use crate::identity::TabId;

/// Follows one tab's master status as a `watch::Receiver<bool>`
pub struct LoginGate {
    permitted: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl LoginGate {
    /// Attach a gate to a running tab
    pub fn new(tab: &TabCoordinator) -> Self {
        debug!(tab_id = %tab.id(), "LoginGate::new: called");
        let (tx, permitted) = watch::channel(false);
        // Subscribe before the first await so no ElectionStarted is missed
        let events = tab.subscribe();
        let task = tokio::spawn(follow(tab.id().clone(), tab.watch_status(), events, tx));
        Self { permitted, task }
    }

    /// Whether login is currently permitted
    pub fn is_permitted(&self) -> bool {
        *self.permitted.borrow()
    }

    /// Watch the permission flag
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.permitted.clone()
    }

    /// Wait until login is permitted
    ///
    /// Returns false if the tab stops before that happens.
    pub async fn wait_permitted(&self) -> bool {
        let mut rx = self.permitted.clone();
        rx.wait_for(|permitted| *permitted).await.is_ok()
    }
}

impl Drop for LoginGate {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn resolve(status: &mut watch::Receiver<ElectionStatus>) -> Option<bool> {
    match status.wait_for(|s| s.decided.is_some()).await {
        Ok(s) => s.decided,
        Err(_) => None,
    }
}

async fn follow(
    tab_id: TabId,
    mut status: watch::Receiver<ElectionStatus>,
    mut events: broadcast::Receiver<TabEvent>,
    tx: watch::Sender<bool>,
) {
    let Some(master) = resolve(&mut status).await else {
        return;
    };
    tx.send_replace(master);
    debug!(%tab_id, master, "follow: initial decision");

    loop {
        match events.recv().await {
            Ok(TabEvent::ElectionStarted { tab_id: from, epoch, .. }) if from == tab_id => {
                debug!(%tab_id, epoch, "follow: master closed, re-checking");
                let Some(master) = resolve(&mut status).await else {
                    break;
                };
                if master {
                    info!(%tab_id, epoch, "Login permitted after master change");
                }
                tx.send_replace(master);
            }
            Ok(TabEvent::MasterChanged { tab_id: from, is_master, .. }) if from == tab_id => {
                tx.send_replace(is_master);
            }
            Ok(TabEvent::TabClosed { tab_id: from, .. }) if from == tab_id => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(%tab_id, missed, "follow: lagged, using current status");
                let master = status.borrow().decided == Some(true);
                tx.send_replace(master);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tx.send_replace(false);
}

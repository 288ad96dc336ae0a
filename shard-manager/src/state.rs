use std::collections::HashMap;

use shardkv_common::rpc::Stub;
use shardkv_common::wire::PingResponse;
use tokio::time::Instant;
use tracing::info;

use crate::view::{View, Views};

/// Everything the Manager's single lock guards: the view log, the last time
/// each server pinged, and a cached stub to the current primary.
pub struct ManagerState {
    views: Views,
    last_ping: HashMap<String, Instant>,
    primary_stub: Option<Stub>,
    shardmaster_address: String,
}

impl ManagerState {
    pub fn new(shardmaster_address: String) -> Self {
        Self {
            views: Views::default(),
            last_ping: HashMap::new(),
            primary_stub: None,
            shardmaster_address,
        }
    }

    /// A clone of the cached primary stub, if any — callers must release the
    /// state lock before issuing a call on the returned stub.
    pub fn primary_stub(&self) -> Option<Stub> {
        self.primary_stub.clone()
    }

    fn response(&self) -> PingResponse {
        let view = self.views.current();
        PingResponse {
            id: self.views.current_index() as u64,
            primary: view.primary.clone(),
            backup: view.backup.clone(),
            shardmaster: self.shardmaster_address.clone(),
        }
    }

    /// The Ping state machine: election, acknowledgement, backup promotion,
    /// and idle bookkeeping.
    pub fn ping(&mut self, server: &str, view_number: u64, now: Instant) -> PingResponse {
        self.last_ping.insert(server.to_string(), now);

        if self.views.current_index() == 0 {
            self.views.push(View::new(server, ""));
            self.views.try_advance();
            self.primary_stub = Some(Stub::new(server));
            info!(server, "elected first primary");
            return self.response();
        }

        let current_primary = self.views.current().primary.clone();
        let current_backup = self.views.current().backup.clone();

        if server == current_primary {
            self.views.acknowledge(view_number as usize);
            if self.views.try_advance() {
                let new_primary = self.views.current().primary.clone();
                self.primary_stub = Some(Stub::new(new_primary));
                info!(view = self.views.current_index(), "advanced view");
            }
        } else if server == current_backup {
            // timestamp already recorded above, nothing else to do.
        } else if current_backup.is_empty() {
            self.views.promote_backup(server);
            info!(server, "promoted to backup");
        } else {
            self.views.add_idle(server);
        }

        self.response()
    }

    /// Returns true if a death was processed (at most one per tick).
    pub fn check_heartbeats(&mut self, dead_interval: std::time::Duration, now: Instant) -> bool {
        let primary = self.views.current().primary.clone();
        let backup = self.views.current().backup.clone();

        if !primary.is_empty() && self.is_dead(&primary, dead_interval, now) {
            assert_eq!(
                self.views.current_index(),
                self.views.acknowledged_index(),
                "primary declared dead while an unacknowledged view transition is outstanding"
            );
            self.views.promote_backup_to_primary();
            let new_primary = self.views.current().primary.clone();
            self.primary_stub = if new_primary.is_empty() {
                None
            } else {
                Some(Stub::new(new_primary))
            };
            info!(primary, "primary declared dead, promoted backup");
            return true;
        }

        if !backup.is_empty() && self.is_dead(&backup, dead_interval, now) {
            self.views.drop_backup();
            info!(backup, "backup declared dead");
            return true;
        }

        false
    }

    fn is_dead(&self, server: &str, dead_interval: std::time::Duration, now: Instant) -> bool {
        match self.last_ping.get(server) {
            Some(last) => now.duration_since(*last) > dead_interval,
            None => false,
        }
    }

    /// A snapshot of the currently-exposed view, e.g. for tests and admin tooling.
    pub fn current_view(&self) -> View {
        self.views.current().clone()
    }

    pub fn current_index(&self) -> usize {
        self.views.current_index()
    }
}

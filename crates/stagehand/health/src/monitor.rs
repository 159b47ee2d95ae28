//! Health monitor for external link channels.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use stagehand_types::{ChannelHealth, FallbackAction, LinkChannel, PlanId, StageId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{HealthConfig, HealthError, HealthResult, HeartbeatSource};

/// Events emitted by the health monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthEvent {
    /// Channel was declared for monitoring.
    ChannelDeclared(String),

    /// Channel health changed.
    StatusChanged {
        channel: String,
        from: ChannelHealth,
        to: ChannelHealth,
    },

    /// A declared fallback was engaged for an unhealthy channel.
    FallbackEngaged {
        channel: String,
        health: ChannelHealth,
        action: FallbackAction,
    },

    /// A critical channel failed and was escalated.
    Escalated { channel: String, health: ChannelHealth },

    /// A stage exceeded its SLA.
    SlaBreached {
        plan_id: PlanId,
        stage_id: StageId,
        sla_ms: u64,
    },
}

/// How a dependent plan should treat a channel right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackResolution {
    Healthy,
    /// Continue under the declared fallback
    Fallback {
        channel: String,
        health: ChannelHealth,
        action: FallbackAction,
    },
    /// Critical path failure; fatal for dependent plans
    Escalate { channel: String, health: ChannelHealth },
}

impl FallbackResolution {
    pub fn into_result(self) -> HealthResult<Option<(String, FallbackAction)>> {
        match self {
            FallbackResolution::Healthy => Ok(None),
            FallbackResolution::Fallback { channel, action, .. } => Ok(Some((channel, action))),
            FallbackResolution::Escalate { channel, health } => {
                Err(HealthError::CriticalChannelDown { channel, health })
            }
        }
    }
}

/// Tracks every declared channel and resolves fallbacks.
pub struct HealthMonitor {
    config: HealthConfig,
    channels: DashMap<String, LinkChannel>,
    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            config,
            channels: DashMap::new(),
            event_tx,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Subscribe to health events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Declare a channel and its fallback. Starts `Unknown`.
    #[instrument(skip(self))]
    pub fn declare_channel(&self, name: &str, fallback: FallbackAction) -> HealthResult<()> {
        if self.channels.contains_key(name) {
            return Err(HealthError::ChannelAlreadyDeclared(name.to_string()));
        }
        info!(channel = name, fallback = %fallback, "Channel declared");
        self.channels
            .insert(name.to_string(), LinkChannel::new(name, fallback));
        let _ = self.event_tx.send(HealthEvent::ChannelDeclared(name.to_string()));
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Record a heartbeat: the channel is alive and healthy
    pub fn heartbeat(&self, name: &str) -> HealthResult<()> {
        self.report_at(name, ChannelHealth::Healthy, Utc::now())
    }

    /// Record a status reported by the channel or its health source
    pub fn report(&self, name: &str, health: ChannelHealth) -> HealthResult<()> {
        self.report_at(name, health, Utc::now())
    }

    pub fn report_at(&self, name: &str, health: ChannelHealth, at: DateTime<Utc>) -> HealthResult<()> {
        let previous = {
            let mut channel = self
                .channels
                .get_mut(name)
                .ok_or_else(|| HealthError::ChannelNotFound(name.to_string()))?;
            let previous = channel.health;
            channel.health = health;
            channel.last_heartbeat = Some(at);
            previous
        };
        debug!(channel = name, health = %health, "Channel report received");
        if previous != health {
            self.status_changed(name, previous, health);
        }
        Ok(())
    }

    fn status_changed(&self, name: &str, from: ChannelHealth, to: ChannelHealth) {
        if to.is_healthy() {
            info!(channel = name, from = %from, "Channel recovered");
        } else {
            warn!(channel = name, from = %from, to = %to, "Channel health changed");
        }
        let _ = self.event_tx.send(HealthEvent::StatusChanged {
            channel: name.to_string(),
            from,
            to,
        });
    }

    /// Age channels whose heartbeats are stale as of `now`.
    ///
    /// Only ever downgrades; recovery requires a fresh report. Channels
    /// that never reported stay `Unknown`. Returns the channels changed.
    pub fn refresh(&self, now: DateTime<Utc>) -> Vec<(String, ChannelHealth)> {
        let interval_ms = (self.config.heartbeat_interval().as_millis() as i64).max(1);
        let mut changed = Vec::new();

        for mut entry in self.channels.iter_mut() {
            let Some(last) = entry.last_heartbeat else {
                continue;
            };
            let missed = ((now - last).num_milliseconds().max(0) / interval_ms) as u64;
            let aged = if missed >= self.config.down_after_missed as u64 {
                ChannelHealth::Down
            } else if missed >= self.config.degraded_after_missed as u64 {
                ChannelHealth::Degraded
            } else {
                continue;
            };
            if severity(aged) > severity(entry.health) {
                let from = entry.health;
                entry.health = aged;
                changed.push((entry.key().clone(), from, aged));
            }
        }

        changed
            .into_iter()
            .map(|(name, from, to)| {
                self.status_changed(&name, from, to);
                (name, to)
            })
            .collect()
    }

    pub fn health(&self, name: &str) -> Option<ChannelHealth> {
        self.channels.get(name).map(|c| c.health)
    }

    pub fn channel(&self, name: &str) -> Option<LinkChannel> {
        self.channels.get(name).map(|c| c.clone())
    }

    /// Every declared channel, sorted by name
    pub fn channels(&self) -> Vec<LinkChannel> {
        let mut channels: Vec<LinkChannel> = self.channels.iter().map(|c| c.clone()).collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    /// Resolve how a dependent plan should treat `name`.
    ///
    /// `Unknown` is treated like `Degraded` until the first report.
    pub fn resolve(&self, name: &str) -> HealthResult<FallbackResolution> {
        let channel = self
            .channel(name)
            .ok_or_else(|| HealthError::ChannelNotFound(name.to_string()))?;

        if channel.health.is_healthy() {
            return Ok(FallbackResolution::Healthy);
        }
        if channel.fallback.is_critical() {
            error!(channel = name, health = %channel.health, "Critical channel unavailable");
            let _ = self.event_tx.send(HealthEvent::Escalated {
                channel: channel.name.clone(),
                health: channel.health,
            });
            return Ok(FallbackResolution::Escalate {
                channel: channel.name,
                health: channel.health,
            });
        }

        warn!(
            channel = name,
            health = %channel.health,
            fallback = %channel.fallback,
            "Engaging declared fallback"
        );
        let _ = self.event_tx.send(HealthEvent::FallbackEngaged {
            channel: channel.name.clone(),
            health: channel.health,
            action: channel.fallback,
        });
        Ok(FallbackResolution::Fallback {
            channel: channel.name,
            health: channel.health,
            action: channel.fallback,
        })
    }

    /// Signal that a stage exceeded its SLA
    pub fn record_sla_breach(&self, plan_id: &PlanId, stage_id: &StageId, sla_ms: u64) {
        warn!(plan_id = %plan_id, stage_id = %stage_id, sla_ms, "Stage SLA breached");
        let _ = self.event_tx.send(HealthEvent::SlaBreached {
            plan_id: plan_id.clone(),
            stage_id: stage_id.clone(),
            sla_ms,
        });
    }

    /// Poll `source` every `interval`, applying its reports and then
    /// ageing stale channels. Abort the handle to stop.
    pub fn spawn_poller(self: &Arc<Self>, source: Arc<dyn HeartbeatSource>, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match source.poll().await {
                    Ok(reports) => {
                        for (name, health) in reports {
                            if let Err(e) = monitor.report(&name, health) {
                                debug!(channel = %name, error = %e, "Ignoring report for undeclared channel");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Heartbeat poll failed");
                    }
                }
                monitor.refresh(Utc::now());
            }
        })
    }
}

fn severity(health: ChannelHealth) -> u8 {
    match health {
        ChannelHealth::Healthy => 0,
        ChannelHealth::Unknown => 1,
        ChannelHealth::Degraded => 2,
        ChannelHealth::Down => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    fn monitor() -> HealthMonitor {
        let monitor = HealthMonitor::new(HealthConfig {
            heartbeat_interval_ms: 1_000,
            degraded_after_missed: 1,
            down_after_missed: 3,
        });
        monitor.declare_channel("federation", FallbackAction::LocalOnly).unwrap();
        monitor.declare_channel("ledger", FallbackAction::CriticalNoFallback).unwrap();
        monitor
    }

    #[test]
    fn declared_channels_start_unknown() {
        let monitor = monitor();
        assert_eq!(monitor.health("federation"), Some(ChannelHealth::Unknown));
        assert!(matches!(
            monitor.declare_channel("federation", FallbackAction::UseCachedState),
            Err(HealthError::ChannelAlreadyDeclared(_))
        ));
    }

    #[test]
    fn healthy_channel_resolves_healthy() {
        let monitor = monitor();
        monitor.heartbeat("federation").unwrap();
        assert_eq!(monitor.resolve("federation").unwrap(), FallbackResolution::Healthy);
    }

    #[test]
    fn down_channel_resolves_to_declared_fallback() {
        let monitor = monitor();
        monitor.report("federation", ChannelHealth::Down).unwrap();

        let resolution = monitor.resolve("federation").unwrap();
        assert_eq!(
            resolution,
            FallbackResolution::Fallback {
                channel: "federation".into(),
                health: ChannelHealth::Down,
                action: FallbackAction::LocalOnly,
            }
        );
        assert_eq!(
            resolution.into_result().unwrap(),
            Some(("federation".to_string(), FallbackAction::LocalOnly))
        );
    }

    #[test]
    fn critical_channel_escalates() {
        let monitor = monitor();
        monitor.report("ledger", ChannelHealth::Degraded).unwrap();

        let err = monitor.resolve("ledger").unwrap().into_result().unwrap_err();
        assert!(matches!(err, HealthError::CriticalChannelDown { .. }));
        assert_eq!(err.code(), stagehand_types::ErrorCode::ExecutionFatal);
    }

    #[test]
    fn undeclared_channel_is_an_error() {
        assert!(matches!(
            monitor().resolve("ghost"),
            Err(HealthError::ChannelNotFound(_))
        ));
        assert!(monitor().heartbeat("ghost").is_err());
    }

    #[test]
    fn refresh_ages_stale_heartbeats() {
        let monitor = monitor();
        let t0 = Utc::now();
        monitor.report_at("federation", ChannelHealth::Healthy, t0).unwrap();

        assert!(monitor.refresh(t0 + ChronoDuration::milliseconds(500)).is_empty());

        let changed = monitor.refresh(t0 + ChronoDuration::milliseconds(1_500));
        assert_eq!(changed, vec![("federation".to_string(), ChannelHealth::Degraded)]);

        monitor.refresh(t0 + ChronoDuration::milliseconds(3_100));
        assert_eq!(monitor.health("federation"), Some(ChannelHealth::Down));

        // never reported
        assert_eq!(monitor.health("ledger"), Some(ChannelHealth::Unknown));
    }

    #[test]
    fn refresh_never_upgrades() {
        let monitor = monitor();
        let t0 = Utc::now();
        monitor.report_at("federation", ChannelHealth::Down, t0).unwrap();
        assert!(monitor.refresh(t0 + ChronoDuration::milliseconds(1_500)).is_empty());
        assert_eq!(monitor.health("federation"), Some(ChannelHealth::Down));
    }

    #[tokio::test]
    async fn status_changes_are_broadcast() {
        let monitor = monitor();
        let mut events = monitor.subscribe();

        monitor.report("federation", ChannelHealth::Down).unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            HealthEvent::StatusChanged {
                channel: "federation".into(),
                from: ChannelHealth::Unknown,
                to: ChannelHealth::Down,
            }
        );
    }

    struct StaticSource(Vec<(String, ChannelHealth)>);

    #[async_trait]
    impl HeartbeatSource for StaticSource {
        async fn poll(&self) -> HealthResult<Vec<(String, ChannelHealth)>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn poller_applies_reports() {
        let monitor = Arc::new(monitor());
        let source = Arc::new(StaticSource(vec![
            ("federation".into(), ChannelHealth::Healthy),
            ("ghost".into(), ChannelHealth::Down),
        ]));

        let handle = monitor.spawn_poller(source, Duration::from_millis(10));
        for _ in 0..50 {
            if monitor.health("federation") == Some(ChannelHealth::Healthy) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(monitor.health("federation"), Some(ChannelHealth::Healthy));
    }
}

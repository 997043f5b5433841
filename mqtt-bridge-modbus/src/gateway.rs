//! Gateway orchestrator.
//!
//! Owns the transport and the bus handle, drives polling through
//! [`Gateway::step`] and routes inbound commands through
//! [`Gateway::on_command`]. Both run on the same task, so transport calls
//! are never concurrent.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use plcgate_bridge_framework::{Bus, BusEvent, PublishStats};
use plcgate_common::TopicBuilder;

use crate::availability::AvailabilityMonitor;
use crate::command::{self, CommandKind};
use crate::discovery::{self, DiscoverySettings};
use crate::entity::Publish;
use crate::error::GatewayError;
use crate::machine::suffix;
use crate::scheduler::PollScheduler;
use crate::transport::Transport;

/// Runtime settings of the gateway loop.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub topic_prefix: String,
    pub availability_topic: String,
    pub discovery: DiscoverySettings,
    /// Pause between two steps.
    pub tick: Duration,
    /// Pause after a failed transport call.
    pub retry_backoff: Duration,
    pub probe_address: u16,
}

/// Entity addressed by a command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Route {
    job: usize,
    entity: usize,
    kind: CommandKind,
}

/// Mirrors one Modbus device onto the bus.
pub struct Gateway<T: Transport, B: Bus> {
    transport: T,
    bus: B,
    scheduler: PollScheduler,
    availability: AvailabilityMonitor,
    settings: GatewaySettings,
    routes: HashMap<String, Route>,
    subscriptions: Vec<String>,
    stats: PublishStats,
    now_ms: u64,
}

impl<T: Transport, B: Bus> Gateway<T, B> {
    pub fn new(transport: T, bus: B, scheduler: PollScheduler, settings: GatewaySettings) -> Self {
        let topics = TopicBuilder::new(&settings.topic_prefix);
        let mut routes = HashMap::new();
        let mut subscriptions = Vec::new();

        for (job_index, job) in scheduler.jobs().iter().enumerate() {
            let group = job.group();
            if !group.accepts_commands() {
                continue;
            }
            let kinds = command::command_kinds(group.entity_type.machine());

            for &kind in kinds {
                subscriptions.push(topics.group_wildcard(&group.id, command_suffix(kind)));
            }
            for (entity_index, entity) in job.entities().iter().enumerate() {
                if entity.descriptor.is_inert() {
                    continue;
                }
                for &kind in kinds {
                    routes.insert(
                        entity.descriptor.topic(command_suffix(kind)),
                        Route {
                            job: job_index,
                            entity: entity_index,
                            kind,
                        },
                    );
                }
            }
        }

        let availability = AvailabilityMonitor::new(settings.retry_backoff, settings.probe_address);

        Self {
            transport,
            bus,
            scheduler,
            availability,
            settings,
            routes,
            subscriptions,
            stats: PublishStats::default(),
            now_ms: 0,
        }
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn availability(&self) -> &AvailabilityMonitor {
        &self.availability
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Topic filters the gateway listens on.
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// Run one poll iteration at `now_ms`.
    ///
    /// While the device is unavailable only a probe is attempted; the next
    /// step after a successful probe resumes polling.
    pub async fn step(&mut self, now_ms: u64) {
        self.now_ms = now_ms;

        if !self.availability.is_available() {
            match self.availability.probe(&mut self.transport).await {
                Ok(()) => {
                    if self.availability.record_success(now_ms) {
                        info!("Modbus device available");
                        self.announce_availability().await;
                    }
                }
                Err(e) => {
                    let error = GatewayError::from(e);
                    debug!(error = %error, "Probe failed");
                    self.availability.record_failure(now_ms, &error);
                    self.availability.backoff().await;
                }
            }
            return;
        }

        let mut out = Vec::new();
        let result = self
            .scheduler
            .tick(&mut self.transport, now_ms, &mut out)
            .await;
        self.publish_all(out).await;

        if let Err(e) = result {
            self.mark_unavailable(&e).await;
        }
    }

    /// Route one inbound message to a device write.
    ///
    /// Unknown topics and unrecognized payloads are logged and dropped; a
    /// failed write marks the device unavailable.
    pub async fn on_command(&mut self, topic: &str, payload: &str) {
        let Some(route) = self.routes.get(topic).copied() else {
            debug!(topic = %topic, "No entity listens on topic");
            return;
        };
        if !self.availability.is_available() {
            warn!(topic = %topic, payload = %payload, "Device unavailable, dropping command");
            return;
        }

        let job = &self.scheduler.jobs()[route.job];
        let entity = &job.entities()[route.entity];
        let request = match command::decode(route.kind, job.group(), entity, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(topic = %topic, payload = %payload, error = %e, "Ignoring command");
                return;
            }
        };

        info!(topic = %topic, payload = %payload, request = ?request, "Writing to device");
        if let Err(e) = request.apply(&mut self.transport).await {
            self.mark_unavailable(&GatewayError::from(e)).await;
        }
    }

    /// Subscribe to command topics and announce every entity.
    ///
    /// Called on every (re)connection to the broker, which may have fired
    /// the Last Will in between.
    pub async fn announce(&mut self) {
        for filter in &self.subscriptions {
            if let Err(e) = self.bus.subscribe(filter).await {
                warn!(filter = %filter, error = %e, "Failed to subscribe");
            }
        }

        let mut announced = 0;
        for job in self.scheduler.jobs() {
            for entity in job.entities() {
                let Some(message) = discovery::discovery_message(
                    &self.settings.discovery,
                    &self.settings.availability_topic,
                    job.group(),
                    &entity.descriptor,
                ) else {
                    continue;
                };
                let outcome = self
                    .bus
                    .publish(&message.topic, &message.payload.to_string(), true)
                    .await;
                if outcome.is_ok() {
                    announced += 1;
                }
                self.stats.record(outcome);
            }
        }
        info!(
            entities = announced,
            subscriptions = self.subscriptions.len(),
            "Announced discovery"
        );

        self.announce_availability().await;
    }

    /// React to one bus event.
    pub async fn handle_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::Connected => self.announce().await,
            BusEvent::Disconnected => info!("Bus disconnected, commands paused"),
            BusEvent::Message { topic, payload } => self.on_command(&topic, &payload).await,
        }
    }

    /// Drive the gateway until the event channel closes.
    ///
    /// Pending bus events are drained before every step.
    pub async fn run(mut self, mut events: mpsc::Receiver<BusEvent>) {
        let started = Instant::now();
        info!(
            groups = self.scheduler.jobs().len(),
            entities = self.scheduler.entity_count(),
            tick_ms = self.settings.tick.as_millis() as u64,
            "Starting poll loop"
        );

        loop {
            loop {
                match events.try_recv() {
                    Ok(event) => self.handle_event(event).await,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        let stats = self.stats();
                        info!(
                            published = stats.success,
                            failed = stats.failed,
                            attempted = stats.total(),
                            "Bus event channel closed, stopping poll loop"
                        );
                        return;
                    }
                }
            }

            let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.step(now_ms).await;
            tokio::time::sleep(self.settings.tick).await;
        }
    }

    async fn announce_availability(&mut self) {
        let payload = self.availability.state().payload();
        let outcome = self
            .bus
            .publish(&self.settings.availability_topic, payload, true)
            .await;
        self.stats.record(outcome);
    }

    async fn publish_all(&mut self, publishes: Vec<Publish>) {
        for publish in publishes {
            let outcome = self
                .bus
                .publish(&publish.topic, &publish.payload, publish.retain)
                .await;
            self.stats.record(outcome);
        }
    }

    /// Handle a transport failure: announce offline once, forget all state,
    /// then back off.
    async fn mark_unavailable(&mut self, error: &GatewayError) {
        if self.availability.record_failure(self.now_ms, error) {
            warn!(error = %error, "Modbus device unavailable");
            self.announce_availability().await;
        }
        self.scheduler.reset_all();
        self.availability.backoff().await;
    }
}

fn command_suffix(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Set => suffix::SET,
        CommandKind::Config => suffix::CONFIG,
    }
}

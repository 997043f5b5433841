//! Cooperative group polling.

use tracing::{debug, trace};

use crate::entity::{DataKind, Entity, GroupDescriptor, Publish};
use crate::error::GatewayError;
use crate::transport::Transport;

/// One group of entities polled together at a fixed interval.
#[derive(Debug, Clone)]
pub struct PollJob {
    group: GroupDescriptor,
    /// Every entity of the group in index order, inert ones included.
    entities: Vec<Entity>,
    interval_ms: u64,
    last_polled_at_ms: Option<u64>,
}

impl PollJob {
    pub fn new(group: GroupDescriptor, entities: Vec<Entity>, interval_ms: u64) -> Self {
        Self {
            group,
            entities,
            interval_ms,
            last_polled_at_ms: None,
        }
    }

    pub fn group(&self) -> &GroupDescriptor {
        &self.group
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Due when never polled or the interval has strictly elapsed.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_polled_at_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > self.interval_ms,
        }
    }

    /// Number of bits or words covering the whole group.
    pub fn read_len(&self) -> usize {
        usize::from(self.group.words_per_item) * self.entities.len()
    }

    /// Read the whole group and feed every named entity its window.
    ///
    /// Publishes are appended to `out` only when the whole group succeeded;
    /// on error `last_polled_at_ms` is left untouched.
    pub async fn poll<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ms: u64,
        out: &mut Vec<Publish>,
    ) -> Result<(), GatewayError> {
        let expected = self.read_len();
        let mismatch = |actual: usize| GatewayError::DataLengthMismatch {
            group: self.group.id.clone(),
            expected,
            actual,
        };
        let count = u16::try_from(expected).map_err(|_| mismatch(0))?;
        let address = self.group.read_offset;

        let words: Vec<u16> = match self.group.data_kind {
            DataKind::Bit => transport
                .read_bits(address, count)
                .await?
                .into_iter()
                .map(u16::from)
                .collect(),
            DataKind::Register => transport.read_registers(address, count).await?,
        };
        if words.len() != expected {
            return Err(mismatch(words.len()));
        }
        trace!(group = %self.group.id, address, count, "Group read");

        let width = usize::from(self.group.words_per_item);
        let mut publishes = Vec::new();
        for (entity, window) in self.entities.iter_mut().zip(words.chunks(width)) {
            if entity.descriptor.is_inert() {
                continue;
            }
            publishes.extend(entity.process(&self.group, now_ms, window)?);
        }

        if !publishes.is_empty() {
            debug!(group = %self.group.id, changes = publishes.len(), "Group changed");
        }
        self.last_polled_at_ms = Some(now_ms);
        out.append(&mut publishes);
        Ok(())
    }

    /// Forget every entity's state and make the group due immediately.
    pub fn reset(&mut self) {
        for entity in &mut self.entities {
            entity.reset();
        }
        self.last_polled_at_ms = None;
    }
}

/// Runs due poll jobs, one tick at a time.
#[derive(Debug, Clone, Default)]
pub struct PollScheduler {
    jobs: Vec<PollJob>,
}

impl PollScheduler {
    pub fn new(jobs: Vec<PollJob>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &[PollJob] {
        &self.jobs
    }

    /// Named entities across all jobs.
    pub fn entity_count(&self) -> usize {
        self.jobs
            .iter()
            .flat_map(|job| job.entities())
            .filter(|entity| !entity.descriptor.is_inert())
            .count()
    }

    /// Poll every due job in configuration order.
    ///
    /// Stops at the first failing job; publishes of jobs that completed
    /// before it stay in `out`. Returns the number of jobs polled.
    pub async fn tick<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ms: u64,
        out: &mut Vec<Publish>,
    ) -> Result<usize, GatewayError> {
        let mut polled = 0;
        for job in &mut self.jobs {
            if job.is_due(now_ms) {
                job.poll(transport, now_ms, out).await?;
                polled += 1;
            }
        }
        Ok(polled)
    }

    /// Reset every job after an outage.
    pub fn reset_all(&mut self) {
        for job in &mut self.jobs {
            job.reset();
        }
    }
}

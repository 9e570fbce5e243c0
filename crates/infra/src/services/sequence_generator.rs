//! Document number issuing.
//!
//! `next()` is a single find-and-modify on the sequence document: the
//! increment and the read of the new value cannot be separated, so
//! concurrent callers always get distinct numbers.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use canteen_core::UserId;
use canteen_events::{EventBus, FieldChange};
use canteen_sequence::{EntityType, NumberSequence, SequenceSettings};

use crate::config::SequenceDefault;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::sink::{EngineEnvelope, Outbox, entity};
use crate::store::{DocumentStore, ReadOptions, Storage};

pub struct SequenceGenerator<S, B> {
    storage: Arc<S>,
    bus: Arc<B>,
}

impl<S, B> Clone for SequenceGenerator<S, B> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<S, B> SequenceGenerator<S, B>
where
    S: Storage,
    B: EventBus<EngineEnvelope>,
{
    pub fn new(storage: Arc<S>, bus: Arc<B>) -> Self {
        Self { storage, bus }
    }

    /// Issue the next formatted number for `entity_type`.
    pub fn next(&self, entity_type: EntityType) -> EngineResult<String> {
        let issued = self
            .storage
            .sequences()
            .find_and_modify(&entity_type, |seq: &mut NumberSequence| {
                seq.advance().map_err(EngineError::from)
            })
            .map_err(|e| missing_sequence(e, entity_type))?;
        Ok(issued.value)
    }

    /// What `next()` would return right now. Another caller may take that
    /// number before you do.
    pub fn peek(&self, entity_type: EntityType) -> EngineResult<String> {
        let seq = self.load(entity_type)?;
        Ok(seq.peek()?)
    }

    pub fn get(&self, entity_type: EntityType) -> EngineResult<NumberSequence> {
        self.load(entity_type)
    }

    pub fn list(&self) -> EngineResult<Vec<NumberSequence>> {
        Ok(self
            .storage
            .sequences()
            .list(ReadOptions::live())?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    /// Create the sequence, or change how future numbers are formatted.
    /// Numbers already issued are never rewritten.
    pub fn configure(
        &self,
        entity_type: EntityType,
        settings: SequenceSettings,
        actor: Option<UserId>,
    ) -> EngineResult<NumberSequence> {
        let now = Utc::now();

        let existing = self
            .storage
            .sequences()
            .find_and_modify(&entity_type, |seq: &mut NumberSequence| {
                let before = seq.clone();
                seq.configure(settings.clone())?;
                Ok::<_, EngineError>((before, seq.clone()))
            });

        let (version, changes, after) = match existing {
            Ok(updated) => {
                let (before, after) = updated.value;
                (updated.version, settings_diff(&before, &after), after)
            }
            Err(EngineError::NotFound(_)) => {
                let seq = NumberSequence::new(entity_type, settings)?;
                let version = self
                    .storage
                    .sequences()
                    .insert(entity_type, seq.clone())
                    .map_err(|e| match e {
                        StoreError::Duplicate(_) => EngineError::ConcurrencyConflict(format!(
                            "{entity_type} sequence was created concurrently"
                        )),
                        other => other.into(),
                    })?;
                let changes = vec![
                    FieldChange::created("prefix", seq.prefix()),
                    FieldChange::created("length", seq.length()),
                    FieldChange::created("format", seq.format()),
                ];
                (version, changes, seq)
            }
            Err(other) => return Err(other),
        };

        info!(entity_type = %entity_type, prefix = after.prefix(), length = after.length(), "sequence configured");

        Outbox::new(entity::NUMBER_SEQUENCE, entity_type, version, actor)
            .audit("configured", changes, now)
            .publish(self.bus.as_ref())?;
        Ok(after)
    }

    /// Move the counter so the next number issued is `reset_to + 1`.
    ///
    /// Does not check for numbers already issued at or above `reset_to`;
    /// rewinding re-issues duplicates.
    pub fn reset(
        &self,
        entity_type: EntityType,
        reset_to: u64,
        actor: Option<UserId>,
    ) -> EngineResult<NumberSequence> {
        let updated = self
            .storage
            .sequences()
            .find_and_modify(&entity_type, |seq: &mut NumberSequence| {
                let before = seq.current_number();
                seq.reset(reset_to);
                Ok::<_, EngineError>((before, seq.clone()))
            })
            .map_err(|e| missing_sequence(e, entity_type))?;
        let (before, seq) = updated.value;

        warn!(
            entity_type = %entity_type,
            from = before,
            to = reset_to,
            actor = ?actor,
            "sequence reset; numbers may be re-issued"
        );

        Outbox::new(entity::NUMBER_SEQUENCE, entity_type, updated.version, actor)
            .audit(
                "reset",
                FieldChange::diff("current_number", &before, &reset_to)
                    .into_iter()
                    .collect(),
                Utc::now(),
            )
            .publish(self.bus.as_ref())?;
        Ok(seq)
    }

    /// Create any configured sequence that does not exist yet. Existing
    /// sequences keep their counters and formatting.
    pub fn ensure_defaults(&self, defaults: &[SequenceDefault]) -> EngineResult<usize> {
        let mut created = 0;
        for default in defaults {
            let seq = NumberSequence::new(default.entity_type, default.settings())?;
            match self.storage.sequences().insert(default.entity_type, seq) {
                Ok(_) => created += 1,
                Err(StoreError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if created > 0 {
            info!(created, "default sequences seeded");
        }
        Ok(created)
    }

    fn load(&self, entity_type: EntityType) -> EngineResult<NumberSequence> {
        self.storage
            .sequences()
            .get(&entity_type, ReadOptions::live())?
            .map(|v| v.value)
            .ok_or_else(|| EngineError::NotFound(format!("{entity_type} sequence")))
    }
}

fn missing_sequence(err: EngineError, entity_type: EntityType) -> EngineError {
    match err {
        EngineError::NotFound(_) => EngineError::NotFound(format!("{entity_type} sequence")),
        other => other,
    }
}

fn settings_diff(before: &NumberSequence, after: &NumberSequence) -> Vec<FieldChange> {
    [
        FieldChange::diff("prefix", &before.prefix(), &after.prefix()),
        FieldChange::diff("length", &before.length(), &after.length()),
        FieldChange::diff("format", &before.format(), &after.format()),
        FieldChange::diff(
            "description",
            &before.description().unwrap_or_default(),
            &after.description().unwrap_or_default(),
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use canteen_events::InMemoryEventBus;

    use crate::store::InMemoryStorage;

    type Generator = SequenceGenerator<InMemoryStorage, InMemoryEventBus<EngineEnvelope>>;

    fn generator() -> Generator {
        SequenceGenerator::new(Arc::new(InMemoryStorage::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn bill_settings() -> SequenceSettings {
        SequenceSettings {
            prefix: "BILL".to_string(),
            length: 6,
            format: None,
            description: None,
        }
    }

    #[test]
    fn next_continues_from_the_stored_counter() {
        let g = generator();
        g.configure(EntityType::Bill, bill_settings(), None).unwrap();
        g.reset(EntityType::Bill, 41, None).unwrap();

        assert_eq!(g.peek(EntityType::Bill).unwrap(), "BILL-000042");
        assert_eq!(g.next(EntityType::Bill).unwrap(), "BILL-000042");
        assert_eq!(g.get(EntityType::Bill).unwrap().current_number(), 42);
    }

    #[test]
    fn unknown_entity_type_is_not_found() {
        let g = generator();
        assert!(matches!(g.next(EntityType::Vendor), Err(EngineError::NotFound(_))));
        assert!(matches!(g.peek(EntityType::Vendor), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn configure_keeps_the_counter() {
        let g = generator();
        g.configure(EntityType::Bill, bill_settings(), None).unwrap();
        g.next(EntityType::Bill).unwrap();

        let seq = g
            .configure(
                EntityType::Bill,
                SequenceSettings {
                    prefix: "INV".to_string(),
                    length: 3,
                    format: None,
                    description: None,
                },
                None,
            )
            .unwrap();
        assert_eq!(seq.current_number(), 1);
        assert_eq!(g.next(EntityType::Bill).unwrap(), "INV-002");
    }

    #[test]
    fn ensure_defaults_does_not_touch_existing_sequences() {
        let g = generator();
        g.configure(EntityType::Bill, bill_settings(), None).unwrap();
        g.reset(EntityType::Bill, 500, None).unwrap();

        let created = g.ensure_defaults(&crate::config::EngineConfig::default().sequences).unwrap();
        assert_eq!(created, 6);
        assert_eq!(g.get(EntityType::Bill).unwrap().current_number(), 500);
        assert_eq!(g.list().unwrap().len(), 7);
    }

    #[test]
    fn concurrent_callers_get_a_contiguous_run() {
        let g = generator();
        g.configure(EntityType::Bill, bill_settings(), None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let g = g.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| g.next(EntityType::Bill).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let issued: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let distinct: HashSet<&String> = issued.iter().collect();
        assert_eq!(distinct.len(), 400);

        let mut numbers: Vec<u64> = issued
            .iter()
            .map(|s| s.trim_start_matches("BILL-").parse().unwrap())
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=400).collect::<Vec<u64>>());
    }

    #[test]
    fn reset_is_audited() {
        let storage = Arc::new(InMemoryStorage::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let g: Generator = SequenceGenerator::new(storage, Arc::clone(&bus));
        g.configure(EntityType::Bill, bill_settings(), None).unwrap();

        let sub = bus.subscribe();
        g.reset(EntityType::Bill, 10, None).unwrap();

        let messages = sub.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].entity_type(), entity::NUMBER_SEQUENCE);
    }
}

//! SQLite run journal.
//!
//! RULE: Only store.rs talks to the database.
//! Components report events to the orchestrator; they never execute SQL.

use rusqlite::{params, Connection};
use crate::{
    error::ScenarioResult,
    event::EventLogEntry,
};

pub struct EventJournal {
    conn: Connection,
}

impl EventJournal {
    /// Open (or create) the journal database at `path`.
    pub fn open(path: &str) -> ScenarioResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ScenarioResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ScenarioResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, scenario: &str, seed: u64, version: &str) -> ScenarioResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, scenario, seed, version, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, scenario, seed as i64, version, 0i64],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> ScenarioResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, tick, source, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.run_id,
                entry.tick as i64,
                entry.source,
                entry.event_type,
                entry.payload,
                entry.tick as i64,
            ],
        )?;
        Ok(())
    }

    /// Every event of a run in append order.
    pub fn events_for_run(&self, run_id: &str) -> ScenarioResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, tick, source, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC"
        )?;
        let entries = stmt.query_map(params![run_id], |row| {
            Ok(EventLogEntry {
                id:         Some(row.get(0)?),
                run_id:     row.get(1)?,
                tick:       row.get::<_, i64>(2)? as u64,
                source:     row.get(3)?,
                event_type: row.get(4)?,
                payload:    row.get(5)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, run_id: &str, event_type: &str) -> ScenarioResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScenarioEvent;

    #[test]
    fn events_round_trip_in_append_order() {
        let journal = EventJournal::in_memory().unwrap();
        journal.migrate().unwrap();
        journal.insert_run("run-a", "default", 9, "test").unwrap();

        let events = [
            ScenarioEvent::VehiclesSpawned { requested: 3, spawned: 2, failed: 1 },
            ScenarioEvent::PedestriansSpawned { requested: 4, bodies: 4, controllers: 4 },
        ];
        for (tick, event) in events.iter().enumerate() {
            let entry = EventLogEntry::new("run-a", tick as u64, "test", event).unwrap();
            journal.append_event(&entry).unwrap();
        }

        let stored = journal.events_for_run("run-a").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].event_type, "vehicles_spawned");
        assert_eq!(stored[1].decode().unwrap(), events[1]);
        assert_eq!(journal.event_count("run-a", "pedestrians_spawned").unwrap(), 1);
        assert_eq!(journal.event_count("run-b", "pedestrians_spawned").unwrap(), 0);
    }

    #[test]
    fn events_require_a_known_run() {
        let journal = EventJournal::in_memory().unwrap();
        journal.migrate().unwrap();
        let event = ScenarioEvent::BehaviorAssigned { tally: Default::default() };
        let entry = EventLogEntry::new("ghost", 0, "test", &event).unwrap();
        assert!(journal.append_event(&entry).is_err());
    }
}

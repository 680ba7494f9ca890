use broadside_protocol::{AuditEntry, AuditEvent};

/// Append-only record of noteworthy session events, kept next to but apart
/// from the history log. Audit entries are display and replay-diagnosis
/// material; they are never applied to state and undo never removes them.
#[derive(Clone, Debug, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
    next_id: u64,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, round: u32, event: AuditEvent) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(AuditEntry { id, round, event });
        id
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn entries_for_round(&self, round: u32) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.round == round)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_entries_survive() {
        let mut log = AuditLog::new();
        let first = log.record(
            1,
            AuditEvent::DiceRolled {
                player: "Germany".into(),
                sides: 6,
                values: vec![3, 5],
                purpose: "combat".into(),
            },
        );
        let second = log.record(
            1,
            AuditEvent::ChangeApplied {
                seq: 0,
                summary: "Germany takes Norway".into(),
            },
        );
        assert_eq!((first, second), (0, 1));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries_for_round(1).count(), 2);
        assert_eq!(log.entries_for_round(2).count(), 0);
    }
}

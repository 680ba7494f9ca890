use broadside_protocol::CompositeChange;

/// One recorded mutation: the composite as applied plus its precomputed
/// inverse, stamped with the round it happened in and a session-wide
/// sequence number.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub composite: CompositeChange,
    pub inverse: CompositeChange,
    pub round: u32,
    pub seq: u64,
}

/// Append-only record of applied composites, the only source of truth for
/// "what has happened" in a session.
///
/// Forward play appends; undo pops the most recent entry and discards it.
/// Entries are stamped with their round so the log segments naturally at
/// round boundaries for navigation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    next_seq: u64,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a composite and its precomputed inverse. Returns the assigned
    /// sequence number.
    pub fn record(&mut self, composite: CompositeChange, inverse: CompositeChange, round: u32) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(HistoryEntry {
            composite,
            inverse,
            round,
            seq,
        });
        seq
    }

    /// Pop the most recent entry. The caller applies the stored inverse; the
    /// popped entry leaves the log for good.
    pub fn undo_most_recent(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn entries_for_round(&self, round: u32) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(move |e| e.round == round)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sequence number the next recorded entry will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Restore a log from persisted entries (loading a save).
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(0);
        Self { entries, next_seq }
    }
}

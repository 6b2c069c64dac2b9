use chrono::{DateTime, Duration, Utc};
use common::GenerationView;
use uuid::Uuid;

/// Identifies one optimistic mutation for later confirmation or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationToken(u64);

/// A mutation the client predicts before the server acknowledges it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCommand {
    ToggleSave(Uuid),
    Delete(Uuid),
}

impl FeedCommand {
    pub fn generation_id(&self) -> Uuid {
        match self {
            Self::ToggleSave(id) | Self::Delete(id) => *id,
        }
    }

    fn replay(&self, feed: &mut Vec<GenerationView>, at: DateTime<Utc>) {
        match *self {
            Self::ToggleSave(id) => {
                if let Some(item) = feed.iter_mut().find(|g| g.id == id) {
                    item.is_saved = !item.is_saved;
                    item.updated_at = at.max(item.updated_at + Duration::microseconds(1));
                }
            }
            Self::Delete(id) => feed.retain(|g| g.id != id),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingDelta {
    token: MutationToken,
    command: FeedCommand,
    applied_at: DateTime<Utc>,
    confirmed: bool,
}

/// The last authoritative feed plus the local deltas not yet reflected in it.
///
/// What the user sees is always the snapshot with every pending delta
/// replayed in the order it was applied. A new snapshot replaces everything.
#[derive(Debug, Clone, Default)]
pub struct FeedCache {
    snapshot: Vec<GenerationView>,
    pending: Vec<PendingDelta>,
    next_token: u64,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Vec<GenerationView>) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    /// Record a predicted mutation; it is visible immediately.
    pub fn apply(&mut self, command: FeedCommand) -> MutationToken {
        let token = MutationToken(self.next_token);
        self.next_token += 1;
        self.pending.push(PendingDelta {
            token,
            command,
            applied_at: Utc::now(),
            confirmed: false,
        });
        token
    }

    /// The server accepted the mutation. The delta stays in effect until the
    /// next snapshot, which will carry it.
    ///
    /// Returns `false` if the token is unknown or already superseded.
    pub fn confirm(&mut self, token: MutationToken) -> bool {
        match self.pending.iter_mut().find(|d| d.token == token) {
            Some(delta) => {
                delta.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// The server refused the mutation: revert exactly that delta, keeping
    /// any applied after it.
    pub fn reject(&mut self, token: MutationToken) -> bool {
        let before = self.pending.len();
        self.pending.retain(|d| d.token != token);
        self.pending.len() != before
    }

    /// Install an authoritative feed, dropping every pending delta.
    pub fn replace(&mut self, snapshot: Vec<GenerationView>) {
        self.snapshot = snapshot;
        self.pending.clear();
    }

    /// Feed as the user should see it.
    pub fn view(&self) -> Vec<GenerationView> {
        let mut feed = self.snapshot.clone();
        for delta in &self.pending {
            delta.command.replay(&mut feed, delta.applied_at);
        }
        feed
    }

    pub fn saved_view(&self) -> Vec<GenerationView> {
        self.view().into_iter().filter(|g| g.is_saved).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<GenerationView> {
        self.view().into_iter().find(|g| g.id == id)
    }

    /// Deltas the server has not acknowledged yet.
    pub fn unconfirmed(&self) -> usize {
        self.pending.iter().filter(|d| !d.confirmed).count()
    }

    pub fn is_reconciled(&self) -> bool {
        self.pending.is_empty()
    }
}

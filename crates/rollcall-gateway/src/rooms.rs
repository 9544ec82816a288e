use std::collections::HashSet;
use uuid::Uuid;

/// Room membership for a single connection. Purely additive/subtractive
/// bookkeeping: double joins and unknown leaves are no-ops. Dropped with
/// the connection, so disconnect cleanup is automatic.
#[derive(Debug, Default)]
pub struct RoomSet {
    joined: HashSet<Uuid>,
}

impl RoomSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, class_id: Uuid) {
        self.joined.insert(class_id);
    }

    pub fn leave(&mut self, class_id: Uuid) {
        self.joined.remove(&class_id);
    }

    pub fn contains(&self, class_id: Uuid) -> bool {
        self.joined.contains(&class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leave_are_idempotent() {
        let mut rooms = RoomSet::new();
        let class = Uuid::new_v4();

        rooms.join(class);
        rooms.join(class);
        assert!(rooms.contains(class));

        rooms.leave(class);
        assert!(!rooms.contains(class));

        // Leaving a room never joined is a no-op, not an error.
        rooms.leave(Uuid::new_v4());
    }

    #[test]
    fn membership_is_scoped_per_class() {
        let mut rooms = RoomSet::new();
        let class_a = Uuid::new_v4();
        let class_b = Uuid::new_v4();

        rooms.join(class_a);
        assert!(rooms.contains(class_a));
        assert!(!rooms.contains(class_b));
    }
}

use crate::domain_model::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestaurantId(pub uuid::Uuid);

impl fmt::Display for RestaurantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RestaurantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(RestaurantId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub visited: bool,
    pub visit_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NothingToDecrement;

impl VisitRecord {
    pub fn unvisited(user_id: UserId, restaurant_id: RestaurantId) -> Self {
        Self {
            user_id,
            restaurant_id,
            visited: false,
            visit_count: 0,
        }
    }

    /// Marking a place visited implies at least one visit.
    pub fn toggled(&self) -> Self {
        let visited = !self.visited;
        let visit_count = if visited && self.visit_count == 0 {
            1
        } else {
            self.visit_count
        };
        Self {
            visited,
            visit_count,
            ..self.clone()
        }
    }

    pub fn incremented(&self) -> Self {
        Self {
            visited: true,
            visit_count: self.visit_count.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn decremented(&self) -> Result<Self, NothingToDecrement> {
        if self.visit_count == 0 {
            return Err(NothingToDecrement);
        }
        let visit_count = self.visit_count - 1;
        Ok(Self {
            visited: if visit_count == 0 { false } else { self.visited },
            visit_count,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(visited: bool, visit_count: u32) -> VisitRecord {
        VisitRecord {
            user_id: UserId(uuid::Uuid::nil()),
            restaurant_id: RestaurantId(uuid::Uuid::nil()),
            visited,
            visit_count,
        }
    }

    #[test]
    fn toggle_on_from_zero_seeds_one_visit() {
        let next = record(false, 0).toggled();
        assert!(next.visited);
        assert_eq!(next.visit_count, 1);
    }

    #[test]
    fn toggle_on_keeps_existing_count() {
        let next = record(false, 3).toggled();
        assert!(next.visited);
        assert_eq!(next.visit_count, 3);
    }

    #[test]
    fn toggle_off_leaves_count_alone() {
        let next = record(true, 2).toggled();
        assert!(!next.visited);
        assert_eq!(next.visit_count, 2);
    }

    #[test]
    fn increment_always_marks_visited() {
        let next = record(false, 4).incremented();
        assert_eq!(next, record(true, 5));
    }

    #[test]
    fn decrement_to_zero_clears_visited() {
        assert_eq!(record(true, 1).decremented(), Ok(record(false, 0)));
        assert_eq!(record(true, 3).decremented(), Ok(record(true, 2)));
    }

    #[test]
    fn decrement_at_zero_is_rejected() {
        let before = record(true, 0);
        assert_eq!(before.decremented(), Err(NothingToDecrement));
        assert_eq!(before, record(true, 0));
    }
}

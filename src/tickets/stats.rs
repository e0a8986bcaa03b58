use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Ticket, TicketStatus};

/// Per-status ticket counts. Serializes flat, e.g.
/// `{"total": 3, "AVAILABLE": 2, "WINNER": 1, "PENDING": 0, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total: usize,
    #[serde(flatten)]
    pub by_status: BTreeMap<TicketStatus, usize>,
}

impl TicketStats {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TicketStatus>,
    {
        let empty = TicketStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        let init = TicketStats {
            total: 0,
            by_status: empty,
        };

        statuses.into_iter().fold(init, |mut stats, status| {
            stats.total += 1;
            *stats.by_status.entry(status).or_insert(0) += 1;
            stats
        })
    }

    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        Self::from_statuses(tickets.iter().map(|t| t.status))
    }

    pub fn count(&self, status: TicketStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_every_status() {
        let stats = TicketStats::from_statuses([
            TicketStatus::Available,
            TicketStatus::Available,
            TicketStatus::Winner,
        ]);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(TicketStatus::Available), 2);
        assert_eq!(stats.count(TicketStatus::Winner), 1);
        for status in TicketStatus::ALL {
            assert!(stats.by_status.contains_key(&status));
        }
        assert_eq!(stats.count(TicketStatus::Deleted), 0);
    }

    #[test]
    fn test_empty_input() {
        let stats = TicketStats::from_tickets(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_status.len(), TicketStatus::ALL.len());
        assert!(stats.by_status.values().all(|count| *count == 0));
    }

    #[test]
    fn test_serializes_flat() {
        let stats = TicketStats::from_statuses([
            TicketStatus::Available,
            TicketStatus::Available,
            TicketStatus::Winner,
        ]);
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({
                "total": 3,
                "PENDING": 0,
                "AVAILABLE": 2,
                "ACTIVE": 0,
                "IN_RAFFLE": 0,
                "WINNER": 1,
                "LOST": 0,
                "DELETED": 0,
            })
        );
    }
}

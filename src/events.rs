// 11.0: every notable state change produces an event. used for audit trails and
// for notifying external systems. the EventPayload enum lists all event types.

use crate::conditional::OrderKind;
use crate::types::{CoinId, Price, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Session lifecycle
    SessionOpened(SessionOpenedEvent),
    SessionSettled(SessionSettledEvent),

    // Plan execution
    PlanApplied(PlanAppliedEvent),
    PlanRolledBack(PlanRolledBackEvent),
    ManualAction(ManualActionEvent),

    // Monitor outcomes
    Liquidation(LiquidationEvent),
    ConditionalTriggered(ConditionalTriggeredEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOpenedEvent {
    pub user_id: String,
    pub initial_funds: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettledEvent {
    pub user_id: String,
    pub final_funds: Decimal,
    pub return_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAppliedEvent {
    pub user_id: String,
    pub action_count: usize,
    pub market_direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRolledBackEvent {
    pub user_id: String,
    pub failed_action: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualActionEvent {
    pub user_id: String,
    pub action: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub user_id: String,
    pub coin: CoinId,
    pub side: Side,
    pub mark: Price,
    pub liquidation_price: Decimal,
    pub margin_lost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalTriggeredEvent {
    pub user_id: String,
    pub coin: CoinId,
    pub kind: OrderKind,
    pub side: Side,
    pub trigger_price: Price,
    pub realized_pnl: Decimal,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<Event>,
    next_id: u64,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Emit and cap the buffer.
    pub fn record(&mut self, timestamp: Timestamp, payload: EventPayload, max_events: usize) {
        let id = self.next_id();
        self.events.push(Event::new(id, timestamp, payload));
        if self.events.len() > max_events {
            let drain = self.events.len() - max_events;
            self.events.drain(0..drain);
        }
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn collector_caps_buffer() {
        let mut collector = EventCollector::new();
        for i in 0..10 {
            collector.record(
                Timestamp::from_millis(i),
                EventPayload::SessionOpened(SessionOpenedEvent {
                    user_id: format!("u{i}"),
                    initial_funds: dec!(10000),
                }),
                5,
            );
        }
        assert_eq!(collector.events().len(), 5);
        // oldest were dropped
        assert_eq!(collector.events()[0].id, EventId(6));
    }

    #[test]
    fn recent_returns_tail() {
        let mut collector = EventCollector::new();
        for i in 0..4 {
            collector.record(
                Timestamp::from_millis(i),
                EventPayload::ManualAction(ManualActionEvent {
                    user_id: "u1".to_string(),
                    action: "HOLD".to_string(),
                    summary: "holding".to_string(),
                }),
                100,
            );
        }
        assert_eq!(collector.recent(2).len(), 2);
        assert_eq!(collector.recent(2)[0].id, EventId(3));
    }
}

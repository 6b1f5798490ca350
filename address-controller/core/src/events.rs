use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reason {
    BrokerCreated,
    BrokerCreateFailed,
    BrokerUpgraded,
    BrokerUpgradeFailed,
    BrokerDeleted,
    BrokerDeleteFailed,
    RouterScaled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Address,
    Broker,
    Router,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub reason: Reason,
    pub type_: EventType,
    pub kind: ObjectKind,
    pub name: String,
    pub message: String,
}

/// Records notable controller actions. Delivery is best-effort and never
/// blocks reconciliation.
pub trait EventSink: Send + Sync {
    fn log(&self, event: Event);
}

/// Writes events to the process log.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogEventSink;

// === impl Event ===

impl Event {
    pub fn normal(
        reason: Reason,
        kind: ObjectKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reason,
            type_: EventType::Normal,
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        reason: Reason,
        kind: ObjectKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: EventType::Warning,
            ..Self::normal(reason, kind, name, message)
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// === impl LogEventSink ===

impl EventSink for LogEventSink {
    fn log(&self, event: Event) {
        let Event {
            reason,
            type_,
            kind,
            name,
            message,
        } = event;
        match type_ {
            EventType::Normal => {
                tracing::info!(%reason, %kind, %name, "{message}")
            }
            EventType::Warning => {
                tracing::warn!(%reason, %kind, %name, "{message}")
            }
        }
    }
}

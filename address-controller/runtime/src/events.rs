use crate::{
    core::{Event, EventSink, EventType, LogEventSink, ObjectKind, Reason},
    k8s::{self, api::core::v1::ObjectReference},
};
use kube::runtime::events::{self as kevents, Recorder, Reporter};
use tokio::sync::mpsc;
use tracing::{info_span, Instrument};

const EVENT_QUEUE_SIZE: usize = 1_000;

/// Publishes controller events as Kubernetes events.
///
/// Events are queued and published in the background. When the queue is full
/// events are dropped rather than delaying reconciliation.
#[derive(Clone, Debug)]
pub(crate) struct KubeEventSink {
    tx: mpsc::Sender<Event>,
}

/// Namespaces of the objects events refer to.
#[derive(Clone, Debug)]
pub(crate) struct EventNamespaces {
    pub addresses: String,
    pub infra: String,
}

// === impl KubeEventSink ===

impl KubeEventSink {
    pub(crate) fn spawn(
        client: k8s::Client,
        namespaces: EventNamespaces,
        controller: &str,
        instance: String,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: Some(instance),
        };
        let recorder = Recorder::new(client, reporter);
        tokio::spawn(publish(recorder, namespaces, rx).instrument(info_span!("events")));
        Self { tx }
    }
}

impl EventSink for KubeEventSink {
    fn log(&self, event: Event) {
        LogEventSink.log(event.clone());
        if let Err(error) = self.tx.try_send(event) {
            tracing::warn!(%error, "Dropping event");
        }
    }
}

async fn publish(recorder: Recorder, namespaces: EventNamespaces, mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        let reference = object_reference(&event, &namespaces);
        let Event {
            reason,
            type_,
            message,
            ..
        } = event;
        let event = kevents::Event {
            type_: match type_ {
                EventType::Normal => kevents::EventType::Normal,
                EventType::Warning => kevents::EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message),
            action: action(reason).to_string(),
            secondary: None,
        };
        if let Err(error) = recorder.publish(&event, &reference).await {
            tracing::warn!(%reason, %error, "Failed to publish event");
        }
    }
    tracing::debug!("Event queue closed");
}

fn object_reference(event: &Event, namespaces: &EventNamespaces) -> ObjectReference {
    let (api_version, kind, namespace) = match event.kind {
        ObjectKind::Address => ("enmasse.io/v1beta1", "Address", &namespaces.addresses),
        ObjectKind::Broker => ("apps/v1", "StatefulSet", &namespaces.infra),
        ObjectKind::Router => ("apps/v1", "Deployment", &namespaces.infra),
    };
    ObjectReference {
        api_version: Some(api_version.to_string()),
        kind: Some(kind.to_string()),
        name: Some(event.name.clone()),
        namespace: Some(namespace.clone()),
        ..Default::default()
    }
}

fn action(reason: Reason) -> &'static str {
    match reason {
        Reason::BrokerCreated | Reason::BrokerCreateFailed => "Create",
        Reason::BrokerUpgraded | Reason::BrokerUpgradeFailed => "Upgrade",
        Reason::BrokerDeleted | Reason::BrokerDeleteFailed => "Delete",
        Reason::RouterScaled => "Scale",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn events_refer_to_the_affected_workload() {
        let namespaces = EventNamespaces {
            addresses: "messaging".to_string(),
            infra: "enmasse-infra".to_string(),
        };
        let event = Event::normal(
            Reason::BrokerCreated,
            ObjectKind::Broker,
            "broker-pooled-1234-0",
            "Created broker broker-pooled-1234-0",
        );

        let reference = object_reference(&event, &namespaces);

        assert_eq!(reference.kind.as_deref(), Some("StatefulSet"));
        assert_eq!(reference.name.as_deref(), Some("broker-pooled-1234-0"));
        assert_eq!(reference.namespace.as_deref(), Some("enmasse-infra"));
        assert_eq!(action(event.reason), "Create");
    }

    #[tokio::test]
    async fn full_queues_drop_events() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = KubeEventSink { tx };
        let event = |name: &str| {
            Event::warning(
                Reason::BrokerDeleteFailed,
                ObjectKind::Broker,
                name,
                "Error deleting broker",
            )
        };

        sink.log(event("c1"));
        sink.log(event("c2"));

        assert_eq!(rx.recv().await.map(|e| e.name), Some("c1".to_string()));
        assert!(rx.try_recv().is_err());
    }
}

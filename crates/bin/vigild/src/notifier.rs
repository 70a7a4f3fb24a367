//! Notifier that only writes notifications to the log.
//!
//! Stands in for a real delivery gateway; outcomes are reported back through
//! `POST /api/places/{place_id}/alarms/{alarm}/deliveries/{handle}`.

use std::future::Future;

use vigil_app::ports::Notifier;
use vigil_domain::call_tree::Person;
use vigil_domain::error::TransientDispatchError;
use vigil_domain::escalation::{DeliveryHandle, Notification, NotificationMethod};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(
        &self,
        recipient: &Person,
        method: NotificationMethod,
        notification: &Notification,
    ) -> impl Future<Output = Result<DeliveryHandle, TransientDispatchError>> + Send {
        let handle = delivery_handle(recipient, notification);
        tracing::info!(
            handle = handle.as_str(),
            recipient = %recipient.id,
            name = %recipient.display_name(),
            method = method.as_str(),
            place_id = %notification.place_id,
            alarm = notification.alarm_type.as_str(),
            priority = ?notification.priority,
            attempt = notification.attempt,
            "notification dispatched"
        );
        async move { Ok(handle) }
    }
}

fn delivery_handle(recipient: &Person, notification: &Notification) -> DeliveryHandle {
    DeliveryHandle::new(format!(
        "{}-{}-{}",
        notification.incident_id, recipient.id, notification.attempt
    ))
}

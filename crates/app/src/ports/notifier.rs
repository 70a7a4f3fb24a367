//! Notification port: hands alarm notifications to the delivery subsystem.

use std::future::Future;

use vigil_domain::call_tree::Person;
use vigil_domain::error::TransientDispatchError;
use vigil_domain::escalation::{DeliveryHandle, Notification, NotificationMethod};

/// Outbound notification delivery.
///
/// `send` only hands the notification over and must return quickly; the
/// outcome (acknowledged or failed) is reported later through
/// `AlarmCoordinator::report_delivery` with the returned handle.
pub trait Notifier {
    /// # Errors
    ///
    /// Returns [`TransientDispatchError`] when the hand-off itself failed;
    /// the caller retries with backoff.
    fn send(
        &self,
        recipient: &Person,
        method: NotificationMethod,
        notification: &Notification,
    ) -> impl Future<Output = Result<DeliveryHandle, TransientDispatchError>> + Send;
}

use crate::error::PortError;
use crate::model::{Announcement, Event, User};
use async_trait::async_trait;

/// Port to the outbound mail transport.
///
/// Each call delivers to exactly one recipient so that failures can be
/// reported per recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Notifies one attendee about a new event.
    async fn send_event_email(
        &self,
        event: &Event,
        recipient: &User,
    ) -> std::result::Result<(), PortError>;

    /// Delivers an announcement to one recipient.
    async fn send_announcement_email(
        &self,
        announcement: &Announcement,
        recipient: &User,
    ) -> std::result::Result<(), PortError>;

    /// Returns whether mail delivery is configured at all.
    fn enabled(&self) -> bool {
        true
    }
}

/// Mailer that sends nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMailer;

#[async_trait]
impl Mailer for NoMailer {
    async fn send_event_email(
        &self,
        _event: &Event,
        _recipient: &User,
    ) -> std::result::Result<(), PortError> {
        Ok(())
    }

    async fn send_announcement_email(
        &self,
        _announcement: &Announcement,
        _recipient: &User,
    ) -> std::result::Result<(), PortError> {
        Ok(())
    }

    fn enabled(&self) -> bool {
        false
    }
}

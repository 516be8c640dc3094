//! Log channel: records confirmations through `tracing`

use async_trait::async_trait;

use super::{Channel, ChannelResult, DeliveryStatus};
use crate::notifications::BookingNotice;
use crate::utils::truncate_text;

/// Writes each confirmation as a structured `info!` event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notice: &BookingNotice) -> ChannelResult<DeliveryStatus> {
        let booking = &notice.booking;
        tracing::info!(
            booking_id = %booking.id,
            crew = %booking.crew_name,
            customer = %booking.customer.name,
            email = %booking.customer.email,
            start = %booking.start,
            end = %booking.end,
            location = %booking.location_code,
            service = %truncate_text(&booking.service_type, 80),
            "Booking confirmation"
        );
        Ok(DeliveryStatus::success(self.name()))
    }
}

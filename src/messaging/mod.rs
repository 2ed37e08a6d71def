pub mod channels;
pub mod command;
pub mod notification;

pub use channels::{
    CommandConsumer, CommandProducer, LiveConsumer, LiveProducer, NotificationConsumer,
    NotificationProducer, create_command_channel, create_live_channel,
    create_notification_channel,
};
pub use command::Command;
pub use notification::{Notification, NotificationLevel, Status, StopReason};

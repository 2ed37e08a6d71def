// Communication channels lock-free
// UI -> scheduler commands, scheduler -> UI notifications, MIDI IN -> router.

use crate::messaging::command::Command;
use crate::messaging::notification::Notification;
use crate::midi::event::MidiEvent;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<Command>;
pub type CommandConsumer = ringbuf::HeapCons<Command>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<Command>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Live MIDI IN events, pushed from the input callback thread
pub type LiveProducer = ringbuf::HeapProd<MidiEvent>;
pub type LiveConsumer = ringbuf::HeapCons<MidiEvent>;

pub fn create_live_channel(capacity: usize) -> (LiveProducer, LiveConsumer) {
    let rb = HeapRb::<MidiEvent>::new(capacity);
    rb.split()
}

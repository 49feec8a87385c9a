//! Lock-free command queue between the control context and the audio thread.
//!
//! Voice registration and removal go through a bounded wait-free SPSC ring
//! (`rtrb`): the control side pushes in O(1), the audio thread drains pending
//! commands at the start of each render call. No mutex ever sits between the
//! two contexts.

use basedrop::Owned;

use crate::engine::voice::Voice;
use crate::types::VoiceId;

/// Commands the audio thread applies at block boundaries.
///
/// The voice payload is `basedrop::Owned` so that wherever the command ends
/// up dropped (mixer full, queue torn down), deallocation is deferred to the
/// GC thread instead of happening on the audio thread.
pub enum EngineCommand {
    AddVoice(Owned<Voice>),
    RemoveVoice(VoiceId),
    ClearVoices,
}

/// Capacity of the command queue. A song driver registering a full ensemble
/// at once stays well under this.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Send side of the command ring, owned by the control context.
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Push a command without blocking. On a full ring the command is handed
    /// back so the caller can report or retry.
    pub fn send(&mut self, command: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(command).map_err(|rtrb::PushError::Full(c)| c)
    }
}

/// Create the command channel. The consumer side goes to the audio thread.
pub fn command_channel() -> (CommandSender, rtrb::Consumer<EngineCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    (CommandSender { producer }, consumer)
}

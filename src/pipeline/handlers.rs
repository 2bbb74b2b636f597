use super::{Envelope, MessageType};
use crate::{PipeError, Result};

/// Side-channel observer; sees envelopes without taking them.
pub type Handler = Box<dyn FnMut(&Envelope) + Send>;

/// At most one handler per message type, indexed by [`MessageType::index`].
#[derive(Default)]
pub struct HandlerTable {
    slots: [Option<Handler>; MessageType::COUNT],
}

impl HandlerTable {
    /// Installs `handler`, returning the one it replaced.
    pub fn register(&mut self, ty: MessageType, handler: Handler) -> Option<Handler> {
        self.slots[ty.index()].replace(handler)
    }

    /// Removes the handler for `ty`.
    pub fn unregister(&mut self, ty: MessageType) -> Result<Handler> {
        self.slots[ty.index()]
            .take()
            .ok_or_else(|| PipeError::Pipeline(format!("no handler registered for {}", ty)))
    }

    /// Whether a handler is installed for `ty`.
    pub fn is_registered(&self, ty: MessageType) -> bool {
        self.slots[ty.index()].is_some()
    }

    pub(crate) fn dispatch(&mut self, envelope: &Envelope) {
        if let Some(handler) = self.slots[envelope.message_type().index()].as_mut() {
            handler(envelope);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<MessageType> = MessageType::ALL
            .iter()
            .copied()
            .filter(|ty| self.is_registered(*ty))
            .collect();
        f.debug_struct("HandlerTable").field("registered", &registered).finish()
    }
}

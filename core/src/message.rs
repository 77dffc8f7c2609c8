//! Message - Tagged Dispatch Envelopes
//!
//! Every value handed to the runner travels in a [`Message`]: an `Any`
//! payload plus an explicit [`TypeTag`] used for matching. Polymorphic
//! dispatch is a registry lookup over tags (see
//! [`SubtypeRegistry`](crate::subtype::SubtypeRegistry)), never reflection.
//!
//! Two envelopes are internal to the engine:
//! - the autonomous **tick** ([`MessageKind::Tick`]), dispatched after every
//!   reaction so steps that need no external input can fire;
//! - the **error event** ([`MessageKind::Error`]), which re-enters the
//!   matching algorithm when a reaction fails, so a model can declare a
//!   recovery step for a concrete error type.

use std::any::Any;
use std::any::TypeId;
use std::sync::Arc;

use thiserror::Error;

/// A `TypeId` paired with the type's name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name, for logs and error listings.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// An ordinary message supplied by an actor.
    Signal,
    /// The internal "no user input" marker driving autonomous reactions.
    Tick,
    /// A failed reaction re-entering dispatch as data.
    Error,
}

/// Marker payload of the autonomous tick.
#[derive(Debug, Clone, Copy)]
pub struct Tick;

/// A type-tagged message envelope.
///
/// Cloning is cheap: the payload is shared behind an `Arc`.
#[derive(Clone)]
pub struct Message {
    payload: Arc<dyn Any + Send + Sync>,
    tag: TypeTag,
    kind: MessageKind,
}

impl Message {
    /// Wrap an ordinary payload.
    pub fn new<T: Send + Sync + 'static>(payload: T) -> Self {
        Self {
            payload: Arc::new(payload),
            tag: TypeTag::of::<T>(),
            kind: MessageKind::Signal,
        }
    }

    /// The autonomous tick marker.
    pub fn tick() -> Self {
        Self {
            payload: Arc::new(Tick),
            tag: TypeTag::of::<Tick>(),
            kind: MessageKind::Tick,
        }
    }

    /// Wrap a failed reaction. The envelope's tag is the tag of the
    /// *original* error type, so error steps match on it directly.
    pub fn from_error(event: ErrorEvent) -> Self {
        Self::from_error_arc(Arc::new(event))
    }

    /// [`Message::from_error`] over an already shared event.
    pub fn from_error_arc(event: Arc<ErrorEvent>) -> Self {
        let tag = event.tag();
        Self {
            payload: event,
            tag,
            kind: MessageKind::Error,
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// The carried [`ErrorEvent`], for [`MessageKind::Error`] envelopes.
    pub fn error_event(&self) -> Option<&ErrorEvent> {
        match self.kind {
            MessageKind::Error => self.payload.downcast_ref(),
            _ => None,
        }
    }

    /// Shared handle to the carried [`ErrorEvent`], if any.
    pub fn error_event_arc(&self) -> Option<Arc<ErrorEvent>> {
        match self.kind {
            MessageKind::Error => Arc::clone(&self.payload).downcast().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.tag.name())
            .field("kind", &self.kind)
            .finish()
    }
}

/// A reaction failure, tagged with the concrete error type it carries.
///
/// The tag is captured where the typed reaction wrapper converts `Err(E)`,
/// so matching an error step against `E` is the same tag comparison used for
/// ordinary messages.
#[derive(Debug)]
pub struct ErrorEvent {
    tag: TypeTag,
    error: anyhow::Error,
}

impl ErrorEvent {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            tag: TypeTag::of::<E>(),
            error: anyhow::Error::new(error),
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.error.downcast_ref()
    }
}

impl std::fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Raised when a typed reaction receives a payload of an unexpected type,
/// e.g. a step declared for a supertype but given an exact-type reaction.
#[derive(Debug, Error)]
#[error("reaction expected payload `{expected}`, got `{actual}`")]
pub struct PayloadMismatch {
    pub expected: &'static str,
    pub actual: &'static str,
}

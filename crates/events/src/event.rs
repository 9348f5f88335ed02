//! Event values and the runtime type tokens used to route them.
//!
//! Routing follows the concrete type of a published value. A subscription names
//! a *class* (any `'static` type, including trait objects), and receives every
//! event whose concrete type is assignable to that class:
//!
//! - the concrete type itself,
//! - every supertype the event declares in [`Event::supertypes`],
//! - the root class `dyn Any + Send + Sync`, which matches everything.
//!
//! ```ignore
//! trait Measurement: Send + Sync {
//!     fn value(&self) -> i64;
//! }
//!
//! #[derive(Debug)]
//! struct Latency(i64);
//!
//! impl Measurement for Latency {
//!     fn value(&self) -> i64 { self.0 }
//! }
//!
//! impl Event for Latency {
//!     fn supertypes(types: &mut Supertypes<Self>) {
//!         types.add::<dyn Measurement>(|latency| latency);
//!     }
//! }
//! ```

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A value that can be published on an event bus.
///
/// Events are shared between subscribers (and threads), so they must be
/// `Send + Sync + 'static`; `Debug` is used when logging dispatch.
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// Declare the classes, besides its own, this event is delivered as.
    ///
    /// The default declares nothing beyond the implicit ones (self and the root class).
    fn supertypes(_types: &mut Supertypes<Self>)
    where
        Self: Sized,
    {
    }
}

/// Runtime type token identifying an event class.
///
/// Equality and hashing use the [`TypeId`] only; the name is kept for logs and
/// thread names.
#[derive(Clone, Copy)]
pub struct EventClass {
    id: TypeId,
    name: &'static str,
}

impl EventClass {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name (e.g. `alloc::string::String`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, generics stripped (e.g. `String`).
    pub fn simple_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for EventClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventClass {}

impl Hash for EventClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventClass").field(&self.name).finish()
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A published event, type-erased. Always holds an `Arc<E>` of the concrete type.
pub(crate) type SharedEvent = Arc<dyn Any + Send + Sync>;

/// An event viewed as one of its classes. Holds an `Arc<T>` for the declared class `T`.
pub(crate) type View = Box<dyn Any + Send + Sync>;

/// Erased conversion from the concrete event to one declared class.
pub(crate) type Upcast = Arc<dyn Fn(&SharedEvent) -> Option<View> + Send + Sync>;

/// The set of classes a concrete event type `E` is assignable to.
///
/// Filled by [`Event::supertypes`]; the bus adds `E` itself and the root class.
pub struct Supertypes<E: Event> {
    entries: Vec<(EventClass, Upcast)>,
    _event: PhantomData<fn(E)>,
}

impl<E: Event> Supertypes<E> {
    pub(crate) fn collect() -> Self {
        let mut types = Self {
            entries: Vec::new(),
            _event: PhantomData,
        };
        types.add::<E>(|event| event);
        types.add::<dyn Any + Send + Sync>(|event| event);
        E::supertypes(&mut types);
        types
    }

    /// Declare `T` as a supertype of `E`, with the conversion used on delivery.
    ///
    /// For a trait `E` implements, the conversion is an unsizing coercion:
    /// `types.add::<dyn Trait>(|event| event)`. Declaring the same class twice
    /// keeps the first conversion.
    pub fn add<T>(&mut self, upcast: fn(Arc<E>) -> Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let class = EventClass::of::<T>();
        if self.contains(class) {
            return self;
        }

        let erased: Upcast = Arc::new(move |event: &SharedEvent| {
            let concrete = Arc::clone(event).downcast::<E>().ok()?;
            Some(Box::new(upcast(concrete)) as View)
        });
        self.entries.push((class, erased));
        self
    }

    pub fn contains(&self, class: EventClass) -> bool {
        self.entries.iter().any(|(c, _)| *c == class)
    }

    pub fn classes(&self) -> impl Iterator<Item = EventClass> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    pub(crate) fn upcast_to(&self, class: EventClass) -> Option<&Upcast> {
        self.entries
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, upcast)| upcast)
    }
}

macro_rules! impl_plain_event {
    ($($t:ty),* $(,)?) => {
        $(impl Event for $t {})*
    };
}

impl_plain_event!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str, (),
);

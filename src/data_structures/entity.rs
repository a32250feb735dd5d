//! Entities and their components.
//!
//! An [`Entity`] owns an ordered list of boxed [`Component`]s. Components are
//! looked up by type: every component answers to its own concrete type, and
//! may also declare trait objects it can be viewed as through
//! [`Component::register`]:
//!
//! ```rust,ignore
//! trait Drawable { fn layer(&self) -> u32; }
//!
//! impl Component for Sprite {
//!     fn register(capabilities: &mut Capabilities<Self>) {
//!         capabilities.provide::<dyn Drawable>(|s| s, |s| s);
//!     }
//! }
//!
//! let drawable = entity.get_component::<dyn Drawable>();
//! ```

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::input::InputState;

/// Non-owning handle to an [`Entity`]. Unique for the lifetime of the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of behaviour attached to an [`Entity`].
pub trait Component: AsAny {
    /// Called once, when the component is added to `owner`.
    fn on_attach(&mut self, _owner: EntityId) {}

    fn start(&mut self) {}

    /// `dt` is in seconds and may be zero or arbitrarily large.
    fn update(&mut self, _dt: f32, _input: &InputState) {}

    /// Declares the trait objects this component can be retrieved as.
    fn register(_capabilities: &mut Capabilities<Self>)
    where
        Self: Sized,
    {
    }
}

/// The views a component of type `C` offers to [`Entity::get_component`].
pub struct Capabilities<C> {
    casts: Vec<(TypeId, Box<dyn Any>)>,
    _component: std::marker::PhantomData<fn(&C)>,
}

impl<C: Component> Capabilities<C> {
    fn new() -> Self {
        Self {
            casts: Vec::new(),
            _component: std::marker::PhantomData,
        }
    }

    /// Makes the component retrievable as `I`.
    pub fn provide<I: ?Sized + 'static>(
        &mut self,
        get: fn(&C) -> &I,
        get_mut: fn(&mut C) -> &mut I,
    ) -> &mut Self {
        let cast: Box<dyn ErasedCast<I>> = Box::new(Cast { get, get_mut });
        self.casts.push((TypeId::of::<I>(), Box::new(cast)));
        self
    }
}

struct Cast<C, I: ?Sized> {
    get: fn(&C) -> &I,
    get_mut: fn(&mut C) -> &mut I,
}

trait ErasedCast<I: ?Sized> {
    fn cast<'a>(&self, component: &'a (dyn Component + 'static)) -> Option<&'a I>;
    fn cast_mut<'a>(&self, component: &'a mut (dyn Component + 'static)) -> Option<&'a mut I>;
}

impl<C: Component, I: ?Sized + 'static> ErasedCast<I> for Cast<C, I> {
    fn cast<'a>(&self, component: &'a (dyn Component + 'static)) -> Option<&'a I> {
        component.as_any().downcast_ref::<C>().map(self.get)
    }

    fn cast_mut<'a>(&self, component: &'a mut (dyn Component + 'static)) -> Option<&'a mut I> {
        component.as_any_mut().downcast_mut::<C>().map(self.get_mut)
    }
}

fn identity<T>(value: &T) -> &T {
    value
}

fn identity_mut<T>(value: &mut T) -> &mut T {
    value
}

struct ComponentSlot {
    type_name: &'static str,
    casts: HashMap<TypeId, Box<dyn Any>>,
    component: Box<dyn Component>,
}

impl ComponentSlot {
    fn answers_to<T: ?Sized + 'static>(&self) -> bool {
        self.casts.contains_key(&TypeId::of::<T>())
    }

    fn view<T: ?Sized + 'static>(&self) -> Option<&T> {
        let cast = self
            .casts
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Box<dyn ErasedCast<T>>>()?;
        cast.cast(self.component.as_ref())
    }

    fn view_mut<T: ?Sized + 'static>(&mut self) -> Option<&mut T> {
        let cast = self
            .casts
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Box<dyn ErasedCast<T>>>()?;
        cast.cast_mut(self.component.as_mut())
    }
}

/// A named game object. Components run in insertion order.
pub struct Entity {
    id: EntityId,
    name: String,
    components: Vec<ComponentSlot>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::next(),
            name: name.into(),
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends `component`. Several components of one type may coexist.
    pub fn add_component<C: Component>(&mut self, mut component: C) -> &mut Self {
        component.on_attach(self.id);

        let mut capabilities = Capabilities::<C>::new();
        capabilities.provide::<C>(identity, identity_mut);
        C::register(&mut capabilities);

        self.components.push(ComponentSlot {
            type_name: type_name::<C>(),
            casts: capabilities.casts.into_iter().collect(),
            component: Box::new(component),
        });
        self
    }

    /// The first component that is a `T`, or can be viewed as one.
    pub fn get_component<T: ?Sized + 'static>(&self) -> Option<&T> {
        self.components.iter().find_map(|slot| slot.view::<T>())
    }

    pub fn get_component_mut<T: ?Sized + 'static>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|slot| slot.view_mut::<T>())
    }

    pub fn has_component<T: ?Sized + 'static>(&self) -> bool {
        self.components.iter().any(|slot| slot.answers_to::<T>())
    }

    /// Detaches the first component matching `T`, keeping the order of the
    /// rest. Returns `None` if there is none.
    pub fn remove_component<T: ?Sized + 'static>(&mut self) -> Option<Box<dyn Component>> {
        let index = self
            .components
            .iter()
            .position(|slot| slot.answers_to::<T>())?;
        let slot = self.components.remove(index);
        log::trace!("removed {} from entity `{}`", slot.type_name, self.name);
        Some(slot.component)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|slot| slot.component.as_ref())
    }

    pub fn component_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.components.iter().map(|slot| slot.type_name)
    }

    pub fn start(&mut self) {
        for slot in &mut self.components {
            slot.component.start();
        }
    }

    pub fn update(&mut self, dt: f32, input: &InputState) {
        for slot in &mut self.components {
            slot.component.update(dt, input);
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("components", &self.component_names().collect::<Vec<_>>())
            .finish()
    }
}

//! Role-keyed service registry and the frozen provider built from it
//!
//! A [`ServiceCollection`] is populated during startup and then frozen into a
//! [`ServiceProvider`] by [`ServiceCollection::build_provider`]. Each role (the
//! type a consumer asks for, e.g. `Arc<dyn HttpClientFactory>`) owns a [`Slot`]:
//!
//! - **Exclusive** slots hold exactly one descriptor. [`ServiceCollection::try_add`]
//!   only fills an empty slot, [`ServiceCollection::add`] replaces the occupant.
//! - **Extensible** slots hold an append-only set of descriptors, deduplicated by
//!   implementation type through [`ServiceCollection::try_add_enumerable`].
//!
//! The named client configuration store travels with the collection and is
//! frozen alongside it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::registry::{ClientOptions, ClientOptionsRegistry};

type BoxedService = Box<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn(&ServiceProvider) -> ClientResult<BoxedService> + Send + Sync>;
type Cloner = fn(&(dyn Any + Send + Sync)) -> Option<BoxedService>;

/// Identity of a type used as a role or implementation key
///
/// Equality and hashing use only the [`TypeId`]; the name is kept for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully-qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// How often a descriptor's constructor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    /// Constructed once per provider and shared
    Singleton,
    /// Constructed on every resolution
    Transient,
}

/// Recipe for producing one service for one role
#[derive(Clone)]
pub struct ServiceDescriptor {
    role: TypeKey,
    implementation: TypeKey,
    lifetime: ServiceLifetime,
    constructor: Constructor,
    cloner: Option<Cloner>,
}

fn clone_boxed<S>(value: &(dyn Any + Send + Sync)) -> Option<BoxedService>
where
    S: Clone + Send + Sync + 'static,
{
    value
        .downcast_ref::<S>()
        .map(|service| Box::new(service.clone()) as BoxedService)
}

impl ServiceDescriptor {
    /// Singleton descriptor for role `S` implemented by `I`
    ///
    /// The constructor runs at most once per provider; later resolutions clone
    /// the cached value, so `S` is usually an `Arc`.
    pub fn singleton<S, I, F>(constructor: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        I: ?Sized + 'static,
        F: Fn(&ServiceProvider) -> ClientResult<S> + Send + Sync + 'static,
    {
        Self {
            role: TypeKey::of::<S>(),
            implementation: TypeKey::of::<I>(),
            lifetime: ServiceLifetime::Singleton,
            constructor: Arc::new(move |provider| {
                constructor(provider).map(|service| Box::new(service) as BoxedService)
            }),
            cloner: Some(clone_boxed::<S>),
        }
    }

    /// Transient descriptor for role `S` implemented by `I`
    pub fn transient<S, I, F>(constructor: F) -> Self
    where
        S: Send + Sync + 'static,
        I: ?Sized + 'static,
        F: Fn(&ServiceProvider) -> ClientResult<S> + Send + Sync + 'static,
    {
        Self {
            role: TypeKey::of::<S>(),
            implementation: TypeKey::of::<I>(),
            lifetime: ServiceLifetime::Transient,
            constructor: Arc::new(move |provider| {
                constructor(provider).map(|service| Box::new(service) as BoxedService)
            }),
            cloner: None,
        }
    }

    /// Role this descriptor serves
    pub fn role(&self) -> TypeKey {
        self.role
    }

    /// Concrete implementation type
    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    /// Construction lifetime
    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("role", &self.role)
            .field("implementation", &self.implementation)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Registration slot for a single role
#[derive(Debug, Clone)]
pub enum Slot {
    /// One implementation owns the role
    Exclusive(ServiceDescriptor),
    /// Several implementations coexist, in registration order
    Extensible(Vec<ServiceDescriptor>),
}

impl Slot {
    fn descriptors(&self) -> &[ServiceDescriptor] {
        match self {
            Slot::Exclusive(descriptor) => std::slice::from_ref(descriptor),
            Slot::Extensible(descriptors) => descriptors,
        }
    }
}

/// Mutable service registry used during application startup
#[derive(Debug, Default)]
pub struct ServiceCollection {
    slots: HashMap<TypeKey, Slot>,
    client_options: ClientOptionsRegistry,
}

impl ServiceCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor`, replacing the occupant of an exclusive slot
    ///
    /// On an extensible slot the descriptor is appended; resolution of a single
    /// service always picks the most recent registration.
    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        let role = descriptor.role;
        match self.slots.get_mut(&role) {
            Some(Slot::Extensible(descriptors)) => descriptors.push(descriptor),
            Some(slot) => *slot = Slot::Exclusive(descriptor),
            None => {
                self.slots.insert(role, Slot::Exclusive(descriptor));
            }
        }
        self
    }

    /// Register `descriptor` only if its role has no registration yet
    ///
    /// Returns `true` when the descriptor was inserted.
    pub fn try_add(&mut self, descriptor: ServiceDescriptor) -> bool {
        let role = descriptor.role;
        if self.slots.contains_key(&role) {
            debug!(
                role = role.name(),
                implementation = descriptor.implementation.name(),
                "role already registered, skipping"
            );
            return false;
        }
        self.slots.insert(role, Slot::Exclusive(descriptor));
        true
    }

    /// Append `descriptor` to its role's set unless the same implementation is
    /// already present
    ///
    /// An exclusive slot is widened into an extensible one. Returns `true` when the
    /// descriptor was inserted.
    pub fn try_add_enumerable(&mut self, descriptor: ServiceDescriptor) -> bool {
        let role = descriptor.role;
        let implementation = descriptor.implementation;
        let slot = self
            .slots
            .entry(role)
            .or_insert_with(|| Slot::Extensible(Vec::new()));

        if slot
            .descriptors()
            .iter()
            .any(|existing| existing.implementation == implementation)
        {
            debug!(
                role = role.name(),
                implementation = implementation.name(),
                "implementation already registered, skipping"
            );
            return false;
        }

        match slot {
            Slot::Extensible(descriptors) => descriptors.push(descriptor),
            Slot::Exclusive(existing) => {
                *slot = Slot::Extensible(vec![existing.clone(), descriptor]);
            }
        }
        true
    }

    /// Whether role `S` has any registration
    pub fn contains<S: ?Sized + 'static>(&self) -> bool {
        self.slots.contains_key(&TypeKey::of::<S>())
    }

    /// Number of descriptors registered for role `S`
    pub fn count<S: ?Sized + 'static>(&self) -> usize {
        self.slots
            .get(&TypeKey::of::<S>())
            .map_or(0, |slot| slot.descriptors().len())
    }

    /// Descriptors registered for role `S`, in registration order
    pub fn descriptors<S: ?Sized + 'static>(&self) -> &[ServiceDescriptor] {
        self.slots
            .get(&TypeKey::of::<S>())
            .map(Slot::descriptors)
            .unwrap_or_default()
    }

    /// Number of registered roles
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Named client configuration store
    pub fn client_options(&self) -> &ClientOptionsRegistry {
        &self.client_options
    }

    /// Mutable access to the named client configuration store
    pub fn client_options_mut(&mut self) -> &mut ClientOptionsRegistry {
        &mut self.client_options
    }

    /// Freeze the collection into a provider
    ///
    /// No further registrations are possible afterwards; the client configuration
    /// store becomes an immutable, shareable snapshot.
    pub fn build_provider(self) -> ServiceProvider {
        debug!(
            roles = self.slots.len(),
            clients = self.client_options.len(),
            "building service provider"
        );
        ServiceProvider {
            inner: Arc::new(ProviderInner {
                slots: self.slots,
                singletons: Mutex::new(HashMap::new()),
                client_options: Arc::new(self.client_options.freeze()),
            }),
        }
    }
}

struct ProviderInner {
    slots: HashMap<TypeKey, Slot>,
    singletons: Mutex<HashMap<(TypeKey, usize), BoxedService>>,
    client_options: Arc<ClientOptions>,
}

/// Frozen, thread-safe resolver produced by [`ServiceCollection::build_provider`]
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("roles", &self.inner.slots.len())
            .field("client_options", &self.inner.client_options)
            .finish()
    }
}

impl ServiceProvider {
    /// Resolve the most recent registration for role `S`
    ///
    /// Returns `Ok(None)` when the role is not registered.
    ///
    /// # Errors
    ///
    /// Propagates constructor failures.
    pub fn get<S: Send + Sync + 'static>(&self) -> ClientResult<Option<S>> {
        let role = TypeKey::of::<S>();
        let Some(slot) = self.inner.slots.get(&role) else {
            return Ok(None);
        };
        let descriptors = slot.descriptors();
        match descriptors.last() {
            Some(descriptor) => self.materialize(descriptor, descriptors.len() - 1).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve role `S`, failing if it is not registered
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ServiceNotRegistered`] for unknown roles and
    /// propagates constructor failures.
    pub fn get_required<S: Send + Sync + 'static>(&self) -> ClientResult<S> {
        self.get::<S>()?
            .ok_or_else(|| ClientError::service_not_registered(std::any::type_name::<S>()))
    }

    /// Resolve every registration for role `S`, in registration order
    ///
    /// # Errors
    ///
    /// Propagates the first constructor failure.
    pub fn get_all<S: Send + Sync + 'static>(&self) -> ClientResult<Vec<S>> {
        let role = TypeKey::of::<S>();
        let Some(slot) = self.inner.slots.get(&role) else {
            return Ok(Vec::new());
        };
        slot.descriptors()
            .iter()
            .enumerate()
            .map(|(index, descriptor)| self.materialize(descriptor, index))
            .collect()
    }

    /// Frozen named client configuration
    pub fn client_options(&self) -> &Arc<ClientOptions> {
        &self.inner.client_options
    }

    fn materialize<S: 'static>(
        &self,
        descriptor: &ServiceDescriptor,
        index: usize,
    ) -> ClientResult<S> {
        let boxed = match (descriptor.lifetime, descriptor.cloner) {
            (ServiceLifetime::Singleton, Some(cloner)) => {
                self.singleton(descriptor, index, cloner)?
            }
            _ => (descriptor.constructor)(self)?,
        };
        boxed.downcast::<S>().map(|service| *service).map_err(|_| {
            ClientError::resolution(descriptor.role.name(), "constructed service has wrong type")
        })
    }

    fn singleton(
        &self,
        descriptor: &ServiceDescriptor,
        index: usize,
        cloner: Cloner,
    ) -> ClientResult<BoxedService> {
        let key = (descriptor.role, index);
        let role = descriptor.role.name();

        if let Some(cached) = self.inner.singletons.lock().get(&key) {
            return cloner(cached.as_ref())
                .ok_or_else(|| ClientError::resolution(role, "cached singleton has wrong type"));
        }

        // Constructors may resolve other services, so the lock is not held here.
        let created = (descriptor.constructor)(self)?;

        let mut singletons = self.inner.singletons.lock();
        let cached = singletons.entry(key).or_insert(created);
        cloner(cached.as_ref())
            .ok_or_else(|| ClientError::resolution(role, "cached singleton has wrong type"))
    }
}
